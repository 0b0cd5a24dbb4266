//! Error types for the relay server and the relay client.

use thiserror::Error;

/// Failures on the server side of the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No endpoint in the request and none configured.
    #[error("API endpoint is required")]
    MissingEndpoint,

    /// Endpoint does not start with the trusted prefix.
    #[error("Invalid API endpoint. Endpoint must start with '{prefix}'")]
    UntrustedEndpoint { prefix: String },

    /// Upstream answered with a non-success status.
    #[error("API request failed with status {0}")]
    UpstreamStatus(u16),

    /// Upstream answered without a body to read.
    #[error("Response body is not readable")]
    UnreadableBody,

    /// The upstream call itself failed (connect, TLS, request build).
    #[error("upstream request failed: {0:#}")]
    Upstream(anyhow::Error),

    /// Reading the upstream body failed after streaming began.
    #[error("upstream stream interrupted: {0:#}")]
    Interrupted(anyhow::Error),

    #[error("failed to encode relay event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RelayError {
    /// Validation failures are answered with a client error instead of an upstream call.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingEndpoint | Self::UntrustedEndpoint { .. })
    }
}

/// Failures surfaced by the relay client through its observable error slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    /// Request rejected locally; nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// The relay answered with an error payload; carries its `message`.
    #[error("{0}")]
    Relay(String),

    /// Transport failure, undecodable event line, or malformed response.
    #[error("Failed to generate content - {0}")]
    Failed(String),

    /// The caller cancelled the operation.
    #[error("Generation stopped")]
    Stopped,
}

impl GenerateError {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl From<reqwest::Error> for GenerateError {
    fn from(e: reqwest::Error) -> Self {
        Self::Failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_messages_are_distinct() {
        let missing = RelayError::MissingEndpoint.to_string();
        let untrusted = RelayError::UntrustedEndpoint {
            prefix: "https://trusted.example/api".to_string(),
        }
        .to_string();

        assert_eq!(missing, "API endpoint is required");
        assert!(untrusted.starts_with("Invalid API endpoint"));
        assert!(untrusted.contains("https://trusted.example/api"));
        assert!(RelayError::MissingEndpoint.is_validation());
        assert!(!RelayError::UpstreamStatus(500).is_validation());
    }

    #[test]
    fn stopped_is_distinguishable_from_failure() {
        assert_eq!(GenerateError::Stopped.to_string(), "Generation stopped");
        assert!(GenerateError::Stopped.is_stopped());

        let failed = GenerateError::Failed("connection reset".to_string());
        assert!(!failed.is_stopped());
        assert_eq!(failed.to_string(), "Failed to generate content - connection reset");
    }
}
