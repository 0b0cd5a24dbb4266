//! Client side of the relay: posts a [`GenerationRequest`] to the relay
//! server and decodes its newline-delimited event stream.

mod session;

pub use session::{GenerationSession, GenerationState, OperationHandle, OperationId};

use crate::error::GenerateError;
use crate::lines::LineBuffer;
use crate::relay::RelayEvent;
use crate::request::{Credentials, GenerationRequest, TextLimits};
use serde::Deserialize;

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000/api/generate";

/// Everything the client needs, handed in by the caller rather than read from ambient state.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub relay_url: String,
    pub credentials: Option<Credentials>,
    pub limits: TextLimits,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            credentials: None,
            limits: TextLimits::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    relay_url: String,
}

impl RelayClient {
    pub fn new(http: reqwest::Client, relay_url: impl Into<String>) -> Self {
        Self {
            http,
            relay_url: relay_url.into(),
        }
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    /// Send the request; a non-success status becomes [`GenerateError::Relay`]
    /// carrying the server's `message`.
    pub async fn post(&self, request: &GenerationRequest) -> Result<reqwest::Response, GenerateError> {
        let resp = self
            .http
            .post(&self.relay_url)
            .json(&request.to_body())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<ErrorPayload>()
                .await
                .ok()
                .and_then(|p| p.message)
                .unwrap_or_else(|| format!("relay returned HTTP {status}"));
            return Err(GenerateError::Relay(message));
        }
        Ok(resp)
    }

    /// Output of a non-streaming response: `choices[0].message.content`.
    pub async fn completion_text(resp: reqwest::Response) -> Result<String, GenerateError> {
        let body: CompletionBody = resp.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerateError::Failed("response contained no choices".to_string()))
    }
}

/// Splits the relay's byte stream into [`RelayEvent`]s, one per complete line.
///
/// A non-empty line that is not a relay event is a hard error for the stream.
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: LineBuffer,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<RelayEvent, GenerateError>> {
        self.lines.push(chunk).iter().filter_map(|l| decode_line(l)).collect()
    }

    pub fn finish(&mut self) -> Option<Result<RelayEvent, GenerateError>> {
        self.lines.finish().and_then(|l| decode_line(&l))
    }
}

fn decode_line(line: &[u8]) -> Option<Result<RelayEvent, GenerateError>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(
        serde_json::from_slice(line)
            .map_err(|e| GenerateError::Failed(format!("malformed relay event: {e}"))),
    )
}
