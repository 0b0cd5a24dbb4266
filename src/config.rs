use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerSection {
    pub listen_addr: Option<SocketAddr>,

    /// Upstream endpoint used when a request does not name one.
    pub endpoint: Option<String>,

    /// Bearer key used when a request does not carry one.
    pub api_key: Option<String>,

    /// Every upstream endpoint must start with this.
    pub trusted_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientSection {
    pub relay_url: Option<String>,

    /// Credentials forwarded with every request; set both or neither.
    pub api_key: Option<String>,
    pub endpoint: Option<String>,

    pub min_text_len: Option<usize>,
    pub max_text_len: Option<usize>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_sections() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            listen_addr = "0.0.0.0:8080"
            endpoint = "https://llm.datasaur.ai/api/deployment/1/2/chat/completions"
            trusted_prefix = "https://llm.datasaur.ai/api/deployment"

            [client]
            relay_url = "http://localhost:8080/api/generate"
            min_text_len = 50
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.listen_addr, Some(SocketAddr::from(([0, 0, 0, 0], 8080))));
        assert!(cfg.server.api_key.is_none());
        assert_eq!(cfg.client.min_text_len, Some(50));
        assert_eq!(cfg.client.max_text_len, None);
    }

    #[test]
    fn missing_file_is_none() {
        let path = std::env::temp_dir().join("repurpose-config-that-does-not-exist.toml");
        assert!(Config::load_optional(&path).unwrap().is_none());
    }

    #[test]
    fn empty_file_is_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.server.endpoint.is_none());
        assert!(cfg.client.relay_url.is_none());
    }
}
