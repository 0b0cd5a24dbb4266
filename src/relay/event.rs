use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const START_MESSAGE: &str = "Starting content generation...";

/// Application-level event written by the relay server, one JSON object per line.
///
/// `start` precedes every `progress`; concatenating the `progress` fragments
/// reproduces the final text; `complete` and `data` carry the full text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEvent {
    Start {
        #[serde(default)]
        message: String,
    },
    Progress {
        message: String,
    },
    Complete {
        message: String,
    },
    Data {
        data: String,
    },
    /// Any tag this build does not know; readers skip it.
    #[serde(other)]
    Unknown,
}

impl RelayEvent {
    pub fn start() -> Self {
        Self::Start {
            message: START_MESSAGE.to_string(),
        }
    }

    /// Encode as one newline-terminated JSON line.
    pub fn to_line(&self) -> serde_json::Result<Bytes> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    }
}
