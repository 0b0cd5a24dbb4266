use crate::lines::LineBuffer;
use serde::Deserialize;
use thiserror::Error;

/// One decoded unit of the upstream incremental protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFrame {
    /// Content fragment from `choices[0].delta.content`.
    Delta(String),
    /// `choices[0].finish_reason == "stop"`.
    Stop,
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("record is not valid UTF-8")]
    Utf8,

    #[error("malformed record {payload:?}: {source}")]
    Json {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ChunkRecord {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Line-oriented `data: <json>` decoder.
///
/// - Only lines whose trimmed form starts with `data:` are considered
/// - `[DONE]` ends processing of the lines completed by the current chunk
/// - A record that fails to decode is reported as an error item; later lines are unaffected
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineBuffer,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<UpstreamFrame, FrameError>> {
        decode_lines(self.lines.push(chunk))
    }

    /// Decode an unterminated trailing line once the body has ended.
    pub fn finish(&mut self) -> Vec<Result<UpstreamFrame, FrameError>> {
        decode_lines(self.lines.finish())
    }
}

fn decode_lines(lines: impl IntoIterator<Item = Vec<u8>>) -> Vec<Result<UpstreamFrame, FrameError>> {
    let mut out = Vec::new();

    for line in lines {
        let Ok(line) = std::str::from_utf8(&line) else {
            out.push(Err(FrameError::Utf8));
            continue;
        };
        let Some(payload) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            continue;
        }
        if payload == "[DONE]" {
            out.push(Ok(UpstreamFrame::Done));
            break;
        }

        match serde_json::from_str::<ChunkRecord>(payload) {
            Ok(record) => {
                let Some(choice) = record.choices.into_iter().next() else {
                    continue;
                };
                if let Some(content) = choice
                    .delta
                    .and_then(|d| d.content)
                    .filter(|c| !c.is_empty())
                {
                    out.push(Ok(UpstreamFrame::Delta(content)));
                }
                if choice.finish_reason.as_deref() == Some("stop") {
                    out.push(Ok(UpstreamFrame::Stop));
                }
            }
            Err(source) => out.push(Err(FrameError::Json {
                payload: payload.to_string(),
                source,
            })),
        }
    }

    out
}
