use super::RelayEvent;
use crate::upstream::{FrameDecoder, FrameError, UpstreamFrame};

/// Turns upstream `data:` bytes into [`RelayEvent`]s while accumulating the text.
///
/// Purely synchronous: the same byte chunks always yield the same events.
#[derive(Debug, Default)]
pub struct Reframer {
    decoder: FrameDecoder,
    accumulated: String,
}

impl Reframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated from every delta seen so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Feed one upstream chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RelayEvent> {
        let frames = self.decoder.push(chunk);
        self.apply(frames)
    }

    /// Upstream body ended: flush any trailing record, then emit the final `data` event.
    pub fn finish(mut self) -> Vec<RelayEvent> {
        let frames = self.decoder.finish();
        let mut out = self.apply(frames);
        out.push(RelayEvent::Data {
            data: self.accumulated,
        });
        out
    }

    fn apply(&mut self, frames: Vec<Result<UpstreamFrame, FrameError>>) -> Vec<RelayEvent> {
        let mut out = Vec::with_capacity(frames.len());
        for frame in frames {
            match frame {
                Ok(UpstreamFrame::Delta(fragment)) => {
                    self.accumulated.push_str(&fragment);
                    out.push(RelayEvent::Progress { message: fragment });
                }
                Ok(UpstreamFrame::Stop) => out.push(RelayEvent::Complete {
                    message: self.accumulated.clone(),
                }),
                Ok(UpstreamFrame::Done) => {
                    tracing::debug!(len = self.accumulated.len(), "upstream sent [DONE]");
                }
                Err(e) => tracing::warn!(error = %e, "skipping undecodable upstream record"),
            }
        }
        out
    }
}

/// Run a complete upstream body through a fresh [`Reframer`], `start` included.
pub fn reframe_all<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Vec<RelayEvent> {
    let mut reframer = Reframer::new();
    let mut out = vec![RelayEvent::start()];
    for chunk in chunks {
        out.extend(reframer.feed(chunk));
    }
    out.extend(reframer.finish());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(s: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":{s:?}}}}}]}}\n\n")
    }

    const STOP: &str = "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n";

    fn progress(s: &str) -> RelayEvent {
        RelayEvent::Progress {
            message: s.to_string(),
        }
    }

    #[test]
    fn deltas_then_stop_yield_progress_then_complete() {
        let body = [delta("a"), delta("bc"), delta("d"), STOP.to_string(), "data: [DONE]\n\n".to_string()];
        let events = reframe_all(body.iter().map(|s| s.as_bytes()));

        assert_eq!(
            events,
            vec![
                RelayEvent::start(),
                progress("a"),
                progress("bc"),
                progress("d"),
                RelayEvent::Complete {
                    message: "abcd".to_string()
                },
                RelayEvent::Data {
                    data: "abcd".to_string()
                },
            ]
        );
    }

    #[test]
    fn missing_stop_still_ends_with_full_data() {
        let body = [delta("Hello "), delta("there")];
        let events = reframe_all(body.iter().map(|s| s.as_bytes()));
        assert!(!events.iter().any(|e| matches!(e, RelayEvent::Complete { .. })));
        assert_eq!(
            events.last(),
            Some(&RelayEvent::Data {
                data: "Hello there".to_string()
            })
        );
    }

    #[test]
    fn malformed_record_does_not_end_the_stream() {
        let body = [delta("x"), "data: {oops\n\n".to_string(), delta("y"), STOP.to_string()];
        let events = reframe_all(body.iter().map(|s| s.as_bytes()));
        assert_eq!(events[1..3], [progress("x"), progress("y")]);
        assert_eq!(
            events[3],
            RelayEvent::Complete {
                message: "xy".to_string()
            }
        );
    }

    #[test]
    fn stop_record_with_content_appends_before_completing() {
        let body = [
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello \"}}]}\n".to_string(),
            "data: {\"choices\":[{\"delta\":{\"content\":\"world\"},\"finish_reason\":\"stop\"}]}\n".to_string(),
            "data: [DONE]\n".to_string(),
        ];
        let events = reframe_all(body.iter().map(|s| s.as_bytes()));
        assert_eq!(
            events,
            vec![
                RelayEvent::start(),
                progress("Hello "),
                progress("world"),
                RelayEvent::Complete {
                    message: "Hello world".to_string()
                },
                RelayEvent::Data {
                    data: "Hello world".to_string()
                },
            ]
        );
    }

    #[test]
    fn replay_is_deterministic_and_chunking_independent() {
        let body = format!("{}{}: keepalive\n\n{}{}", delta("one "), delta("two "), delta("three"), STOP);
        let whole = reframe_all([body.as_bytes()]);
        assert_eq!(whole, reframe_all([body.as_bytes()]));

        let bytes = body.as_bytes();
        for split in [1, 7, 33, bytes.len() - 1] {
            let pieces = [&bytes[..split], &bytes[split..]];
            assert_eq!(reframe_all(pieces), whole, "split at {split}");
        }
        let by_byte: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(reframe_all(by_byte), whole);
    }

    #[test]
    fn accumulated_tracks_deltas() {
        let mut r = Reframer::new();
        r.feed(delta("ab").as_bytes());
        r.feed(delta("c").as_bytes());
        assert_eq!(r.accumulated(), "abc");
    }
}
