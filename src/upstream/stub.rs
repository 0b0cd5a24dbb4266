use super::{ByteStream, Upstream, UpstreamRequest, UpstreamResponse};
use crate::prompt::{ContentPart, MessageContent};
use bytes::Bytes;
use serde_json::json;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Canned upstream response.
#[derive(Debug, Clone)]
pub struct Script {
    status: u16,
    chunks: Vec<Bytes>,
    delay: Duration,
    hold_open: bool,
    has_body: bool,
    refuse: bool,
    fail_after: Option<usize>,
}

impl Script {
    pub fn chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            status: 200,
            chunks: chunks.into_iter().map(Into::into).collect(),
            delay: Duration::ZERO,
            hold_open: false,
            has_body: true,
            refuse: false,
            fail_after: None,
        }
    }

    /// Fail the call itself, as if the endpoint were unreachable.
    pub fn refuse() -> Self {
        Self {
            refuse: true,
            ..Self::chunks(Vec::<Bytes>::new())
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Pause before every chunk.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep the body open after the last chunk until the reader goes away.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn without_body(mut self) -> Self {
        self.has_body = false;
        self
    }

    /// Break the body with a read error once `n` chunks have been sent.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }
}

#[derive(Debug)]
enum Mode {
    Echo,
    Scripted(Mutex<VecDeque<Script>>),
}

/// In-process upstream: either replays scripts or echoes the prompt back.
///
/// Scripts are consumed one per call; the last one is reused once the queue
/// is down to a single entry.
#[derive(Debug, Clone)]
pub struct StubUpstream {
    mode: Arc<Mode>,
    requests: Arc<Mutex<Vec<UpstreamRequest>>>,
    calls: Arc<AtomicUsize>,
}

impl StubUpstream {
    pub fn new(script: Script) -> Self {
        Self::sequence(vec![script])
    }

    pub fn sequence(scripts: Vec<Script>) -> Self {
        Self::with_mode(Mode::Scripted(Mutex::new(scripts.into())))
    }

    /// Offline mode: streams the first prompt message back word by word.
    pub fn echo() -> Self {
        Self::with_mode(Mode::Echo)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode: Arc::new(mode),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_script(&self, req: &UpstreamRequest) -> Script {
        match self.mode.as_ref() {
            Mode::Echo => echo_script(req),
            Mode::Scripted(queue) => {
                let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                if queue.len() > 1 {
                    queue.pop_front().unwrap_or_else(Script::refuse)
                } else {
                    queue.front().cloned().unwrap_or_else(Script::refuse)
                }
            }
        }
    }
}

fn prompt_text(req: &UpstreamRequest) -> String {
    match req.messages.first().map(|m| &m.content) {
        Some(MessageContent::Text(text)) => text.clone(),
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => text.as_str(),
                ContentPart::Url { url } => url.as_str(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        None => String::new(),
    }
}

fn echo_script(req: &UpstreamRequest) -> Script {
    let prompt = prompt_text(req);
    let mut words = vec!["[stub upstream] ".to_string()];
    words.extend(prompt.split_whitespace().take(48).map(|w| format!("{w} ")));

    if !req.stream {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": words.concat()}}]
        });
        return Script::chunks([body.to_string()]);
    }

    let mut chunks: Vec<String> = words
        .into_iter()
        .map(|w| format!("data: {}\n\n", json!({"choices": [{"delta": {"content": w}}]})))
        .collect();
    chunks.push(format!(
        "data: {}\n\n",
        json!({"choices": [{"delta": {}, "finish_reason": "stop"}]})
    ));
    chunks.push("data: [DONE]\n\n".to_string());
    Script::chunks(chunks).delay(Duration::from_millis(40))
}

impl Upstream for StubUpstream {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn send(
        &self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<UpstreamResponse>> + Send>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.next_script(&req);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req);

        Box::pin(async move {
            if script.refuse {
                anyhow::bail!("connection refused by stub upstream");
            }
            if !script.has_body {
                return Ok(UpstreamResponse {
                    status: script.status,
                    body: None,
                });
            }

            let (tx, rx) = mpsc::channel::<anyhow::Result<Bytes>>(32);

            tokio::spawn(async move {
                for (i, chunk) in script.chunks.into_iter().enumerate() {
                    if script.fail_after == Some(i) {
                        break;
                    }
                    if !script.delay.is_zero() {
                        tokio::time::sleep(script.delay).await;
                    }
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                }
                if script.fail_after.is_some() {
                    if !script.delay.is_zero() {
                        tokio::time::sleep(script.delay).await;
                    }
                    let _ = tx
                        .send(Err(anyhow::anyhow!("connection reset by stub upstream")))
                        .await;
                    return;
                }
                if script.hold_open {
                    tx.closed().await;
                }
            });

            let body: ByteStream = Box::pin(ReceiverStream::new(rx));
            Ok(UpstreamResponse {
                status: script.status,
                body: Some(body),
            })
        })
    }
}
