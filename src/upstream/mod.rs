pub mod http;
pub mod sse;
pub mod stub;

use crate::prompt::ChatMessage;
use anyhow::Context;
use bytes::Bytes;
use futures_core::stream::BoxStream;
use std::future::Future;
use std::pin::Pin;
use tokio_stream::StreamExt;

pub use http::HttpUpstream;
pub use sse::{FrameDecoder, FrameError, UpstreamFrame};
pub use stub::{Script, StubUpstream};

pub type ByteStream = BoxStream<'static, anyhow::Result<Bytes>>;

/// One call to the chat-completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
}

pub struct UpstreamResponse {
    pub status: u16,

    /// `None` when the response carried no readable body.
    pub body: Option<ByteStream>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the whole body into memory.
    pub async fn collect(self) -> anyhow::Result<Vec<u8>> {
        let mut body = self.body.context("response body is not readable")?;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.context("failed to read upstream body")?);
        }
        Ok(out)
    }
}

/// Chat-completion endpoint the relay talks to.
pub trait Upstream: Send + Sync {
    fn name(&self) -> &'static str;

    /// Issue the request and return as soon as the status line is known.
    fn send(
        &self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<UpstreamResponse>> + Send>>;
}
