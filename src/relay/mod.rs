//! Server side of the streaming relay: one upstream call re-framed into
//! newline-delimited [`RelayEvent`]s as the bytes arrive.

pub mod event;
pub mod reframe;

pub use event::RelayEvent;
pub use reframe::{reframe_all, Reframer};

use crate::error::RelayError;
use crate::upstream::{Upstream, UpstreamRequest};
use futures_core::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub type EventStream = BoxStream<'static, Result<RelayEvent, RelayError>>;

/// Issue `req` and stream the re-framed events.
///
/// Failures before `start` (transport, non-success status, missing body) are
/// yielded as the first and only item. A read failure after `start` ends the
/// stream with an error item; events already yielded stand. Dropping the
/// returned stream stops the relay task and releases the upstream body.
pub fn stream_events(upstream: Arc<dyn Upstream>, req: UpstreamRequest) -> EventStream {
    let (tx, rx) = mpsc::channel::<Result<RelayEvent, RelayError>>(64);

    tokio::spawn(async move {
        let resp = match upstream.send(req).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "upstream request failed");
                let _ = tx.send(Err(RelayError::Upstream(e))).await;
                return;
            }
        };

        if !resp.is_success() {
            tracing::error!(status = resp.status, "upstream rejected the request");
            let _ = tx.send(Err(RelayError::UpstreamStatus(resp.status))).await;
            return;
        }

        let Some(mut body) = resp.body else {
            let _ = tx.send(Err(RelayError::UnreadableBody)).await;
            return;
        };

        if tx.send(Ok(RelayEvent::start())).await.is_err() {
            return;
        }

        let mut reframer = Reframer::new();
        loop {
            let item = tokio::select! {
                item = body.next() => item,
                _ = tx.closed() => {
                    tracing::debug!("client went away; dropping upstream stream");
                    return;
                }
            };
            let Some(item) = item else {
                break;
            };
            let bytes = match item {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!(
                        error = %format!("{e:#}"),
                        relayed = reframer.accumulated().len(),
                        "upstream stream interrupted"
                    );
                    let _ = tx.send(Err(RelayError::Interrupted(e))).await;
                    return;
                }
            };

            for ev in reframer.feed(&bytes) {
                if tx.send(Ok(ev)).await.is_err() {
                    tracing::debug!("client went away; dropping upstream stream");
                    return;
                }
            }
        }

        let total = reframer.accumulated().len();
        for ev in reframer.finish() {
            if tx.send(Ok(ev)).await.is_err() {
                return;
            }
        }
        tracing::info!(bytes = total, "generation relayed");
    });

    Box::pin(ReceiverStream::new(rx))
}
