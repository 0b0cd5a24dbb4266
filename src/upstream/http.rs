use super::{ByteStream, Upstream, UpstreamRequest, UpstreamResponse};
use crate::prompt::ChatMessage;
use anyhow::{anyhow, Context};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use tokio_stream::StreamExt;

/// Upstream reached over HTTPS with reqwest.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    http: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    stream: bool,
    messages: &'a [ChatMessage],
}

fn headers(req: &UpstreamRequest) -> anyhow::Result<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = &req.api_key {
        let v = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| anyhow!(e))?;
        h.insert(AUTHORIZATION, v);
    }
    if req.stream {
        h.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    }
    Ok(h)
}

impl Upstream for HttpUpstream {
    fn name(&self) -> &'static str {
        "http"
    }

    fn send(
        &self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<UpstreamResponse>> + Send>> {
        let http = self.http.clone();

        Box::pin(async move {
            if req.api_key.is_none() {
                tracing::warn!(endpoint = %req.endpoint, "no API key available; calling upstream unauthenticated");
            }
            let headers = headers(&req)?;
            let body = ChatCompletionRequest {
                stream: req.stream,
                messages: &req.messages,
            };

            let resp = http
                .post(&req.endpoint)
                .headers(headers)
                .json(&body)
                .send()
                .await
                .context("failed to reach chat-completion endpoint")?;

            let status = resp.status().as_u16();
            tracing::debug!(status, stream = req.stream, "upstream responded");

            let body: ByteStream = Box::pin(
                resp.bytes_stream()
                    .map(|chunk| chunk.map_err(|e| anyhow!(e).context("network stream error"))),
            );
            Ok(UpstreamResponse {
                status,
                body: Some(body),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(stream: bool, api_key: Option<&str>) -> UpstreamRequest {
        UpstreamRequest {
            endpoint: "https://llm.example/api/deployment/x".to_string(),
            api_key: api_key.map(str::to_string),
            stream,
            messages: Vec::new(),
        }
    }

    #[test]
    fn streaming_request_asks_for_event_stream() {
        let h = headers(&request(true, Some("secret"))).unwrap();
        assert_eq!(h[ACCEPT], "text/event-stream");
        assert_eq!(h[AUTHORIZATION], "Bearer secret");
        assert_eq!(h[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn plain_request_has_no_accept_or_auth() {
        let h = headers(&request(false, None)).unwrap();
        assert!(h.get(ACCEPT).is_none());
        assert!(h.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn body_shape() {
        let v = serde_json::to_value(ChatCompletionRequest {
            stream: true,
            messages: &[],
        })
        .unwrap();
        assert_eq!(v, serde_json::json!({"stream": true, "messages": []}));
    }
}
