use super::{EventDecoder, RelayClient};
use crate::error::GenerateError;
use crate::relay::RelayEvent;
use crate::request::{GenerationRequest, TextLimits};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Observable state of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationState {
    pub output: String,
    pub is_loading: bool,
    pub error: Option<GenerateError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(pub u64);

/// One in-flight generation. Dropping the handle cancels its token.
#[derive(Debug)]
pub struct OperationHandle {
    id: OperationId,
    token: CancellationToken,
}

impl OperationHandle {
    fn new(id: OperationId) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Drives generations through a [`RelayClient`] and publishes their progress.
///
/// At most one operation is live. Submitting while another is running
/// replaces it: the prior token is cancelled and anything the prior operation
/// still produces is discarded, because every state update is checked against
/// the live operation's id.
pub struct GenerationSession {
    client: RelayClient,
    limits: TextLimits,
    state: watch::Sender<GenerationState>,
    current: Mutex<Option<OperationHandle>>,
    next_id: AtomicU64,
}

impl GenerationSession {
    pub fn new(client: RelayClient, limits: TextLimits) -> Self {
        let (state, _) = watch::channel(GenerationState::default());
        Self {
            client,
            limits,
            state,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> GenerationState {
        self.state.borrow().clone()
    }

    /// Id of the live operation, if any.
    pub fn current_operation(&self) -> Option<OperationId> {
        self.lock().as_ref().map(OperationHandle::id)
    }

    /// Run one generation to completion, cancellation or failure.
    ///
    /// Returns the final output. Whatever the outcome, the loading flag is
    /// cleared unless a newer submission has taken over the session.
    pub async fn submit(&self, request: GenerationRequest) -> Result<String, GenerateError> {
        if let Err(e) = request.validate(self.limits) {
            tracing::debug!(error = %e, "generation request rejected");
            self.state.send_modify(|s| s.error = Some(e.clone()));
            return Err(e);
        }

        let (id, token) = self.begin();
        tracing::debug!(operation = id.0, streaming = request.streaming, relay = %self.client.relay_url(), "generation submitted");

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(GenerateError::Stopped),
            res = self.drive(id, &request) => res,
        };

        self.finish(id, &result);
        result
    }

    /// Stop the live operation. No-op when idle.
    pub fn cancel(&self) {
        let mut current = self.lock();
        let Some(handle) = current.take() else {
            return;
        };
        tracing::debug!(operation = handle.id.0, "generation cancelled");
        drop(handle);
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.error = Some(GenerateError::Stopped);
        });
    }

    fn lock(&self) -> MutexGuard<'_, Option<OperationHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> (OperationId, CancellationToken) {
        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = OperationHandle::new(id);
        let token = handle.token();

        let mut current = self.lock();
        if let Some(prior) = current.replace(handle) {
            tracing::debug!(superseded = prior.id.0, operation = id.0, "replacing in-flight generation");
        }
        self.state.send_modify(|s| {
            s.output.clear();
            s.error = None;
            s.is_loading = true;
        });
        (id, token)
    }

    fn finish(&self, id: OperationId, result: &Result<String, GenerateError>) {
        let mut current = self.lock();
        if current.as_ref().map(OperationHandle::id) != Some(id) {
            return;
        }
        current.take();
        self.state.send_modify(|s| {
            s.is_loading = false;
            if let Err(e) = result {
                s.error = Some(e.clone());
            }
        });
        match result {
            Ok(output) => tracing::debug!(operation = id.0, len = output.len(), "generation finished"),
            Err(e) => tracing::debug!(operation = id.0, error = %e, "generation failed"),
        }
    }

    /// Apply `f` only while `id` is still the live operation.
    fn update(&self, id: OperationId, f: impl FnOnce(&mut GenerationState)) {
        let current = self.lock();
        if current.as_ref().map(OperationHandle::id) == Some(id) {
            self.state.send_modify(f);
        }
    }

    async fn drive(&self, id: OperationId, request: &GenerationRequest) -> Result<String, GenerateError> {
        let resp = self.client.post(request).await?;

        if !request.streaming {
            let output = RelayClient::completion_text(resp).await?;
            self.update(id, |s| s.output.clone_from(&output));
            return Ok(output);
        }

        let mut body = resp.bytes_stream();
        let mut decoder = EventDecoder::new();
        let mut output = String::new();

        while let Some(chunk) = body.next().await {
            for event in decoder.push(&chunk?) {
                self.fold(id, &mut output, event?);
            }
        }
        if let Some(event) = decoder.finish() {
            self.fold(id, &mut output, event?);
        }
        Ok(output)
    }

    fn fold(&self, id: OperationId, output: &mut String, event: RelayEvent) {
        match event {
            RelayEvent::Progress { message } => output.push_str(&message),
            RelayEvent::Complete { message } | RelayEvent::Data { data: message } => *output = message,
            RelayEvent::Start { .. } | RelayEvent::Unknown => return,
        }
        self.update(id, |s| s.output.clone_from(&*output));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Material, Platform};

    fn session() -> GenerationSession {
        // Nothing listens here; tests below never reach the network.
        GenerationSession::new(
            RelayClient::new(reqwest::Client::new(), "http://127.0.0.1:9/api/generate"),
            TextLimits::default(),
        )
    }

    #[tokio::test]
    async fn validation_failure_sets_error_without_loading() {
        let s = session();
        let req = GenerationRequest {
            source: Material::Urls(vec![" ".to_string()]),
            style: None,
            platform: Platform::Twitter,
            streaming: true,
            credentials: None,
        };
        let err = s.submit(req).await.unwrap_err();
        assert_eq!(err, GenerateError::Validation("At least one content URL is required".to_string()));

        let state = s.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.error, Some(err));
        assert_eq!(s.current_operation(), None);
    }

    #[test]
    fn cancel_when_idle_is_a_no_op() {
        let s = session();
        s.cancel();
        assert_eq!(s.snapshot(), GenerationState::default());
    }

    #[test]
    fn replacing_an_operation_cancels_the_prior_token() {
        let s = session();
        let (first, first_token) = s.begin();
        let (second, second_token) = s.begin();

        assert_ne!(first, second);
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert_eq!(s.current_operation(), Some(second));

        s.update(first, |st| st.output.push_str("stale"));
        assert_eq!(s.snapshot().output, "");
        s.update(second, |st| st.output.push_str("fresh"));
        assert_eq!(s.snapshot().output, "fresh");
    }

    #[test]
    fn cancel_marks_stopped_and_finish_of_cancelled_operation_is_ignored() {
        let s = session();
        let (id, token) = s.begin();
        assert!(s.snapshot().is_loading);

        s.cancel();
        assert!(token.is_cancelled());
        s.finish(id, &Err(GenerateError::Stopped));

        let state = s.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.error, Some(GenerateError::Stopped));
        assert_eq!(s.current_operation(), None);
    }

    #[test]
    fn fold_appends_progress_and_replaces_on_complete() {
        let s = session();
        let (id, _token) = s.begin();
        let mut out = String::new();

        s.fold(id, &mut out, RelayEvent::start());
        s.fold(id, &mut out, RelayEvent::Progress { message: "Hel".into() });
        s.fold(id, &mut out, RelayEvent::Progress { message: "lo".into() });
        assert_eq!(s.snapshot().output, "Hello");

        s.fold(id, &mut out, RelayEvent::Unknown);
        s.fold(id, &mut out, RelayEvent::Complete { message: "Hello!".into() });
        assert_eq!(s.snapshot().output, "Hello!");
    }
}
