use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{AbortHandle, Mode, Outcome, ReadyState, StateChange, StateChangeCallback};
use crate::{HttpClient, HttpError, Method, OsmCanvasError, Result};

struct PendingRequest {
    method: Method,
    url: String,
    mode: Mode,
}

/// A single HTTP exchange modelled as a readiness state machine.
///
/// States only move forward: `Unsent → Opened → Done`. The transport delivers the
/// whole response at once, so `HeadersReceived` and `Loading` are never entered and
/// the lifecycle goes from `Opened` straight to `Done`. Exactly one notification is
/// fired for `Done`, whether the exchange completed, failed or was aborted.
///
/// The state-change callback runs on whichever task drives `send`.
pub struct RequestLifecycle {
    transport: Arc<dyn HttpClient>,
    state: ReadyState,
    request: Option<PendingRequest>,
    outcome: Option<Outcome>,
    on_state_change: Option<StateChangeCallback>,
    cancel: CancellationToken,
}

impl RequestLifecycle {
    pub fn new(transport: Arc<dyn HttpClient>) -> Self {
        Self {
            transport,
            state: ReadyState::Unsent,
            request: None,
            outcome: None,
            on_state_change: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Register the state-change callback
    pub fn on_state_change(
        mut self,
        callback: impl FnMut(&StateChange<'_>) + Send + 'static,
    ) -> Self {
        self.set_on_state_change(callback);
        self
    }

    pub fn set_on_state_change(&mut self, callback: impl FnMut(&StateChange<'_>) + Send + 'static) {
        self.on_state_change = Some(Box::new(callback));
    }

    pub fn state(&self) -> ReadyState {
        self.state
    }

    pub fn method(&self) -> Option<Method> {
        self.request.as_ref().map(|r| r.method)
    }

    pub fn url(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.url.as_str())
    }

    /// The terminal outcome, once `Done`
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Handle for aborting a `send` that is in flight
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            token: self.cancel.clone(),
        }
    }

    /// Prepare the request. Valid exactly once, from `Unsent`.
    pub fn open(&mut self, method: Method, url: impl Into<String>, mode: Mode) -> Result<()> {
        if self.state != ReadyState::Unsent {
            return Err(OsmCanvasError::InvalidState(format!(
                "open() called in state {}",
                self.state
            )));
        }

        let url = url.into();
        tracing::debug!("Opening {} {} ({:?})", method, url, mode);
        self.request = Some(PendingRequest { method, url, mode });
        self.transition(ReadyState::Opened)
    }

    /// Perform the exchange of a request opened in `Mode::Async`
    pub async fn send(&mut self) -> Result<&Outcome> {
        let (method, url) = self.ready_to_send(Mode::Async, "send")?;
        self.exchange(method, url).await
    }

    /// Perform the exchange of a request opened in `Mode::Blocking`.
    ///
    /// Spins up a private current-thread runtime that only drives this one exchange.
    /// Calling it from inside a running runtime would stall that runtime, so that case
    /// is refused with `InvalidState`.
    pub fn send_blocking(&mut self) -> Result<&Outcome> {
        let (method, url) = self.ready_to_send(Mode::Blocking, "send_blocking")?;

        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(OsmCanvasError::InvalidState(
                "send_blocking() called from inside an async runtime, use send().await"
                    .to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| HttpError::RequestFailed {
                message: format!("Failed to start request runtime: {}", e),
            })?;

        runtime.block_on(self.exchange(method, url))
    }

    /// Abort the request. A no-op once `Done`; otherwise moves to `Done` with
    /// `Outcome::Aborted`.
    pub fn abort(&mut self) -> Result<()> {
        self.cancel.cancel();
        if self.state == ReadyState::Done {
            return Ok(());
        }

        tracing::debug!("Aborting request in state {}", self.state);
        self.complete(Outcome::Aborted).map(|_| ())
    }

    fn ready_to_send(&self, mode: Mode, operation: &str) -> Result<(Method, String)> {
        let request = match (&self.request, self.state) {
            (Some(request), ReadyState::Opened) => request,
            _ => {
                return Err(OsmCanvasError::InvalidState(format!(
                    "{}() called in state {}",
                    operation, self.state
                )));
            }
        };

        if request.mode != mode {
            return Err(OsmCanvasError::InvalidState(format!(
                "{}() called on a request opened in {:?} mode",
                operation, request.mode
            )));
        }

        Ok((request.method, request.url.clone()))
    }

    async fn exchange(&mut self, method: Method, url: String) -> Result<&Outcome> {
        let transport = Arc::clone(&self.transport);
        let cancel = self.cancel.clone();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Outcome::Aborted,
            result = transport.request(method, &url) => match result {
                Ok(response) => Outcome::Completed(response),
                Err(error) => Outcome::Failed(error),
            },
        };

        match &outcome {
            Outcome::Completed(response) => tracing::debug!(
                "{} {} -> {} ({} bytes)",
                method,
                url,
                response.status,
                response.body.len()
            ),
            Outcome::Aborted => tracing::debug!("{} {} aborted", method, url),
            Outcome::Failed(error) => tracing::debug!("{} {} failed: {}", method, url, error),
        }

        self.complete(outcome)
    }

    fn complete(&mut self, outcome: Outcome) -> Result<&Outcome> {
        if self.outcome.is_some() || self.state == ReadyState::Done {
            return Err(OsmCanvasError::InvalidState(format!(
                "request {} completed more than once",
                self.url().unwrap_or("<unopened>")
            )));
        }

        self.outcome = Some(outcome);
        self.transition(ReadyState::Done)?;

        self.outcome.as_ref().ok_or_else(|| {
            OsmCanvasError::InvalidState("request completed without an outcome".to_string())
        })
    }

    fn transition(&mut self, state: ReadyState) -> Result<()> {
        if state <= self.state {
            return Err(OsmCanvasError::InvalidState(format!(
                "cannot move from {} to {}",
                self.state, state
            )));
        }

        tracing::trace!("Request state {} -> {}", self.state, state);
        self.state = state;

        if let Some(callback) = self.on_state_change.as_mut() {
            let outcome = if state == ReadyState::Done {
                self.outcome.as_ref()
            } else {
                None
            };
            callback(&StateChange { state, outcome });
        }

        Ok(())
    }
}
