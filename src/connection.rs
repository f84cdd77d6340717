//! HTTP connection manager for the analysis stream.
//!
//! Owns the reqwest client, the connection lifecycle and the read loop.
//! A submit drives exactly one stream end to end: connect (with retry),
//! then read chunks, reassemble frames, extract events and feed them to the
//! session until the body ends or the stream is cancelled.
//!
//! Retry wraps the initial connect only. Once bytes are flowing, a transport
//! failure surfaces as an error instead of a silent reconnect, because the
//! backend cannot resume a half-delivered analysis.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{classify_reqwest_error, ConnectionError};
use crate::events::extract_event;
use crate::framer::FrameBuffer;
use crate::models::AnalysisRequest;
use crate::retry::RetryPolicy;
use crate::session::{ResultSink, StreamCallbacks, StreamSession};

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Streaming endpoint path.
const STREAM_PATH: &str = "/v1/stream";

/// Connection lifecycle, observable while a stream is in flight.
///
/// `Closed` means the user cancelled; it is a normal outcome, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Error(String),
    Closed,
}

/// Client for the analysis streaming backend.
pub struct ConnectionManager {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
    state: Arc<Mutex<ConnectionState>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ConnectionManager {
    /// Create a manager pointing at the default backend.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    /// Create a manager with a custom base URL.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
            retry: RetryPolicy::default(),
            state: Arc::new(Mutex::new(ConnectionState::Idle)),
            cancel: Mutex::new(None),
        }
    }

    /// Override the connect retry policy (builder pattern).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Base URL this manager talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Snapshot of the current connection state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.state).clone()
    }

    /// Cancel the in-flight stream, if any. Safe to call at any time; a
    /// cancel with no active stream is a no-op.
    pub fn cancel(&self) {
        let guard = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = guard.as_ref() {
            info!("cancelling active stream");
            token.cancel();
        }
    }

    /// Submit an analysis request and drive its stream to completion.
    ///
    /// Events are applied to `session` strictly in arrival order, with a
    /// cooperative yield after each one so a consumer task sees updates
    /// incrementally. Returns `Ok` on normal end of stream and on
    /// cancellation; only connect and transport failures are errors.
    pub async fn submit<C, S>(
        &self,
        request: &AnalysisRequest,
        session: &mut StreamSession<C, S>,
    ) -> Result<(), ConnectionError>
    where
        C: StreamCallbacks,
        S: ResultSink,
    {
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        self.set_state(ConnectionState::Connecting);

        let response = tokio::select! {
            _ = token.cancelled() => {
                self.finish(ConnectionState::Closed);
                return Ok(());
            }
            result = self.retry.run(|| self.connect(request)) => match result {
                Ok(response) => response,
                Err(err) => {
                    warn!(code = err.error_code(), "stream connect failed: {}", err);
                    self.finish(ConnectionState::Error(err.user_message()));
                    return Err(err);
                }
            }
        };

        self.set_state(ConnectionState::Connected);
        debug!(session_id = %request.session_id, "stream connected");

        let url = format!("{}{}", self.base_url, STREAM_PATH);
        let mut frames = FrameBuffer::new();
        let mut body = response.bytes_stream();

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("stream cancelled");
                    self.finish(ConnectionState::Closed);
                    return Ok(());
                }
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        frames.push(&bytes);
                        while let Some(payload) = frames.next_frame() {
                            dispatch_frame(&payload, session).await;
                        }
                    }
                    Some(Err(e)) => {
                        let err = classify_reqwest_error(&e, &url);
                        warn!(code = err.error_code(), "stream read failed: {}", err);
                        self.finish(ConnectionState::Error(err.user_message()));
                        return Err(err);
                    }
                    None => break,
                }
            }
        }

        // The backend may end without a trailing delimiter.
        if let Some(payload) = frames.flush() {
            dispatch_frame(&payload, session).await;
        }

        debug!(session_id = %request.session_id, "stream ended");
        self.finish(ConnectionState::Idle);
        Ok(())
    }

    async fn connect(&self, request: &AnalysisRequest) -> Result<reqwest::Response, ConnectionError> {
        let url = format!("{}{}", self.base_url, STREAM_PATH);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, &url))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ConnectionError::HttpStatus { status, message });
        }

        Ok(response)
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    /// Terminal state transition: also drops the cancel token so a late
    /// cancel() is a no-op.
    fn finish(&self, state: ConnectionState) {
        self.set_state(state);
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract and apply one frame payload, then yield to the scheduler.
///
/// A malformed frame is logged and skipped; it never aborts the stream.
async fn dispatch_frame<C, S>(payload: &str, session: &mut StreamSession<C, S>)
where
    C: StreamCallbacks,
    S: ResultSink,
{
    match extract_event(payload) {
        Ok(event) => {
            session.apply(event).await;
            tokio::task::yield_now().await;
        }
        Err(err) => {
            warn!("skipping malformed frame: {}", err);
        }
    }
}

fn lock(state: &Arc<Mutex<ConnectionState>>) -> std::sync::MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}
