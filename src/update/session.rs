//! Lock-protected update session.
//!
//! Every field lives behind one mutex. Mutators return the [`UpdateEvent`]
//! to broadcast instead of broadcasting themselves, so the caller can emit
//! it after the guard has been released.

use super::descriptor::{DescriptorCache, ServerDescriptor};
use super::notifier::UpdateEvent;
use super::state::UpdateState;
use crate::error::UpdateError;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// What the retrieval client should do after a progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressControl {
    /// Keep transferring.
    Continue,
    /// Stop now and report [`FetchError::Cancelled`](crate::error::FetchError::Cancelled).
    Abort,
}

/// Consistent point-in-time view of the session.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateSnapshot {
    /// Current lifecycle state.
    pub state: UpdateState,
    /// Bytes written so far, if a download is active or finished.
    pub bytes_downloaded: Option<u64>,
    /// Expected artifact size, if known.
    pub total_bytes: Option<u64>,
    /// Message of the recorded failure, present iff `state` is `Error`.
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct SessionInner {
    state: UpdateState,
    error_cause: Option<Arc<UpdateError>>,
    bytes_downloaded: Option<u64>,
    total_bytes: Option<u64>,
    descriptor: DescriptorCache,
}

impl SessionInner {
    /// Apply a transition and keep the counter and cause invariants.
    fn transition(&mut self, state: UpdateState) {
        self.state = state;

        if state == UpdateState::DownloadFinished {
            self.bytes_downloaded = self.total_bytes;
        } else if !state.tracks_bytes() {
            self.bytes_downloaded = None;
            self.total_bytes = None;
        }

        if state != UpdateState::Error {
            self.error_cause = None;
        }
    }

    fn fail(&mut self, error: UpdateError) {
        self.transition(UpdateState::Error);
        self.error_cause = Some(Arc::new(error));
    }
}

/// Mutable record of the update lifecycle, shared between the worker and
/// any number of reader threads.
#[derive(Debug, Default)]
pub struct UpdateSession {
    inner: Mutex<SessionInner>,
    cancel: CancellationToken,
}

impl UpdateSession {
    /// Create a session in `NothingKnown`.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state.
    pub fn state(&self) -> UpdateState {
        self.lock().state
    }

    /// Recorded failure, present iff the state is `Error`.
    pub fn error_cause(&self) -> Option<Arc<UpdateError>> {
        self.lock().error_cause.clone()
    }

    /// Bytes downloaded so far.
    pub fn bytes_downloaded(&self) -> Option<u64> {
        self.lock().bytes_downloaded
    }

    /// Expected artifact size.
    pub fn total_bytes(&self) -> Option<u64> {
        self.lock().total_bytes
    }

    /// Read all observable fields under one lock acquisition.
    pub fn snapshot(&self) -> UpdateSnapshot {
        let inner = self.lock();
        UpdateSnapshot {
            state: inner.state,
            bytes_downloaded: inner.bytes_downloaded,
            total_bytes: inner.total_bytes,
            error: inner.error_cause.as_ref().map(|e| e.message().to_owned()),
        }
    }

    /// Move to `state`.
    pub fn set_state(&self, state: UpdateState) -> UpdateEvent {
        self.lock().transition(state);
        UpdateEvent::StateChanged { state }
    }

    /// Move to `Error`, replacing any previous cause.
    pub fn fail(&self, error: UpdateError) -> UpdateEvent {
        self.lock().fail(error);
        UpdateEvent::StateChanged {
            state: UpdateState::Error,
        }
    }

    /// Fail unless the session is already in `Error`.
    ///
    /// Returns `None` when an earlier failure is kept.
    pub fn fail_if_healthy(&self, error: UpdateError) -> Option<UpdateEvent> {
        let mut inner = self.lock();
        if inner.state.is_error() {
            return None;
        }
        inner.fail(error);
        Some(UpdateEvent::StateChanged {
            state: UpdateState::Error,
        })
    }

    /// Atomically move `from` → `to`. Returns `None` if the session was in
    /// any other state.
    pub fn advance_if(&self, from: UpdateState, to: UpdateState) -> Option<UpdateEvent> {
        let mut inner = self.lock();
        if inner.state != from {
            return None;
        }
        inner.transition(to);
        Some(UpdateEvent::StateChanged { state: to })
    }

    /// Move to `DownloadFinished` and snap the counters to the final size.
    ///
    /// When the server never announced a size, `written` becomes the total.
    pub fn finish_download(&self, written: u64) -> UpdateEvent {
        let mut inner = self.lock();
        if inner.total_bytes.is_none() {
            inner.total_bytes = Some(written);
        }
        inner.transition(UpdateState::DownloadFinished);
        UpdateEvent::StateChanged {
            state: UpdateState::DownloadFinished,
        }
    }

    /// Record a progress tick and decide whether the transfer may continue.
    ///
    /// If cancellation was requested the session moves to `Error` with a
    /// "Download cancelled" cause and the caller must abort the transfer.
    pub fn record_progress(
        &self,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    ) -> (ProgressControl, UpdateEvent) {
        let mut inner = self.lock();
        inner.bytes_downloaded = Some(bytes_downloaded);
        inner.total_bytes = total_bytes;

        if self.cancel.is_cancelled() {
            inner.fail(UpdateError::new("Download cancelled"));
            return (
                ProgressControl::Abort,
                UpdateEvent::StateChanged {
                    state: UpdateState::Error,
                },
            );
        }

        (
            ProgressControl::Continue,
            UpdateEvent::Progress {
                bytes_downloaded,
                total_bytes,
            },
        )
    }

    /// Request cancellation of the current or next download. Sticky.
    pub fn request_cancel(&self) {
        let _guard = self.lock();
        self.cancel.cancel();
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        let _guard = self.lock();
        self.cancel.is_cancelled()
    }

    /// Store a freshly parsed descriptor and move to `state` in one step.
    pub fn install_descriptor(
        &self,
        descriptor: ServerDescriptor,
        state: UpdateState,
    ) -> UpdateEvent {
        let mut inner = self.lock();
        inner.descriptor.replace(descriptor);
        inner.transition(state);
        UpdateEvent::StateChanged { state }
    }

    /// Run `f` against the descriptor cache under the session lock.
    pub fn with_descriptor<R>(&self, f: impl FnOnce(&DescriptorCache) -> R) -> R {
        f(&self.lock().descriptor)
    }
}
