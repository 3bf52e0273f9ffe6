//! Streaming sessions: one driver loop plus background feedback tasks.
//!
//! Every session owns a cancellation token and a task group. When the
//! driver returns (end of stream, cancellation or failure) the supervisor
//! cancels the token, aborts and joins the group, then publishes the
//! outcome. No task outlives its session.

mod feedback;
mod pacer;
mod receive;
mod track;
mod transmit;

use std::future::Future;
use std::io;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;

pub use pacer::Pacer;
pub use receive::{receive_direct, receive_track};
pub use track::{RemoteTrack, RtcpReader, RtcpWriter, Sample, SampleWriter};
pub use transmit::{transmit_direct, transmit_track};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the ready signal (track paths).
    Idle,
    /// Sockets are open, first frame not yet sent (direct paths).
    EndpointsResolved,
    Streaming,
    Ended,
    Failed,
}

/// How a session finished.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The frame source reached end of stream.
    Completed,
    Cancelled,
    Failed(SessionError),
}

/// Why a driver loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    EndOfStream,
    Cancelled,
}

/// Caller-side view of a running session.
pub struct SessionHandle {
    label: &'static str,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    done: oneshot::Receiver<SessionOutcome>,
}

impl SessionHandle {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Request an orderly stop. The outcome will be `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the session to finish. All of its tasks have stopped by the
    /// time this returns.
    pub async fn wait(mut self) -> SessionOutcome {
        match (&mut self.done).await {
            Ok(outcome) => outcome,
            Err(_) => SessionOutcome::Failed(SessionError::Io(io::Error::other(
                "session supervisor exited without an outcome",
            ))),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Collects a session's background tasks before the driver starts.
pub(crate) struct SessionBuilder {
    label: &'static str,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    state: watch::Sender<SessionState>,
}

impl SessionBuilder {
    pub(crate) fn new(label: &'static str, initial: SessionState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            label,
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            state,
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn state_sender(&self) -> watch::Sender<SessionState> {
        self.state.clone()
    }

    /// Spawn a background task that stops when the session token fires.
    pub(crate) fn spawn_background<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let label = self.label;
        self.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = task => {}
            }
            tracing::debug!("{}: {} task stopped", label, name);
        });
    }

    /// Spawn the supervisor around `driver` and hand back the caller's handle.
    pub(crate) fn run<F>(self, driver: F) -> SessionHandle
    where
        F: Future<Output = Result<StreamEnd, SessionError>> + Send + 'static,
    {
        let SessionBuilder {
            label,
            cancel,
            mut tasks,
            state,
        } = self;
        let (done_tx, done_rx) = oneshot::channel();
        let state_rx = state.subscribe();

        let token = cancel.clone();
        tokio::spawn(async move {
            let result = driver.await;

            token.cancel();
            tasks.shutdown().await;

            let (next, outcome) = match result {
                Ok(StreamEnd::EndOfStream) => {
                    tracing::info!("{}: end of stream", label);
                    (SessionState::Ended, SessionOutcome::Completed)
                }
                Ok(StreamEnd::Cancelled) => {
                    tracing::info!("{}: cancelled", label);
                    (SessionState::Ended, SessionOutcome::Cancelled)
                }
                Err(e) => {
                    tracing::error!("{}: session failed: {}", label, e);
                    (SessionState::Failed, SessionOutcome::Failed(e))
                }
            };
            state.send_replace(next);
            let _ = done_tx.send(outcome);
        });

        SessionHandle {
            label,
            cancel,
            state: state_rx,
            done: done_rx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_background_tasks_stop_before_outcome() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut builder = SessionBuilder::new("test", SessionState::Streaming);
        let guard = SetOnDrop(dropped.clone());
        builder.spawn_background("forever", async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });

        let handle = builder.run(async { Ok(StreamEnd::EndOfStream) });
        let mut states = handle.subscribe();
        assert!(matches!(handle.wait().await, SessionOutcome::Completed));
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(*states.borrow_and_update(), SessionState::Ended);
    }

    #[tokio::test]
    async fn test_failure_sets_failed_state() {
        let builder = SessionBuilder::new("test", SessionState::Streaming);
        let handle = builder.run(async { Err(SessionError::parse("boom")) });
        let states = handle.subscribe();
        let outcome = handle.wait().await;
        assert!(matches!(outcome, SessionOutcome::Failed(SessionError::Parse(_))));
        assert_eq!(*states.borrow(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_reaches_driver() {
        let builder = SessionBuilder::new("test", SessionState::Streaming);
        let token = builder.token();
        let handle = builder.run(async move {
            token.cancelled().await;
            Ok(StreamEnd::Cancelled)
        });

        let cancel = handle.cancellation_token();
        let mut wait = tokio_test::task::spawn(handle.wait());
        tokio_test::assert_pending!(wait.poll());

        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Cancelled));
    }
}
