//! Status polling for a single run.
//!
//! A session fetches once immediately, then again `interval` after each fetch
//! *completes*, so a slow backend stretches the cadence instead of stacking requests.
//! Results are delivered while holding the session lock, and `Poller::cancel` takes
//! that same lock, so once `cancel` returns no further callback can fire.

use crate::engine::{lock, RunBackend};
use crate::error::MonitorError;
use crate::model::{RunId, RunStatus, RunVariant};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Receives the outcome of each poll cycle.
///
/// Callbacks run on the polling task with the session lock held. They must not call
/// back into the `Poller` that invokes them.
pub trait PollObserver: Send + 'static {
    fn on_update(&mut self, status: RunStatus);
    fn on_error(&mut self, error: MonitorError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// A terminal run status was delivered.
    Terminal,
    /// A fetch failed; the error was delivered.
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    /// Schedule another fetch after the interval.
    Continue,
    Stopped,
}

/// One fetch-and-evaluate cycle at a time, bound to one run id.
pub(crate) struct PollSession<O> {
    backend: Arc<dyn RunBackend>,
    variant: RunVariant,
    run_id: RunId,
    observer: O,
    state: Arc<Mutex<SessionState>>,
    cycle: u64,
}

impl<O: PollObserver> PollSession<O> {
    pub fn new(
        backend: Arc<dyn RunBackend>,
        variant: RunVariant,
        run_id: RunId,
        observer: O,
    ) -> Self {
        Self {
            backend,
            variant,
            run_id,
            observer,
            state: Arc::new(Mutex::new(SessionState::Active)),
            cycle: 0,
        }
    }

    pub fn state_handle(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.state)
    }

    /// Run one cycle. A session that is no longer active returns `Stopped` without
    /// touching the backend.
    pub async fn tick(&mut self) -> Tick {
        if *lock(&self.state) != SessionState::Active {
            return Tick::Stopped;
        }

        self.cycle += 1;
        let result = self.backend.fetch_status(self.variant, &self.run_id).await;

        let mut state = lock(&self.state);
        if *state != SessionState::Active {
            debug!(
                name: "run.poll.discarded",
                run_id = %self.run_id,
                cycle = self.cycle,
                "dropping result for cancelled session"
            );
            return Tick::Stopped;
        }

        match result {
            Ok(status) => {
                if status.run_id != self.run_id {
                    warn!(
                        name: "run.poll.mismatch",
                        run_id = %self.run_id,
                        reported = %status.run_id,
                        "backend reported a different run id"
                    );
                }
                for violation in status.violations() {
                    warn!(
                        name: "run.poll.inconsistent",
                        run_id = %self.run_id,
                        cycle = self.cycle,
                        %violation,
                        "run status breaks sequencing rules"
                    );
                }
                debug!(
                    name: "run.poll",
                    run_id = %self.run_id,
                    cycle = self.cycle,
                    status = %status.status,
                    current_step = status.current_step.as_deref().unwrap_or("-"),
                    "status received"
                );
                let terminal = status.is_terminal();
                self.observer.on_update(status);
                if terminal {
                    *state = SessionState::Terminal;
                    Tick::Stopped
                } else {
                    Tick::Continue
                }
            }
            Err(e) => {
                warn!(
                    name: "run.poll.failed",
                    run_id = %self.run_id,
                    cycle = self.cycle,
                    kind = ?e.kind(),
                    error = %e,
                    "status poll failed, polling stopped"
                );
                self.observer.on_error(e);
                *state = SessionState::Failed;
                Tick::Stopped
            }
        }
    }
}

/// Handle to a running poll session.
///
/// Dropping the handle does not stop polling; call `cancel`.
pub struct Poller {
    run_id: RunId,
    state: Arc<Mutex<SessionState>>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Start polling `run_id` on the current tokio runtime.
    pub fn start<O: PollObserver>(
        backend: Arc<dyn RunBackend>,
        variant: RunVariant,
        run_id: RunId,
        interval: Duration,
        observer: O,
    ) -> Self {
        let mut session = PollSession::new(backend, variant, run_id.clone(), observer);
        let state = session.state_handle();
        debug!(
            name: "run.poll.start",
            run_id = %run_id,
            interval_ms = interval.as_millis() as u64,
            "polling started"
        );
        let handle = tokio::spawn(async move {
            while session.tick().await == Tick::Continue {
                tokio::time::sleep(interval).await;
            }
        });
        Self {
            run_id,
            state,
            handle,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Stop the session. Idempotent, and a no-op on a session that already ended.
    ///
    /// Any fetch still in flight is abandoned and its result never reaches the observer.
    pub fn cancel(&self) {
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Active {
                *state = SessionState::Cancelled;
                debug!(name: "run.poll.cancelled", run_id = %self.run_id, "polling cancelled");
            }
        }
        self.handle.abort();
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("run_id", &self.run_id)
            .field("state", &self.state())
            .finish()
    }
}
