//! Run lifecycle controller.
//!
//! Binds submission and polling to a single lifecycle and publishes a snapshot to the
//! consumer on every transition. At most one poller is alive per monitor: starting a
//! new run cancels the previous poller before the new submission is sent, and every
//! callback is tagged with the session that created it so a superseded run can never
//! write into the state of a newer one.

use crate::engine::{lock, PollObserver, Poller, Submitter};
use crate::error::{MonitorError, Result};
use crate::model::{MonitorPhase, MonitorSnapshot, ReportedError, RunId, RunRequest, RunStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// How a `run_start` call ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The run was accepted and is being polled.
    Started(RunId),
    /// A later `run_start` or `dispose` took over while this one was submitting.
    Superseded,
}

struct MonitorState {
    phase: MonitorPhase,
    status: Option<RunStatus>,
    error: Option<ReportedError>,
    /// Bumped by every `run_start`; callbacks from older sessions are ignored.
    session: u64,
    /// Never query or cancel this while the state lock is held: poll callbacks lock
    /// the session first and this state second.
    poller: Option<Poller>,
    disposed: bool,
}

impl MonitorState {
    fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            phase: self.phase,
            status: self.status.clone(),
            error: self.error.clone(),
        }
    }

    fn accepts(&self, session: u64) -> bool {
        !self.disposed && self.session == session
    }
}

struct Shared {
    state: Mutex<MonitorState>,
    events: UnboundedSender<MonitorSnapshot>,
}

impl Shared {
    fn publish(&self, state: &MonitorState) {
        debug!(
            name: "monitor.phase",
            phase = ?state.phase,
            session = state.session,
            "monitor transition"
        );
        // A consumer that stopped listening is not an error for the monitor.
        let _ = self.events.send(state.snapshot());
    }
}

/// Poll callbacks routed into the monitor for one session.
struct SessionObserver {
    shared: Arc<Shared>,
    session: u64,
}

impl PollObserver for SessionObserver {
    fn on_update(&mut self, status: RunStatus) {
        let mut state = lock(&self.shared.state);
        if !state.accepts(self.session) {
            return;
        }
        state.phase = if status.is_terminal() {
            info!(
                name: "monitor.run.finished",
                run_id = %status.run_id,
                status = %status.status,
                "run reached a terminal status"
            );
            MonitorPhase::Terminal
        } else {
            MonitorPhase::Polling
        };
        state.status = Some(status);
        self.shared.publish(&state);
    }

    fn on_error(&mut self, error: MonitorError) {
        let mut state = lock(&self.shared.state);
        if !state.accepts(self.session) {
            return;
        }
        state.phase = MonitorPhase::Terminal;
        state.error = Some(ReportedError::from(&error));
        self.shared.publish(&state);
    }
}

/// Controller a consumer drives: `run_start`, `dispose`, and a snapshot stream.
///
/// Dropping the monitor disposes it.
pub struct RunMonitor {
    shared: Arc<Shared>,
    submitter: Submitter,
    poll_interval: Duration,
}

impl RunMonitor {
    /// Create an idle monitor and the receiver its snapshots are published on.
    pub fn new(
        submitter: Submitter,
        poll_interval: Duration,
    ) -> (Self, UnboundedReceiver<MonitorSnapshot>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = MonitorState {
            phase: MonitorPhase::Idle,
            status: None,
            error: None,
            session: 0,
            poller: None,
            disposed: false,
        };
        let monitor = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                events,
            }),
            submitter,
            poll_interval,
        };
        (monitor, rx)
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        lock(&self.shared.state).snapshot()
    }

    pub fn phase(&self) -> MonitorPhase {
        lock(&self.shared.state).phase
    }

    /// Run currently being polled, if its session is still active.
    ///
    /// Answered from the monitor state alone: poll callbacks take the session lock and
    /// then this one, so the session lock must never be taken while holding it.
    pub fn active_run(&self) -> Option<RunId> {
        let state = lock(&self.shared.state);
        if state.phase != MonitorPhase::Polling {
            return None;
        }
        state.poller.as_ref().map(|p| p.run_id().clone())
    }

    /// Submit a new run and start polling it, replacing whatever ran before.
    ///
    /// The previous poller is cancelled before the submission is sent. Submission
    /// failures move the monitor back to `Idle` with the error attached and are also
    /// returned. If this future is dropped mid-submission the monitor stays in
    /// `Starting` until the next `run_start` or `dispose`.
    pub async fn run_start(&self, request: Option<RunRequest>) -> Result<StartOutcome> {
        let (session, previous) = {
            let mut state = lock(&self.shared.state);
            if state.disposed {
                return Ok(StartOutcome::Superseded);
            }
            state.session += 1;
            state.phase = MonitorPhase::Starting;
            state.status = None;
            state.error = None;
            self.shared.publish(&state);
            (state.session, state.poller.take())
        };

        // Outside the state lock: cancel waits for any in-flight callback, which
        // itself needs the state lock.
        if let Some(poller) = previous {
            debug!(
                name: "monitor.poller.replaced",
                run_id = %poller.run_id(),
                "cancelling previous run"
            );
            poller.cancel();
        }

        let submitted = self.submitter.submit(request.as_ref()).await;

        let mut state = lock(&self.shared.state);
        if !state.accepts(session) {
            debug!(name: "monitor.start.superseded", session, "discarding submission result");
            return Ok(StartOutcome::Superseded);
        }

        match submitted {
            Ok(run_id) => {
                state.phase = MonitorPhase::Polling;
                self.shared.publish(&state);
                let observer = SessionObserver {
                    shared: Arc::clone(&self.shared),
                    session,
                };
                state.poller = Some(Poller::start(
                    self.submitter.backend(),
                    self.submitter.variant(),
                    run_id.clone(),
                    self.poll_interval,
                    observer,
                ));
                Ok(StartOutcome::Started(run_id))
            }
            Err(e) => {
                state.phase = MonitorPhase::Idle;
                state.error = Some(ReportedError::from(&e));
                self.shared.publish(&state);
                Err(e)
            }
        }
    }

    /// Cancel the active poller and stop publishing. Idempotent.
    pub fn dispose(&self) {
        let previous = {
            let mut state = lock(&self.shared.state);
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.poller.take()
        };
        if let Some(poller) = previous {
            poller.cancel();
        }
        debug!(name: "monitor.disposed", "monitor disposed");
    }
}

impl Drop for RunMonitor {
    fn drop(&mut self) {
        self.dispose();
    }
}
