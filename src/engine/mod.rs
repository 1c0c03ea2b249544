mod backend;
mod poller;
mod submit;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{HttpBackend, RunBackend};
pub use poller::{PollObserver, Poller, SessionState};
pub use submit::Submitter;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in the engine leaves its state valid before it can panic,
/// so a poisoned lock still holds usable data.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
