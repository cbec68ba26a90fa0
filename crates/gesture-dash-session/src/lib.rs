//! Stream session orchestration for the gesture dashboard.
//!
//! Provides:
//! - `StreamSession` - Camera lifecycle state machine
//! - `ConfigSync` - Optimistic remote toggles with rollback
//! - `SessionController` - The public surface tying it all together
//! - Remote implementations (in-memory)

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config_sync;
pub mod controller;
pub mod remote;
pub mod stream;

pub use config_sync::{ConfigSync, SyncOutcome};
pub use controller::SessionController;
pub use stream::{CommandOutcome, StreamSession};

#[cfg(feature = "memory")]
pub use remote::InMemoryRemote;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
