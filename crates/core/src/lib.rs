//! Client-side core of the migration monitor: turns raw status polls into
//! display-ready state and owns the polling lifecycle.

pub mod controller;
pub mod error;
pub mod log;
pub mod phase;
pub mod presenter;
pub mod progress;
pub mod session;
pub mod source;

pub use controller::{Command, PollingConfig, PollingController, StartOutcome};
pub use error::{MonitorError, Result};
pub use log::{LogDelta, LogReconciler, LogView, ScrollPosition};
pub use phase::MigrationPhase;
pub use presenter::Presenter;
pub use progress::{reconcile, ReconciledState};
pub use session::{PollingSession, PollingState};
pub use source::StatusSource;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
