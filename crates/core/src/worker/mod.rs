//! The pipeline stage coordinator.
//!
//! Composition: a [`StageWorker`] runs one [`BatchDrainLoop`] per drain
//! cycle, sizing visibility leases with [`lease_seconds`], dispatching
//! each message to a [`StageHandler`], and posting at most one
//! downstream signal through the [`StageCompletionSignaler`].

pub mod backoff;
mod drain;
mod handler;
mod lease;
mod signaler;
mod types;
#[allow(clippy::module_inception)]
mod worker;

pub use backoff::BackoffSchedule;
pub use drain::*;
pub use handler::*;
pub use lease::*;
pub use signaler::*;
pub use types::*;
pub use worker::*;
