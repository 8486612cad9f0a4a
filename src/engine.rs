//! Reconciliation engine - desired vs observed convergence per device class
//!
//! One actor per device class owns its registry, desired-state store, and
//! convergence bookkeeping. The actors run concurrently (the camera tick
//! never waits on a slow audio provider call) while each class keeps a
//! strict single-writer discipline over its own devices.

mod actor;
mod backoff;
pub mod commands;
mod handle;

pub use backoff::{ConvergePhase, ConvergeState};
pub use commands::EngineCommand;
pub use handle::{ClassHandle, EngineHandle};
