//! devlock - holds microphone volume and camera enable state against
//! OS auto-adjustment
//!
//! The crate tracks audio-capture and camera devices, remembers what the
//! user asked for, and re-asserts that state whenever the OS drifts away
//! from it. One reconciler actor per device class owns its registry,
//! desired-state store, and convergence bookkeeping; user commands and the
//! periodic tick are serialized on the same task.

pub mod cli;
pub mod config;
pub mod desired;
pub mod device;
pub mod engine;
pub mod events;
pub mod prefs;
pub mod provider;
pub mod registry;

pub use config::{AppConfig, ReconcileConfig};
pub use desired::DesiredStore;
pub use device::{Device, DeviceClass, DeviceId, DeviceValue, DesiredValue};
pub use engine::{ClassHandle, EngineHandle};
pub use events::{Event, EventBus};
pub use prefs::{Preferences, PrefsHandle, PrefsPatch};
pub use provider::{ApplyError, DeviceControlProvider, SimProvider};
pub use registry::DeviceRegistry;
