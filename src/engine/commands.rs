//! Command enum for the per-class reconciler actors
//!
//! Commands are divided into fire-and-forget intents (ack = the command
//! queued) and request-response operations that answer via a oneshot
//! channel. All commands apply in arrival order: each class actor processes
//! its queue sequentially, which is what gives the store its last-writer-wins
//! guarantee without locks.

use crate::device::{Device, DeviceId};
use tokio::sync::oneshot;

/// Commands accepted by a reconciler actor
///
/// Audio-only commands (`SetVolume`, `SetMute`, `SetLock`, `SetPreferred`,
/// `DetectPreferredDevice`) are routed to the audio actor by
/// [`EngineHandle`](super::EngineHandle); camera enable/disable commands to
/// the camera actor. Every explicit command targeting a device clears its
/// suspension and failure counters before reconverging.
#[derive(Debug)]
pub enum EngineCommand {
    // -------------------------------------------------------------------
    // Fire-and-forget intents
    // -------------------------------------------------------------------
    /// Set the target capture volume and converge the target device now
    SetVolume { percent: u8 },

    /// Mute or unmute the target device; unmuting restores the recorded
    /// volume
    SetMute { muted: bool },

    /// Enable or disable the continuous volume lock
    SetLock {
        enabled: bool,
        volume_percent: Option<u8>,
    },

    /// Pin audio commands to a specific device (None = default endpoint)
    SetPreferred { id: Option<DeviceId> },

    /// Explicit per-device intent: device enabled
    EnableDevice { id: DeviceId },

    /// Explicit per-device intent: device disabled
    DisableDevice { id: DeviceId },

    /// Class-wide bulk intent: every device enabled
    EnableAll,

    /// Class-wide bulk intent: every device disabled
    DisableAll,

    /// Pause or resume the periodic reconcile tick for this class
    SetReconcileEnabled { enabled: bool },

    // -------------------------------------------------------------------
    // Request-response operations
    // -------------------------------------------------------------------
    /// Run a reconcile pass immediately and return the refreshed device list
    RefreshNow {
        response: oneshot::Sender<Vec<Device>>,
    },

    /// Refresh and return non-default devices as preferred-device candidates
    DetectPreferredDevice {
        response: oneshot::Sender<Vec<Device>>,
    },

    /// Return the current device list without triggering a pass
    ListDevices {
        response: oneshot::Sender<Vec<Device>>,
    },

    /// Gracefully stop the actor; no forced device reset is performed
    Shutdown,
}
