//! Outward event stream
//!
//! The engine and registry publish events on a tokio broadcast channel for
//! consumers (CLI, future UI). Ordering is per-device FIFO; cross-device
//! ordering is not guaranteed. A lagging consumer loses the oldest events
//! rather than blocking reconciliation.

use crate::device::{Device, DeviceClass, DeviceId, ObservedState};
use crate::provider::ApplyError;
use serde::Serialize;
use tokio::sync::broadcast;

/// Broadcast buffer size; slow consumers past this lag drop oldest events
const EVENT_CAPACITY: usize = 256;

/// Events emitted by the registry and the reconciliation engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    DeviceAdded {
        device: Device,
    },
    DeviceRemoved {
        id: DeviceId,
    },
    DeviceStateObserved {
        id: DeviceId,
        state: ObservedState,
    },
    ApplyFailed {
        id: DeviceId,
        reason: ApplyError,
        consecutive_failures: u32,
    },
    /// Automatic retries stopped after repeated failures; an explicit user
    /// command targeting the device resumes reconciliation
    DeviceSuspended {
        id: DeviceId,
    },
    /// An explicit command found no present device to act on
    TargetMissing {
        class: DeviceClass,
    },
}

/// Cheap-to-clone publisher/subscriber pair over the event stream
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event; a send with no subscribers is not an error
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
