//! Desired-State Store - user intent per device class
//!
//! Pure data holder, no I/O. Holds per-device explicit intents, the
//! class-wide bulk intent, the audio lock, and the preferred device. Written
//! only by explicit user commands; the reconciliation loop reads it but never
//! mutates it. Last-writer-wins per key: the owning engine actor processes
//! commands sequentially, so arrival order is write order.

use crate::device::{Device, DeviceClass, DeviceId, DesiredValue, DEFAULT_UNMUTE_VOLUME};
use std::collections::BTreeMap;

/// User intent for one device class
#[derive(Debug, Clone)]
pub struct DesiredStore {
    class: DeviceClass,
    /// Explicit per-device intents; stronger than any bulk intent
    per_device: BTreeMap<DeviceId, DesiredValue>,
    /// Class-wide camera intent ("all enabled" / "all disabled")
    bulk_enabled: Option<bool>,
    /// Audio lock: continuously enforce volume (and mute, if opined)
    lock_enabled: bool,
    lock_volume_percent: u8,
    /// Mute opinion; None = no opinion, the mute state is left alone
    muted: Option<bool>,
    /// Device the audio commands target; falls back to the default endpoint
    preferred_device: Option<DeviceId>,
}

impl DesiredStore {
    pub fn new(class: DeviceClass) -> Self {
        Self {
            class,
            per_device: BTreeMap::new(),
            bulk_enabled: None,
            lock_enabled: false,
            lock_volume_percent: DEFAULT_UNMUTE_VOLUME,
            muted: None,
            preferred_device: None,
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    // -------------------------------------------------------------------
    // Writes (explicit user commands only)
    // -------------------------------------------------------------------

    /// Set an explicit per-device intent (clamped)
    pub fn set_device(&mut self, id: DeviceId, value: DesiredValue) {
        self.per_device.insert(id, value.clamped());
    }

    pub fn clear_device(&mut self, id: &DeviceId) {
        self.per_device.remove(id);
    }

    /// Set the class-wide bulk intent
    ///
    /// A bulk command overwrites earlier per-device overrides: from here on
    /// the bulk value is the intent for every device of the class.
    pub fn set_bulk(&mut self, enabled: Option<bool>) {
        self.bulk_enabled = enabled;
        self.per_device.clear();
    }

    pub fn bulk_enabled(&self) -> Option<bool> {
        self.bulk_enabled
    }

    pub fn set_lock(&mut self, enabled: bool, volume_percent: Option<u8>) {
        self.lock_enabled = enabled;
        if let Some(volume) = volume_percent {
            self.lock_volume_percent = volume.min(100);
        }
    }

    pub fn lock_enabled(&self) -> bool {
        self.lock_enabled
    }

    pub fn lock_volume_percent(&self) -> u8 {
        self.lock_volume_percent
    }

    pub fn set_volume(&mut self, percent: u8) {
        self.lock_volume_percent = percent.min(100);
    }

    /// Record a mute opinion; unmuting with a desired volume of 0 restores a
    /// usable default so "unmute" audibly unmutes
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = Some(muted);
        if !muted && self.lock_volume_percent == 0 {
            self.lock_volume_percent = DEFAULT_UNMUTE_VOLUME;
        }
    }

    pub fn muted(&self) -> Option<bool> {
        self.muted
    }

    pub fn set_preferred(&mut self, id: Option<DeviceId>) {
        self.preferred_device = id;
    }

    pub fn preferred(&self) -> Option<&DeviceId> {
        self.preferred_device.as_ref()
    }

    // -------------------------------------------------------------------
    // Reads (reconciliation loop)
    // -------------------------------------------------------------------

    /// Whether a class-wide intent is in force (camera bulk or audio lock)
    pub fn has_class_intent(&self) -> bool {
        match self.class {
            DeviceClass::Camera => self.bulk_enabled.is_some(),
            DeviceClass::Audio => self.lock_enabled,
        }
    }

    /// Whether audio commands target this device
    pub fn is_audio_target(&self, device: &Device) -> bool {
        match &self.preferred_device {
            Some(preferred) => &device.id == preferred,
            None => device.is_default,
        }
    }

    /// Resolve the effective intent for a device, or None if the user has no
    /// opinion about it (such devices are never touched)
    ///
    /// Per-device explicit intent wins over the class-wide intent.
    pub fn resolve(&self, device: &Device) -> Option<DesiredValue> {
        if let Some(value) = self.per_device.get(&device.id) {
            if !value.is_empty() {
                return Some(value.clone());
            }
        }

        match self.class {
            DeviceClass::Camera => self
                .bulk_enabled
                .map(|enabled| DesiredValue::Camera { enabled }),
            DeviceClass::Audio => {
                if self.lock_enabled && self.is_audio_target(device) {
                    Some(DesiredValue::Audio {
                        volume_percent: Some(self.lock_volume_percent),
                        muted: self.muted,
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Drop the per-device intent for an evicted device
    ///
    /// Kept when a class-wide intent is in force: bulk intents survive
    /// unplug/replug and re-apply on rediscovery, and so does an explicit
    /// override layered on top of one.
    pub fn on_device_removed(&mut self, id: &DeviceId) {
        if !self.has_class_intent() {
            self.per_device.remove(id);
        }
    }
}
