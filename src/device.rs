//! Core device type definitions
//!
//! Defines the types shared by the registry, the desired-state store, and the
//! reconciliation engine: device identity, device class, observed values, and
//! user intent with field-level opinions.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Volume restored when the user unmutes a device whose desired volume is 0
pub const DEFAULT_UNMUTE_VOLUME: u8 = 50;

/// Opaque, OS-assigned device identity
///
/// Stable across enumerations only for as long as the OS keeps assigning it.
/// If the OS reassigns identity, the old device is treated as removed and a
/// new one added; nothing in the crate matches devices by display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Class of host peripheral the crate tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Audio-capture endpoints (microphones)
    Audio,
    /// Camera devices
    Camera,
}

impl DeviceClass {
    /// All tracked classes
    pub fn all() -> &'static [DeviceClass] {
        &[DeviceClass::Audio, DeviceClass::Camera]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Audio => "audio",
            DeviceClass::Camera => "camera",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(DeviceClass::Audio),
            "camera" => Some(DeviceClass::Camera),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete device state as reported by (or sent to) the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum DeviceValue {
    Audio {
        /// Capture volume, 0-100
        volume_percent: u8,
        muted: bool,
    },
    Camera {
        enabled: bool,
    },
}

impl DeviceValue {
    pub fn class(&self) -> DeviceClass {
        match self {
            DeviceValue::Audio { .. } => DeviceClass::Audio,
            DeviceValue::Camera { .. } => DeviceClass::Camera,
        }
    }

    /// Clamp the volume into 0-100; cameras are unaffected
    pub fn clamped(self) -> Self {
        match self {
            DeviceValue::Audio {
                volume_percent,
                muted,
            } => DeviceValue::Audio {
                volume_percent: volume_percent.min(100),
                muted,
            },
            other => other,
        }
    }

    pub fn volume_percent(&self) -> Option<u8> {
        match self {
            DeviceValue::Audio { volume_percent, .. } => Some(*volume_percent),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> Option<bool> {
        match self {
            DeviceValue::Camera { enabled } => Some(*enabled),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceValue::Audio {
                volume_percent,
                muted,
            } => write!(
                f,
                "volume {}%{}",
                volume_percent,
                if *muted { " (muted)" } else { "" }
            ),
            DeviceValue::Camera { enabled } => {
                write!(f, "{}", if *enabled { "enabled" } else { "disabled" })
            }
        }
    }
}

/// User intent for a device, with field-level opinions
///
/// An unset field carries no opinion and is never reconciled. A desired value
/// with no opinions at all never produces an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum DesiredValue {
    Audio {
        volume_percent: Option<u8>,
        muted: Option<bool>,
    },
    Camera {
        enabled: bool,
    },
}

impl DesiredValue {
    pub fn camera(enabled: bool) -> Self {
        DesiredValue::Camera { enabled }
    }

    pub fn class(&self) -> DeviceClass {
        match self {
            DesiredValue::Audio { .. } => DeviceClass::Audio,
            DesiredValue::Camera { .. } => DeviceClass::Camera,
        }
    }

    /// True when no field carries an opinion
    pub fn is_empty(&self) -> bool {
        matches!(
            self,
            DesiredValue::Audio {
                volume_percent: None,
                muted: None,
            }
        )
    }

    /// Clamp the volume opinion into 0-100
    pub fn clamped(self) -> Self {
        match self {
            DesiredValue::Audio {
                volume_percent,
                muted,
            } => DesiredValue::Audio {
                volume_percent: volume_percent.map(|v| v.min(100)),
                muted,
            },
            other => other,
        }
    }

    /// Whether the observed value diverges from this intent
    ///
    /// Volume drifts only when it differs by more than `tolerance` percent;
    /// mute and enabled compare exactly. Fields with no opinion never drift.
    /// A class mismatch (should not happen: registries are per class) is
    /// treated as drift so the next apply corrects it.
    pub fn drifts_from(&self, observed: &DeviceValue, tolerance: u8) -> bool {
        match (self, observed) {
            (
                DesiredValue::Audio {
                    volume_percent: want_vol,
                    muted: want_mute,
                },
                DeviceValue::Audio {
                    volume_percent,
                    muted,
                },
            ) => {
                let vol_drift = want_vol
                    .map(|want| volume_percent.abs_diff(want) > tolerance)
                    .unwrap_or(false);
                let mute_drift = want_mute.map(|want| *muted != want).unwrap_or(false);
                vol_drift || mute_drift
            }
            (DesiredValue::Camera { enabled: want }, DeviceValue::Camera { enabled }) => {
                enabled != want
            }
            _ => true,
        }
    }

    /// Materialize the full value to send to the provider
    ///
    /// Fields with an opinion take the desired value; fields without keep the
    /// observed value, so an apply never disturbs state the user did not ask
    /// to control.
    pub fn apply_over(&self, observed: &DeviceValue) -> DeviceValue {
        match (self, observed) {
            (
                DesiredValue::Audio {
                    volume_percent: want_vol,
                    muted: want_mute,
                },
                DeviceValue::Audio {
                    volume_percent,
                    muted,
                },
            ) => DeviceValue::Audio {
                volume_percent: want_vol.unwrap_or(*volume_percent).min(100),
                muted: want_mute.unwrap_or(*muted),
            },
            (DesiredValue::Camera { enabled }, _) => DeviceValue::Camera { enabled: *enabled },
            // Class mismatch: fall back to pure intent with defaults
            (
                DesiredValue::Audio {
                    volume_percent,
                    muted,
                },
                _,
            ) => DeviceValue::Audio {
                volume_percent: volume_percent.unwrap_or(DEFAULT_UNMUTE_VOLUME).min(100),
                muted: muted.unwrap_or(false),
            },
        }
    }
}

/// A tracked device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub class: DeviceClass,
    pub display_name: String,
    /// Whether the OS reports this as the default endpoint (audio only)
    pub is_default: bool,
    /// Timestamp of first enumeration (milliseconds since epoch)
    pub enumerated_at: u64,
}

/// Last state observed for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub value: DeviceValue,
    /// Timestamp of the observation (milliseconds since epoch),
    /// monotonically non-decreasing per device
    pub observed_at: u64,
    /// False when the last provider call failed or the device was absent
    /// from the last enumeration
    pub valid: bool,
}

/// One entry of a provider enumeration snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratedDevice {
    pub id: DeviceId,
    pub display_name: String,
    pub is_default: bool,
    pub value: DeviceValue,
}

/// Current timestamp in milliseconds since epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
