//! Device Control Provider interface
//!
//! The provider performs the real enumerate/apply operations against the
//! host. Implementations must use interior mutability: all methods take
//! `&self` to support `Arc<dyn DeviceControlProvider>`.
//!
//! Every call the engine issues goes through a per-call timeout; a timed-out
//! call counts as a failure for backoff purposes and never stalls the
//! reconciliation of other devices.

use crate::device::{DeviceClass, DeviceId, DeviceValue, EnumeratedDevice};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

pub mod sim;

pub use sim::SimProvider;

/// Why an apply failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyError {
    /// The device is not (or no longer) known to the host
    #[error("device not found")]
    NotFound,
    /// The provider lacks the capability to change this device
    #[error("access denied")]
    AccessDenied,
    /// The device is in use and rejected the change
    #[error("device busy")]
    Busy,
    /// Anything else, including provider-call timeouts
    #[error("{0}")]
    Unknown(String),
}

/// Abstract OS-facing device control surface
#[async_trait]
pub trait DeviceControlProvider: Send + Sync {
    /// Provider name for logs (e.g. "wasapi", "pnp", "sim")
    fn name(&self) -> &str;

    /// Enumerate devices of a class with their current raw state
    ///
    /// May return fewer devices than truly present (permission or driver
    /// issue) but must never fabricate devices.
    async fn enumerate(&self, class: DeviceClass) -> Result<Vec<EnumeratedDevice>>;

    /// Apply a value to a device
    async fn apply(&self, id: &DeviceId, value: &DeviceValue) -> Result<(), ApplyError>;
}

/// Enumerate with a per-call timeout; a timeout is an enumeration failure
pub async fn enumerate_with_timeout(
    provider: &dyn DeviceControlProvider,
    class: DeviceClass,
    limit: Duration,
) -> Result<Vec<EnumeratedDevice>> {
    match timeout(limit, provider.enumerate(class)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                provider = provider.name(),
                %class,
                timeout_ms = limit.as_millis() as u64,
                "enumerate timed out"
            );
            Err(anyhow::anyhow!("enumerate {} timed out", class))
        }
    }
}

/// Apply with a per-call timeout; a timeout maps to `ApplyError::Unknown`
pub async fn apply_with_timeout(
    provider: &dyn DeviceControlProvider,
    id: &DeviceId,
    value: &DeviceValue,
    limit: Duration,
) -> Result<(), ApplyError> {
    match timeout(limit, provider.apply(id, value)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                provider = provider.name(),
                %id,
                timeout_ms = limit.as_millis() as u64,
                "apply timed out"
            );
            Err(ApplyError::Unknown("provider call timed out".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HangingProvider;

    #[async_trait]
    impl DeviceControlProvider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn enumerate(&self, _class: DeviceClass) -> Result<Vec<EnumeratedDevice>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }

        async fn apply(&self, _id: &DeviceId, _value: &DeviceValue) -> Result<(), ApplyError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enumerate_timeout_is_failure() {
        let provider = HangingProvider;
        let result =
            enumerate_with_timeout(&provider, DeviceClass::Audio, Duration::from_millis(100)).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_timeout_maps_to_unknown() {
        let provider = HangingProvider;
        let result = apply_with_timeout(
            &provider,
            &DeviceId::from("mic-1"),
            &DeviceValue::Audio {
                volume_percent: 50,
                muted: false,
            },
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(ApplyError::Unknown(_))));
    }
}
