//! Simulated host provider for tests and demo mode
//!
//! Keeps an in-memory device table and supports injecting the behaviors the
//! engine must survive: OS-initiated drift, scripted apply failures, failed
//! enumerations, and device unplug/replug.

use crate::device::{DeviceClass, DeviceId, DeviceValue, EnumeratedDevice};
use crate::provider::{ApplyError, DeviceControlProvider};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

struct SimDevice {
    display_name: String,
    is_default: bool,
    value: DeviceValue,
    /// When set, every apply to this device fails with this error
    apply_error: Option<ApplyError>,
}

#[derive(Default)]
struct SimInner {
    devices: BTreeMap<DeviceId, SimDevice>,
    /// Number of upcoming enumerations that fail outright
    enumerate_failures: u32,
    /// Every apply the engine issued, in order
    apply_log: Vec<(DeviceId, DeviceValue)>,
}

/// In-memory simulated host
#[derive(Clone, Default)]
pub struct SimProvider {
    inner: Arc<Mutex<SimInner>>,
}

impl SimProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device
    pub async fn add_device(
        &self,
        id: impl Into<DeviceId>,
        display_name: impl Into<String>,
        is_default: bool,
        value: DeviceValue,
    ) {
        let mut inner = self.inner.lock().await;
        inner.devices.insert(
            id.into(),
            SimDevice {
                display_name: display_name.into(),
                is_default,
                value,
                apply_error: None,
            },
        );
    }

    /// Unplug a device
    pub async fn remove_device(&self, id: &DeviceId) {
        self.inner.lock().await.devices.remove(id);
    }

    /// Overwrite a device's state as the OS would (drift injection)
    pub async fn drift(&self, id: &DeviceId, value: DeviceValue) {
        if let Some(dev) = self.inner.lock().await.devices.get_mut(id) {
            dev.value = value;
        }
    }

    /// Current value as the host sees it
    pub async fn value(&self, id: &DeviceId) -> Option<DeviceValue> {
        self.inner
            .lock()
            .await
            .devices
            .get(id)
            .map(|d| d.value.clone())
    }

    /// Make every apply to `id` fail with `error` (None clears)
    pub async fn set_apply_error(&self, id: &DeviceId, error: Option<ApplyError>) {
        if let Some(dev) = self.inner.lock().await.devices.get_mut(id) {
            dev.apply_error = error;
        }
    }

    /// Make the next `count` enumerations fail
    pub async fn fail_next_enumerations(&self, count: u32) {
        self.inner.lock().await.enumerate_failures = count;
    }

    /// Applies issued so far, in order
    pub async fn apply_log(&self) -> Vec<(DeviceId, DeviceValue)> {
        self.inner.lock().await.apply_log.clone()
    }

    /// Number of applies issued to a specific device
    pub async fn apply_count(&self, id: &DeviceId) -> usize {
        self.inner
            .lock()
            .await
            .apply_log
            .iter()
            .filter(|(dev, _)| dev == id)
            .count()
    }
}

#[async_trait]
impl DeviceControlProvider for SimProvider {
    fn name(&self) -> &str {
        "sim"
    }

    async fn enumerate(&self, class: DeviceClass) -> Result<Vec<EnumeratedDevice>> {
        let mut inner = self.inner.lock().await;
        if inner.enumerate_failures > 0 {
            inner.enumerate_failures -= 1;
            anyhow::bail!("simulated enumeration failure");
        }

        Ok(inner
            .devices
            .iter()
            .filter(|(_, dev)| dev.value.class() == class)
            .map(|(id, dev)| EnumeratedDevice {
                id: id.clone(),
                display_name: dev.display_name.clone(),
                is_default: dev.is_default,
                value: dev.value.clone(),
            })
            .collect())
    }

    async fn apply(&self, id: &DeviceId, value: &DeviceValue) -> Result<(), ApplyError> {
        let mut inner = self.inner.lock().await;
        inner.apply_log.push((id.clone(), value.clone()));

        let Some(dev) = inner.devices.get_mut(id) else {
            return Err(ApplyError::NotFound);
        };
        if let Some(err) = &dev.apply_error {
            return Err(err.clone());
        }

        dev.value = value.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mic(volume: u8) -> DeviceValue {
        DeviceValue::Audio {
            volume_percent: volume,
            muted: false,
        }
    }

    #[tokio::test]
    async fn test_enumerate_filters_by_class() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "USB Mic", true, mic(50)).await;
        sim.add_device("cam-1", "Webcam", false, DeviceValue::Camera { enabled: true })
            .await;

        let audio = sim.enumerate(DeviceClass::Audio).await.unwrap();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].id.as_str(), "mic-1");

        let cameras = sim.enumerate(DeviceClass::Camera).await.unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].id.as_str(), "cam-1");
    }

    #[tokio::test]
    async fn test_apply_updates_state_and_log() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "USB Mic", true, mic(50)).await;

        let id = DeviceId::from("mic-1");
        sim.apply(&id, &mic(80)).await.unwrap();

        assert_eq!(sim.value(&id).await, Some(mic(80)));
        assert_eq!(sim.apply_count(&id).await, 1);
    }

    #[tokio::test]
    async fn test_apply_to_missing_device_is_not_found() {
        let sim = SimProvider::new();
        let result = sim.apply(&DeviceId::from("ghost"), &mic(10)).await;
        assert_eq!(result, Err(ApplyError::NotFound));
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, DeviceValue::Camera { enabled: false })
            .await;
        let id = DeviceId::from("cam-1");

        sim.set_apply_error(&id, Some(ApplyError::AccessDenied)).await;
        let result = sim.apply(&id, &DeviceValue::Camera { enabled: true }).await;
        assert_eq!(result, Err(ApplyError::AccessDenied));
        // Failed apply must not change the host state
        assert_eq!(
            sim.value(&id).await,
            Some(DeviceValue::Camera { enabled: false })
        );

        sim.fail_next_enumerations(1).await;
        assert!(sim.enumerate(DeviceClass::Camera).await.is_err());
        assert!(sim.enumerate(DeviceClass::Camera).await.is_ok());
    }
}
