//! Handles for the reconciler actors
//!
//! [`ClassHandle`] wraps the command channel of one reconciler with
//! ergonomic methods: fire-and-forget for intents, async with a oneshot
//! response for queries. [`EngineHandle`] bundles the audio and camera
//! handles and routes class-specific commands to the right actor.

use super::actor::Reconciler;
use super::commands::EngineCommand;
use crate::config::ReconcileConfig;
use crate::desired::DesiredStore;
use crate::device::{Device, DeviceClass, DeviceId};
use crate::events::EventBus;
use crate::prefs::PrefsHandle;
use crate::provider::DeviceControlProvider;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Handle for one class reconciler
///
/// Cheap to clone; all methods are non-blocking for the caller.
#[derive(Clone)]
pub struct ClassHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl ClassHandle {
    /// Spawn a reconciler actor for `class` and return its handle
    pub fn spawn(
        class: DeviceClass,
        provider: Arc<dyn DeviceControlProvider>,
        config: ReconcileConfig,
        desired: DesiredStore,
        enabled: bool,
        events: EventBus,
        prefs: Option<PrefsHandle>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let actor = Reconciler::new(
            class, provider, config, desired, enabled, events, prefs, cmd_rx,
        );
        tokio::spawn(actor.run());
        Self { cmd_tx }
    }

    // =========================================================================
    // Fire-and-forget intents
    // =========================================================================

    pub fn set_volume(&self, percent: u8) {
        let _ = self.cmd_tx.send(EngineCommand::SetVolume { percent });
    }

    pub fn set_mute(&self, muted: bool) {
        let _ = self.cmd_tx.send(EngineCommand::SetMute { muted });
    }

    pub fn set_lock(&self, enabled: bool, volume_percent: Option<u8>) {
        let _ = self.cmd_tx.send(EngineCommand::SetLock {
            enabled,
            volume_percent,
        });
    }

    pub fn set_preferred(&self, id: Option<DeviceId>) {
        let _ = self.cmd_tx.send(EngineCommand::SetPreferred { id });
    }

    pub fn enable_device(&self, id: DeviceId) {
        let _ = self.cmd_tx.send(EngineCommand::EnableDevice { id });
    }

    pub fn disable_device(&self, id: DeviceId) {
        let _ = self.cmd_tx.send(EngineCommand::DisableDevice { id });
    }

    pub fn enable_all(&self) {
        let _ = self.cmd_tx.send(EngineCommand::EnableAll);
    }

    pub fn disable_all(&self) {
        let _ = self.cmd_tx.send(EngineCommand::DisableAll);
    }

    pub fn set_reconcile_enabled(&self, enabled: bool) {
        let _ = self
            .cmd_tx
            .send(EngineCommand::SetReconcileEnabled { enabled });
    }

    /// Signal the actor to stop; fire-and-forget
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
    }

    // =========================================================================
    // Query methods (async with response)
    // =========================================================================

    /// Run a reconcile pass now and return the refreshed device list
    pub async fn refresh_now(&self) -> Vec<Device> {
        let (response, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(EngineCommand::RefreshNow { response })
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Refresh and return non-default devices as preferred-device candidates
    pub async fn detect_preferred(&self) -> Vec<Device> {
        let (response, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(EngineCommand::DetectPreferredDevice { response })
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Current device list without triggering a pass
    pub async fn list_devices(&self) -> Vec<Device> {
        let (response, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(EngineCommand::ListDevices { response })
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Whether the actor is still accepting commands
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}

/// Both class reconcilers under one roof
///
/// Routes audio commands to the audio actor and camera commands to the
/// camera actor; each class keeps its own tick, registry, and intent.
#[derive(Clone)]
pub struct EngineHandle {
    pub audio: ClassHandle,
    pub camera: ClassHandle,
}

impl EngineHandle {
    pub fn new(audio: ClassHandle, camera: ClassHandle) -> Self {
        Self { audio, camera }
    }

    pub fn for_class(&self, class: DeviceClass) -> &ClassHandle {
        match class {
            DeviceClass::Audio => &self.audio,
            DeviceClass::Camera => &self.camera,
        }
    }

    pub fn set_volume(&self, percent: u8) {
        self.audio.set_volume(percent);
    }

    pub fn set_mute(&self, muted: bool) {
        self.audio.set_mute(muted);
    }

    pub fn set_lock(&self, enabled: bool, volume_percent: Option<u8>) {
        self.audio.set_lock(enabled, volume_percent);
    }

    pub fn set_preferred(&self, id: Option<DeviceId>) {
        self.audio.set_preferred(id);
    }

    pub async fn detect_preferred(&self) -> Vec<Device> {
        self.audio.detect_preferred().await
    }

    pub fn enable_camera(&self, id: DeviceId) {
        self.camera.enable_device(id);
    }

    pub fn disable_camera(&self, id: DeviceId) {
        self.camera.disable_device(id);
    }

    pub fn enable_all_cameras(&self) {
        self.camera.enable_all();
    }

    pub fn disable_all_cameras(&self) {
        self.camera.disable_all();
    }

    /// Device lists for both classes, audio first
    pub async fn list_all(&self) -> Vec<Device> {
        let mut devices = self.audio.list_devices().await;
        devices.extend(self.camera.list_devices().await);
        devices
    }

    pub fn shutdown(&self) {
        self.audio.shutdown();
        self.camera.shutdown();
    }
}
