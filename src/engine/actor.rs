//! Per-class reconciler actor
//!
//! One actor owns everything for its device class: the registry, the
//! desired-state store, and the per-device convergence bookkeeping. The run
//! loop alternates between the periodic reconcile tick and user commands,
//! processing both sequentially on one task. That single-writer discipline
//! is what keeps a command and a tick from racing an apply to the same
//! device.
//!
//! A reconcile pass does, in order: enumerate (with timeout), merge the
//! snapshot into the registry, drop convergence state and orphaned intents
//! for evicted devices, then converge every tracked device that drifted.

use super::backoff::ConvergeState;
use super::commands::EngineCommand;
use crate::config::ReconcileConfig;
use crate::desired::DesiredStore;
use crate::device::{now_ms, DeviceClass, DeviceId, DeviceValue, DesiredValue};
use crate::events::{Event, EventBus};
use crate::prefs::{PrefsHandle, PrefsPatch};
use crate::provider::{apply_with_timeout, enumerate_with_timeout, DeviceControlProvider};
use crate::registry::DeviceRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Reconciler for one device class
pub struct Reconciler {
    class: DeviceClass,
    provider: Arc<dyn DeviceControlProvider>,
    config: ReconcileConfig,
    registry: DeviceRegistry,
    desired: DesiredStore,
    /// Convergence bookkeeping per tracked device
    converge: HashMap<DeviceId, ConvergeState>,
    events: EventBus,
    prefs: Option<PrefsHandle>,
    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    /// Gate for the periodic tick; commands always apply
    enabled: bool,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        class: DeviceClass,
        provider: Arc<dyn DeviceControlProvider>,
        config: ReconcileConfig,
        desired: DesiredStore,
        enabled: bool,
        events: EventBus,
        prefs: Option<PrefsHandle>,
        command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    ) -> Self {
        let registry = DeviceRegistry::new(class, config.absence_threshold, events.clone());
        Self {
            class,
            provider,
            config,
            registry,
            desired,
            converge: HashMap::new(),
            events,
            prefs,
            command_rx,
            enabled,
        }
    }

    /// Main actor run loop
    pub async fn run(mut self) {
        info!(
            class = %self.class,
            provider = self.provider.name(),
            tick_ms = self.config.tick_interval_ms,
            enabled = self.enabled,
            "reconciler started"
        );

        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.enabled {
                        self.reconcile_pass(now_ms()).await;
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd, now_ms()).await {
                                break;
                            }
                        }
                        // All handles dropped
                        None => break,
                    }
                }
            }
        }

        info!(class = %self.class, "reconciler stopped");
    }

    /// One full reconcile pass: enumerate, merge, converge
    async fn reconcile_pass(&mut self, now: u64) {
        let timeout = Duration::from_millis(self.config.provider_timeout_ms);
        let snapshot = match enumerate_with_timeout(&*self.provider, self.class, timeout).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // An empty snapshot goes through the normal absence-grace
                // path, so a transient failure never wipes the registry
                warn!(class = %self.class, error = %e, "enumeration failed");
                Vec::new()
            }
        };

        let outcome = self.registry.refresh(&snapshot, now);
        for id in &outcome.removed {
            self.converge.remove(id);
            self.desired.on_device_removed(id);
        }

        let targets: Vec<(DeviceId, DesiredValue, DeviceValue)> = self
            .registry
            .list()
            .into_iter()
            .filter(|record| record.present() && record.observed.valid)
            .filter_map(|record| {
                self.desired.resolve(&record.device).map(|desired| {
                    (
                        record.device.id.clone(),
                        desired,
                        record.observed.value.clone(),
                    )
                })
            })
            .collect();

        for (id, desired, observed) in targets {
            self.converge_device(&id, &desired, &observed, now).await;
        }
    }

    /// Converge one device toward its desired value
    async fn converge_device(
        &mut self,
        id: &DeviceId,
        desired: &DesiredValue,
        observed: &DeviceValue,
        now: u64,
    ) {
        let state = self.converge.entry(id.clone()).or_default();

        if !desired.drifts_from(observed, self.config.volume_tolerance) {
            state.note_converged();
            return;
        }
        if state.suspended() {
            trace!(%id, "drift ignored: device suspended");
            return;
        }
        if state.in_debounce(now) {
            trace!(%id, "drift ignored: inside debounce window");
            return;
        }

        let value = desired.apply_over(observed).clamped();
        debug!(class = %self.class, %id, observed = %observed, target = %value, "applying");

        let timeout = Duration::from_millis(self.config.provider_timeout_ms);
        match apply_with_timeout(&*self.provider, id, &value, timeout).await {
            Ok(()) => {
                state.note_applied(now, self.config.debounce_window_ms());
                // Optimistic: trust the apply until the next enumeration
                self.registry.record_applied(id, value, now);
            }
            Err(reason) => {
                let newly_suspended = state.note_failure(
                    now,
                    self.config.debounce_window_ms(),
                    self.config.max_backoff_ms,
                    self.config.max_consecutive_failures,
                );
                let consecutive_failures = state.consecutive_failures;
                warn!(%id, %reason, consecutive_failures, "apply failed");
                self.events.publish(Event::ApplyFailed {
                    id: id.clone(),
                    reason,
                    consecutive_failures,
                });
                if newly_suspended {
                    warn!(%id, "device suspended after repeated apply failures");
                    self.events.publish(Event::DeviceSuspended { id: id.clone() });
                }
            }
        }
    }

    /// Refresh, then converge only the audio target with a transient intent
    ///
    /// Used by explicit audio commands so a `SetVolume` while the lock is
    /// off still lands immediately. Explicit commands clear suspension.
    async fn targeted_audio_pass(&mut self, intent: DesiredValue, now: u64) {
        let timeout = Duration::from_millis(self.config.provider_timeout_ms);
        let snapshot = match enumerate_with_timeout(&*self.provider, self.class, timeout).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(class = %self.class, error = %e, "enumeration failed");
                Vec::new()
            }
        };
        let outcome = self.registry.refresh(&snapshot, now);
        for id in &outcome.removed {
            self.converge.remove(id);
            self.desired.on_device_removed(id);
        }

        let target = self
            .registry
            .list()
            .into_iter()
            .filter(|record| record.present() && record.observed.valid)
            .find(|record| self.desired.is_audio_target(&record.device))
            .map(|record| (record.device.id.clone(), record.observed.value.clone()));

        let Some((id, observed)) = target else {
            warn!(class = %self.class, "no target device for audio command");
            self.events.publish(Event::TargetMissing { class: self.class });
            return;
        };

        self.converge.entry(id.clone()).or_default().reset();
        self.converge_device(&id, &intent, &observed, now).await;
    }

    async fn patch_prefs(&self, patch: PrefsPatch) {
        if let Some(prefs) = &self.prefs {
            prefs.patch(patch).await;
        }
    }

    /// Process one command; returns false to stop the actor
    async fn handle_command(&mut self, cmd: EngineCommand, now: u64) -> bool {
        match cmd {
            EngineCommand::SetVolume { percent } => {
                let percent = percent.min(100);
                info!(class = %self.class, percent, "set volume");
                self.desired.set_volume(percent);
                self.patch_prefs(PrefsPatch::LockVolume(percent)).await;
                self.targeted_audio_pass(
                    DesiredValue::Audio {
                        volume_percent: Some(percent),
                        muted: None,
                    },
                    now,
                )
                .await;
            }
            EngineCommand::SetMute { muted } => {
                info!(class = %self.class, muted, "set mute");
                self.desired.set_muted(muted);
                self.patch_prefs(PrefsPatch::Muted(muted)).await;
                let intent = if muted {
                    DesiredValue::Audio {
                        volume_percent: None,
                        muted: Some(true),
                    }
                } else {
                    // Unmute restores the recorded volume in the same apply
                    DesiredValue::Audio {
                        volume_percent: Some(self.desired.lock_volume_percent()),
                        muted: Some(false),
                    }
                };
                self.targeted_audio_pass(intent, now).await;
            }
            EngineCommand::SetLock {
                enabled,
                volume_percent,
            } => {
                info!(class = %self.class, enabled, ?volume_percent, "set lock");
                self.desired.set_lock(enabled, volume_percent);
                self.patch_prefs(PrefsPatch::LockEnabled(enabled)).await;
                if let Some(percent) = volume_percent {
                    self.patch_prefs(PrefsPatch::LockVolume(percent.min(100)))
                        .await;
                }
                if enabled {
                    self.targeted_audio_pass(
                        DesiredValue::Audio {
                            volume_percent: Some(self.desired.lock_volume_percent()),
                            muted: self.desired.muted(),
                        },
                        now,
                    )
                    .await;
                }
            }
            EngineCommand::SetPreferred { id } => {
                info!(class = %self.class, preferred = ?id, "set preferred device");
                self.desired.set_preferred(id.clone());
                self.patch_prefs(PrefsPatch::PreferredDevice(
                    id.map(|id| id.as_str().to_string()),
                ))
                .await;
                // Suspension was per-target; a new target starts clean
                for state in self.converge.values_mut() {
                    state.reset();
                }
                self.reconcile_pass(now).await;
            }
            EngineCommand::EnableDevice { id } => {
                if self.class != DeviceClass::Camera {
                    warn!(class = %self.class, %id, "enable device ignored: camera-only command");
                    return true;
                }
                info!(class = %self.class, %id, "enable device");
                self.desired
                    .set_device(id.clone(), DesiredValue::camera(true));
                self.converge.entry(id).or_default().reset();
                self.reconcile_pass(now).await;
            }
            EngineCommand::DisableDevice { id } => {
                if self.class != DeviceClass::Camera {
                    warn!(class = %self.class, %id, "disable device ignored: camera-only command");
                    return true;
                }
                info!(class = %self.class, %id, "disable device");
                self.desired
                    .set_device(id.clone(), DesiredValue::camera(false));
                self.converge.entry(id).or_default().reset();
                self.reconcile_pass(now).await;
            }
            EngineCommand::EnableAll => {
                info!(class = %self.class, "enable all");
                self.desired.set_bulk(Some(true));
                self.patch_prefs(PrefsPatch::AllCamerasEnabled(true)).await;
                for state in self.converge.values_mut() {
                    state.reset();
                }
                self.reconcile_pass(now).await;
            }
            EngineCommand::DisableAll => {
                info!(class = %self.class, "disable all");
                self.desired.set_bulk(Some(false));
                self.patch_prefs(PrefsPatch::AllCamerasEnabled(false)).await;
                for state in self.converge.values_mut() {
                    state.reset();
                }
                self.reconcile_pass(now).await;
            }
            EngineCommand::SetReconcileEnabled { enabled } => {
                info!(class = %self.class, enabled, "set reconcile enabled");
                self.enabled = enabled;
                self.patch_prefs(PrefsPatch::ReconcileEnabled(self.class, enabled))
                    .await;
            }
            EngineCommand::RefreshNow { response } => {
                self.reconcile_pass(now).await;
                let _ = response.send(self.registry.devices());
            }
            EngineCommand::DetectPreferredDevice { response } => {
                self.reconcile_pass(now).await;
                // Candidates for pinning: everything but the OS default
                let candidates = self
                    .registry
                    .devices()
                    .into_iter()
                    .filter(|device| !device.is_default)
                    .collect();
                let _ = response.send(candidates);
            }
            EngineCommand::ListDevices { response } => {
                let _ = response.send(self.registry.devices());
            }
            EngineCommand::Shutdown => {
                debug!(class = %self.class, "shutdown command received");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ApplyError, SimProvider};
    use tokio::sync::oneshot;

    fn mic(volume: u8, muted: bool) -> DeviceValue {
        DeviceValue::Audio {
            volume_percent: volume,
            muted,
        }
    }

    fn cam(enabled: bool) -> DeviceValue {
        DeviceValue::Camera { enabled }
    }

    fn test_config() -> ReconcileConfig {
        ReconcileConfig {
            tick_interval_ms: 1000,
            debounce_ms: Some(500),
            max_backoff_ms: 8000,
            max_consecutive_failures: 3,
            absence_threshold: 3,
            volume_tolerance: 0,
            provider_timeout_ms: 3000,
        }
    }

    fn reconciler(class: DeviceClass, provider: SimProvider) -> Reconciler {
        let (_tx, rx) = mpsc::unbounded_channel();
        Reconciler::new(
            class,
            Arc::new(provider),
            test_config(),
            DesiredStore::new(class),
            true,
            EventBus::new(),
            None,
            rx,
        )
    }

    #[tokio::test]
    async fn test_untracked_devices_are_never_touched() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());

        rec.reconcile_pass(1000).await;
        rec.reconcile_pass(2000).await;

        assert_eq!(rec.registry.len(), 1);
        assert!(sim.apply_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_disable_converges_all_cameras() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam A", false, cam(true)).await;
        sim.add_device("cam-2", "Webcam B", false, cam(true)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());

        assert!(rec.handle_command(EngineCommand::DisableAll, 1000).await);

        assert_eq!(sim.value(&DeviceId::from("cam-1")).await, Some(cam(false)));
        assert_eq!(sim.value(&DeviceId::from("cam-2")).await, Some(cam(false)));
    }

    #[tokio::test]
    async fn test_converged_device_is_not_reapplied() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(false)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());

        rec.handle_command(EngineCommand::DisableAll, 1000).await;
        // Already disabled: no apply at all
        assert_eq!(sim.apply_count(&DeviceId::from("cam-1")).await, 0);

        rec.reconcile_pass(2000).await;
        rec.reconcile_pass(3000).await;
        assert_eq!(sim.apply_count(&DeviceId::from("cam-1")).await, 0);
    }

    #[tokio::test]
    async fn test_drift_is_corrected_after_debounce() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());
        let id = DeviceId::from("cam-1");

        rec.handle_command(EngineCommand::DisableAll, 1000).await;
        assert_eq!(sim.apply_count(&id).await, 1);

        // OS flips it back inside the debounce window: no second apply yet
        sim.drift(&id, cam(true)).await;
        rec.reconcile_pass(1200).await;
        assert_eq!(sim.apply_count(&id).await, 1);

        // Past the window the drift is corrected
        rec.reconcile_pass(1600).await;
        assert_eq!(sim.apply_count(&id).await, 2);
        assert_eq!(sim.value(&id).await, Some(cam(false)));
    }

    #[tokio::test]
    async fn test_explicit_command_respects_debounce_window() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());
        let id = DeviceId::from("cam-1");

        rec.handle_command(EngineCommand::DisableAll, 1000).await;
        assert_eq!(sim.apply_count(&id).await, 1);

        // A command inside the window of the just-applied change waits
        rec.handle_command(EngineCommand::EnableAll, 1200).await;
        assert_eq!(sim.apply_count(&id).await, 1);

        // The flipped intent lands on the first pass past the window
        rec.reconcile_pass(1600).await;
        assert_eq!(sim.apply_count(&id).await, 2);
        assert_eq!(sim.value(&id).await, Some(cam(true)));
    }

    #[tokio::test]
    async fn test_explicit_command_clears_failure_backoff() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        let id = DeviceId::from("cam-1");
        sim.set_apply_error(&id, Some(ApplyError::Busy)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());

        // One failure opens a backoff window past t=1500
        rec.handle_command(EngineCommand::DisableAll, 1000).await;
        assert_eq!(sim.apply_count(&id).await, 1);

        // An explicit command inside that window retries right away
        sim.set_apply_error(&id, None).await;
        rec.handle_command(EngineCommand::DisableDevice { id: id.clone() }, 1200)
            .await;
        assert_eq!(sim.value(&id).await, Some(cam(false)));
    }

    #[tokio::test]
    async fn test_audio_actor_ignores_camera_commands() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "USB Mic", true, mic(50, false)).await;
        let mut rec = reconciler(DeviceClass::Audio, sim.clone());
        let id = DeviceId::from("mic-1");

        assert!(
            rec.handle_command(EngineCommand::EnableDevice { id: id.clone() }, 1000)
                .await
        );
        assert!(
            rec.handle_command(EngineCommand::DisableDevice { id: id.clone() }, 2000)
                .await
        );

        rec.reconcile_pass(3000).await;
        assert!(sim.apply_log().await.is_empty());
        assert_eq!(sim.value(&id).await, Some(mic(50, false)));
    }

    #[tokio::test]
    async fn test_missing_target_surfaces_on_event_stream() {
        let sim = SimProvider::new();
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let (_tx, cmd_rx) = mpsc::unbounded_channel();
        let mut rec = Reconciler::new(
            DeviceClass::Audio,
            Arc::new(sim),
            test_config(),
            DesiredStore::new(DeviceClass::Audio),
            true,
            events,
            None,
            cmd_rx,
        );

        rec.handle_command(EngineCommand::SetVolume { percent: 60 }, 1000)
            .await;

        let mut missing = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::TargetMissing { class } if class == DeviceClass::Audio) {
                missing = true;
            }
        }
        assert!(missing);
    }

    #[tokio::test]
    async fn test_repeated_failures_suspend_device() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        let id = DeviceId::from("cam-1");
        sim.set_apply_error(&id, Some(ApplyError::AccessDenied)).await;

        let events = EventBus::new();
        let mut rx = events.subscribe();
        let (_tx, cmd_rx) = mpsc::unbounded_channel();
        let mut rec = Reconciler::new(
            DeviceClass::Camera,
            Arc::new(sim.clone()),
            test_config(),
            DesiredStore::new(DeviceClass::Camera),
            true,
            events,
            None,
            cmd_rx,
        );

        // Each pass lands past the backoff window: 3 failures, then suspension
        rec.handle_command(EngineCommand::DisableAll, 1_000).await;
        rec.reconcile_pass(10_000).await;
        rec.reconcile_pass(20_000).await;
        assert_eq!(sim.apply_count(&id).await, 3);

        // Suspended: further drift is ignored
        rec.reconcile_pass(100_000).await;
        assert_eq!(sim.apply_count(&id).await, 3);

        let mut failures = 0;
        let mut suspended = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::ApplyFailed { .. } => failures += 1,
                Event::DeviceSuspended { id: sid } => {
                    suspended = true;
                    assert_eq!(sid, id);
                }
                _ => {}
            }
        }
        assert_eq!(failures, 3);
        assert!(suspended);

        // Explicit command clears the suspension and retries
        sim.set_apply_error(&id, None).await;
        rec.handle_command(EngineCommand::DisableDevice { id: id.clone() }, 200_000)
            .await;
        assert_eq!(sim.value(&id).await, Some(cam(false)));
    }

    #[tokio::test]
    async fn test_lock_enforces_volume_on_default_mic() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "USB Mic", true, mic(40, false)).await;
        sim.add_device("mic-2", "Other Mic", false, mic(40, false)).await;
        let mut rec = reconciler(DeviceClass::Audio, sim.clone());
        let id = DeviceId::from("mic-1");

        rec.handle_command(
            EngineCommand::SetLock {
                enabled: true,
                volume_percent: Some(80),
            },
            1000,
        )
        .await;

        assert_eq!(sim.value(&id).await, Some(mic(80, false)));
        // The lock never touches the non-target mic
        assert_eq!(sim.apply_count(&DeviceId::from("mic-2")).await, 0);

        // OS auto-adjusts the volume down; next pass restores it
        sim.drift(&id, mic(20, false)).await;
        rec.reconcile_pass(10_000).await;
        assert_eq!(sim.value(&id).await, Some(mic(80, false)));
    }

    #[tokio::test]
    async fn test_volume_within_tolerance_is_left_alone() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "USB Mic", true, mic(80, false)).await;
        let (_tx, cmd_rx) = mpsc::unbounded_channel();
        let mut config = test_config();
        config.volume_tolerance = 5;
        let mut rec = Reconciler::new(
            DeviceClass::Audio,
            Arc::new(sim.clone()),
            config,
            DesiredStore::new(DeviceClass::Audio),
            true,
            EventBus::new(),
            None,
            cmd_rx,
        );
        let id = DeviceId::from("mic-1");

        rec.handle_command(
            EngineCommand::SetLock {
                enabled: true,
                volume_percent: Some(80),
            },
            1000,
        )
        .await;
        assert_eq!(sim.apply_count(&id).await, 0);

        // 78 is within tolerance 5 of 80
        sim.drift(&id, mic(78, false)).await;
        rec.reconcile_pass(10_000).await;
        assert_eq!(sim.apply_count(&id).await, 0);

        sim.drift(&id, mic(70, false)).await;
        rec.reconcile_pass(20_000).await;
        assert_eq!(sim.value(&id).await, Some(mic(80, false)));
    }

    #[tokio::test]
    async fn test_set_volume_lands_without_lock() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "USB Mic", true, mic(30, false)).await;
        let mut rec = reconciler(DeviceClass::Audio, sim.clone());
        let id = DeviceId::from("mic-1");

        rec.handle_command(EngineCommand::SetVolume { percent: 65 }, 1000)
            .await;
        assert_eq!(sim.value(&id).await, Some(mic(65, false)));

        // No lock: later OS drift is not fought
        sim.drift(&id, mic(10, false)).await;
        rec.reconcile_pass(10_000).await;
        assert_eq!(sim.value(&id).await, Some(mic(10, false)));
    }

    #[tokio::test]
    async fn test_mute_preserves_volume_and_unmute_restores() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "USB Mic", true, mic(70, false)).await;
        let mut rec = reconciler(DeviceClass::Audio, sim.clone());
        let id = DeviceId::from("mic-1");

        rec.handle_command(EngineCommand::SetVolume { percent: 70 }, 1000)
            .await;
        rec.handle_command(EngineCommand::SetMute { muted: true }, 2000)
            .await;
        assert_eq!(sim.value(&id).await, Some(mic(70, true)));

        rec.handle_command(EngineCommand::SetMute { muted: false }, 3000)
            .await;
        assert_eq!(sim.value(&id).await, Some(mic(70, false)));
    }

    #[tokio::test]
    async fn test_unmute_at_zero_volume_restores_default() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "USB Mic", true, mic(0, true)).await;
        let mut rec = reconciler(DeviceClass::Audio, sim.clone());
        let id = DeviceId::from("mic-1");

        rec.handle_command(EngineCommand::SetVolume { percent: 0 }, 1000)
            .await;
        rec.handle_command(EngineCommand::SetMute { muted: false }, 2000)
            .await;
        assert_eq!(
            sim.value(&id).await,
            Some(mic(crate::device::DEFAULT_UNMUTE_VOLUME, false))
        );
    }

    #[tokio::test]
    async fn test_preferred_device_redirects_commands() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "Default Mic", true, mic(50, false)).await;
        sim.add_device("mic-2", "Headset", false, mic(50, false)).await;
        let mut rec = reconciler(DeviceClass::Audio, sim.clone());

        rec.handle_command(
            EngineCommand::SetPreferred {
                id: Some(DeviceId::from("mic-2")),
            },
            1000,
        )
        .await;
        rec.handle_command(EngineCommand::SetVolume { percent: 90 }, 2000)
            .await;

        assert_eq!(
            sim.value(&DeviceId::from("mic-2")).await,
            Some(mic(90, false))
        );
        assert_eq!(sim.apply_count(&DeviceId::from("mic-1")).await, 0);
    }

    #[tokio::test]
    async fn test_enumeration_failure_keeps_devices() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());

        rec.reconcile_pass(1000).await;
        assert_eq!(rec.registry.len(), 1);

        // Two failed enumerations: absence grace keeps the device
        sim.fail_next_enumerations(2).await;
        rec.reconcile_pass(2000).await;
        rec.reconcile_pass(3000).await;
        assert_eq!(rec.registry.len(), 1);

        // Third miss crosses the threshold
        sim.fail_next_enumerations(1).await;
        rec.reconcile_pass(4000).await;
        assert_eq!(rec.registry.len(), 0);
    }

    #[tokio::test]
    async fn test_replug_reapplies_bulk_intent() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());
        let id = DeviceId::from("cam-1");

        rec.handle_command(EngineCommand::DisableAll, 1000).await;
        assert_eq!(sim.value(&id).await, Some(cam(false)));

        // Unplug until evicted
        sim.remove_device(&id).await;
        rec.reconcile_pass(10_000).await;
        rec.reconcile_pass(20_000).await;
        rec.reconcile_pass(30_000).await;
        assert_eq!(rec.registry.len(), 0);

        // Replug enabled: the bulk intent re-applies on rediscovery
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        rec.reconcile_pass(40_000).await;
        assert_eq!(sim.value(&id).await, Some(cam(false)));
    }

    #[tokio::test]
    async fn test_apply_is_optimistic_until_next_observation() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());
        let id = DeviceId::from("cam-1");

        rec.handle_command(EngineCommand::DisableAll, 1000).await;
        let record = rec.registry.get(&id).unwrap();
        assert_eq!(record.observed.value, cam(false));
        assert!(record.observed.valid);
    }

    #[tokio::test]
    async fn test_refresh_now_returns_device_list() {
        let sim = SimProvider::new();
        sim.add_device("cam-1", "Webcam", false, cam(true)).await;
        let mut rec = reconciler(DeviceClass::Camera, sim.clone());

        let (tx, rx) = oneshot::channel();
        rec.handle_command(EngineCommand::RefreshNow { response: tx }, 1000)
            .await;
        let devices = rx.await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id.as_str(), "cam-1");
    }

    #[tokio::test]
    async fn test_detect_preferred_filters_default() {
        let sim = SimProvider::new();
        sim.add_device("mic-1", "Default Mic", true, mic(50, false)).await;
        sim.add_device("mic-2", "Headset", false, mic(50, false)).await;
        let mut rec = reconciler(DeviceClass::Audio, sim.clone());

        let (tx, rx) = oneshot::channel();
        rec.handle_command(EngineCommand::DetectPreferredDevice { response: tx }, 1000)
            .await;
        let candidates = rx.await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id.as_str(), "mic-2");
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_actor() {
        let sim = SimProvider::new();
        let mut rec = reconciler(DeviceClass::Camera, sim);
        assert!(!rec.handle_command(EngineCommand::Shutdown, 1000).await);
    }
}
