//! Preference persistence with debounced JSON writes
//!
//! User intent (lock state, desired volume, camera bulk toggle, preferred
//! device) survives restarts through a small JSON file. Writes go through
//! an actor so that rapid command bursts coalesce into a single flush.
//!
//! # Debouncing Strategy
//!
//! 1. Each patch is folded into the in-memory [`Preferences`] immediately
//!    and the write timestamp is recorded.
//! 2. Further patches within the debounce window (default: 500ms) replace
//!    the pending state (last-write-wins).
//! 3. Once the window expires without new patches, the state is flushed
//!    to disk.

use crate::device::{DeviceClass, DEFAULT_UNMUTE_VOLUME};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

/// Default debounce window in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Persisted user intent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Preferences format version
    pub version: String,
    /// Whether the audio volume lock is engaged
    pub lock_enabled: bool,
    /// Volume the lock holds the target microphone at
    pub lock_volume_percent: u8,
    /// Desired mute state; None = no opinion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    /// Pinned audio target; None = follow the OS default device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_device_id: Option<String>,
    /// Bulk camera intent; None = no opinion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_cameras_enabled: Option<bool>,
    /// Whether the audio reconciler runs its periodic pass
    pub audio_reconcile_enabled: bool,
    /// Whether the camera reconciler runs its periodic pass
    pub camera_reconcile_enabled: bool,
}

impl Preferences {
    /// Current preferences format version
    pub const VERSION: &'static str = "1.0.0";
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: Self::VERSION.to_string(),
            lock_enabled: false,
            lock_volume_percent: DEFAULT_UNMUTE_VOLUME,
            muted: None,
            preferred_device_id: None,
            all_cameras_enabled: None,
            audio_reconcile_enabled: true,
            camera_reconcile_enabled: true,
        }
    }
}

impl Preferences {
    /// Load preferences from a JSON file; defaults when the file is missing
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No preferences file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let json = fs::read_to_string(path)
            .await
            .context("Failed to read preferences file")?;

        let prefs: Preferences =
            serde_json::from_str(&json).context("Failed to parse preferences JSON")?;

        debug!(
            "Preferences loaded (version: {}, lock: {}, volume: {})",
            prefs.version, prefs.lock_enabled, prefs.lock_volume_percent
        );

        Ok(prefs)
    }

    /// Save preferences to a JSON file
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create preferences directory")?;
        }

        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize preferences")?;

        fs::write(path, json)
            .await
            .context("Failed to write preferences file")?;

        Ok(())
    }

    /// Apply a single preference patch in place
    pub fn apply_patch(&mut self, patch: PrefsPatch) {
        match patch {
            PrefsPatch::LockEnabled(enabled) => self.lock_enabled = enabled,
            PrefsPatch::LockVolume(percent) => self.lock_volume_percent = percent.min(100),
            PrefsPatch::Muted(muted) => self.muted = Some(muted),
            PrefsPatch::PreferredDevice(id) => self.preferred_device_id = id,
            PrefsPatch::AllCamerasEnabled(enabled) => self.all_cameras_enabled = Some(enabled),
            PrefsPatch::ReconcileEnabled(class, enabled) => match class {
                DeviceClass::Audio => self.audio_reconcile_enabled = enabled,
                DeviceClass::Camera => self.camera_reconcile_enabled = enabled,
            },
        }
    }
}

/// A single preference mutation
#[derive(Debug, Clone)]
pub enum PrefsPatch {
    LockEnabled(bool),
    LockVolume(u8),
    Muted(bool),
    PreferredDevice(Option<String>),
    AllCamerasEnabled(bool),
    ReconcileEnabled(DeviceClass, bool),
}

/// Commands sent to the preferences actor
#[derive(Debug)]
enum PrefsCommand {
    /// Fold a patch into the pending state (debounced write)
    Patch(PrefsPatch),
    /// Force flush any pending state
    Flush(oneshot::Sender<Result<()>>),
    /// Shutdown the actor
    Shutdown,
}

/// Actor that owns the preferences file and debounces writes
struct PrefsActor {
    path: PathBuf,
    prefs: Preferences,
    command_rx: mpsc::Receiver<PrefsCommand>,
    dirty: bool,
    last_patch_ts: Instant,
    debounce_ms: u64,
    write_count: u64,
}

/// Handle to communicate with the preferences actor
///
/// Cheap to clone and shareable across tasks.
#[derive(Clone)]
pub struct PrefsHandle {
    cmd_tx: mpsc::Sender<PrefsCommand>,
}

impl PrefsHandle {
    /// Spawn the preferences actor, loading the existing file if present.
    ///
    /// Returns the handle and the initial preferences so the caller can
    /// hydrate its desired state before any reconciliation pass runs.
    pub async fn spawn(
        path: impl Into<PathBuf>,
        debounce_ms: u64,
    ) -> Result<(PrefsHandle, Preferences)> {
        let path = path.into();
        let prefs = Preferences::load_or_default(&path).await?;

        info!("Preferences actor using file: {}", path.display());

        let (cmd_tx, command_rx) = mpsc::channel(100);

        let actor = PrefsActor {
            path,
            prefs: prefs.clone(),
            command_rx,
            dirty: false,
            last_patch_ts: Instant::now(),
            debounce_ms,
            write_count: 0,
        };

        tokio::spawn(actor.run());

        Ok((PrefsHandle { cmd_tx }, prefs))
    }

    /// Queue a preference patch (debounced write)
    pub async fn patch(&self, patch: PrefsPatch) {
        if let Err(e) = self.cmd_tx.send(PrefsCommand::Patch(patch)).await {
            warn!("Preferences actor unavailable, patch dropped: {}", e);
        }
    }

    /// Force flush any pending state to disk immediately
    ///
    /// Use this before shutdown to ensure preferences are persisted.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(PrefsCommand::Flush(tx))
            .await
            .context("Failed to send flush command: actor shut down")?;

        rx.await.context("Failed to receive flush response")?
    }

    /// Signal the actor to shut down
    ///
    /// Fire-and-forget; the actor flushes pending state before terminating.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.try_send(PrefsCommand::Shutdown);
    }
}

impl PrefsActor {
    async fn run(mut self) {
        debug!("Preferences actor started (debounce: {}ms)", self.debounce_ms);

        let tick_interval = if self.debounce_ms > 0 {
            self.debounce_ms
        } else {
            1000
        };
        let mut ticker = tokio::time::interval(Duration::from_millis(tick_interval));

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PrefsCommand::Patch(patch) => {
                            trace!("Applying preferences patch: {:?}", patch);
                            self.prefs.apply_patch(patch);
                            self.dirty = true;
                            self.last_patch_ts = Instant::now();

                            if self.debounce_ms == 0 {
                                self.flush_pending().await;
                            }
                        }
                        PrefsCommand::Flush(response_tx) => {
                            self.flush_pending().await;
                            let _ = response_tx.send(Ok(()));
                        }
                        PrefsCommand::Shutdown => {
                            info!("Preferences actor shutting down, flushing pending state");
                            self.flush_pending().await;
                            debug!(
                                "Preferences actor shutdown complete (total writes: {})",
                                self.write_count
                            );
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if self.dirty && self.debounce_ms > 0 {
                        let elapsed = self.last_patch_ts.elapsed();
                        if elapsed >= Duration::from_millis(self.debounce_ms) {
                            trace!("Debounce window expired ({:?}), flushing", elapsed);
                            self.flush_pending().await;
                        }
                    }
                }
            }
        }
    }

    async fn flush_pending(&mut self) {
        if !self.dirty {
            trace!("No pending preferences to flush");
            return;
        }

        match self.prefs.save_to_file(&self.path).await {
            Ok(()) => {
                self.dirty = false;
                self.write_count += 1;
                trace!("Preferences flushed (write #{})", self.write_count);
            }
            Err(e) => {
                // Stay dirty so the next tick retries
                error!("Failed to write preferences: {:#}", e);
            }
        }
    }
}

/// Resolve the default preferences file path under the platform config dir
pub fn default_prefs_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devlock")
        .join("prefs.json")
}
