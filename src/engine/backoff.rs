//! Per-device convergence bookkeeping: debounce windows, exponential
//! backoff, and the suspension state machine.
//!
//! `Unlocked/untracked → Converging → Stable` on `observed == desired`;
//! `Converging → Suspended` at the failure threshold; `Suspended →
//! Converging` only on an explicit user command. Terminal state exists only
//! at process shutdown.

/// Where a tracked device stands in the convergence state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergePhase {
    /// Drift detected or value just applied, awaiting confirmation
    Converging,
    /// Last observation matched the desired value
    Stable,
    /// Automatic retries stopped after repeated failures
    Suspended,
}

/// Convergence bookkeeping for one device
#[derive(Debug, Clone)]
pub struct ConvergeState {
    pub phase: ConvergePhase,
    pub consecutive_failures: u32,
    /// No re-apply before this timestamp (milliseconds since epoch)
    debounce_until: u64,
    /// Current backoff span; doubles per failure up to the cap
    backoff_ms: u64,
}

impl Default for ConvergeState {
    fn default() -> Self {
        Self {
            phase: ConvergePhase::Converging,
            consecutive_failures: 0,
            debounce_until: 0,
            backoff_ms: 0,
        }
    }
}

impl ConvergeState {
    /// Still inside the window where drift is not re-applied
    pub fn in_debounce(&self, now: u64) -> bool {
        now < self.debounce_until
    }

    pub fn suspended(&self) -> bool {
        self.phase == ConvergePhase::Suspended
    }

    /// A value was applied successfully; enter the debounce window so the
    /// loop does not fight an OS component writing the same field in the
    /// same instant
    pub fn note_applied(&mut self, now: u64, debounce_ms: u64) {
        self.phase = ConvergePhase::Converging;
        self.consecutive_failures = 0;
        self.backoff_ms = 0;
        self.debounce_until = now + debounce_ms;
    }

    /// Observation matched the desired value
    pub fn note_converged(&mut self) {
        if self.phase != ConvergePhase::Suspended {
            self.phase = ConvergePhase::Stable;
            self.consecutive_failures = 0;
            self.backoff_ms = 0;
        }
    }

    /// An apply failed; widen the debounce window exponentially up to
    /// `max_backoff_ms`. Returns true when this failure crossed the
    /// suspension threshold.
    pub fn note_failure(
        &mut self,
        now: u64,
        base_ms: u64,
        max_backoff_ms: u64,
        max_failures: u32,
    ) -> bool {
        self.consecutive_failures += 1;
        self.backoff_ms = if self.backoff_ms == 0 {
            base_ms.max(1)
        } else {
            (self.backoff_ms * 2).min(max_backoff_ms)
        };
        self.debounce_until = now + self.backoff_ms;

        if self.consecutive_failures >= max_failures && self.phase != ConvergePhase::Suspended {
            self.phase = ConvergePhase::Suspended;
            true
        } else {
            false
        }
    }

    /// Explicit user command: clear suspension, counters, and failure
    /// backoff. The debounce window from a just-applied change stays in
    /// force, so a command burst cannot hammer the provider.
    pub fn reset(&mut self) {
        self.phase = ConvergePhase::Converging;
        self.consecutive_failures = 0;
        // backoff_ms > 0 means the deadline came from failures, not an apply
        if self.backoff_ms != 0 {
            self.debounce_until = 0;
        }
        self.backoff_ms = 0;
    }
}
