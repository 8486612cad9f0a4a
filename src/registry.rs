//! Device Registry - per-class catalog of known devices
//!
//! Tracks each device's identity, last-observed state, and a staleness
//! marker. `refresh` merges an enumeration snapshot: matched identities are
//! updated, unseen identities create new entries, and previously-known
//! identities missing from the snapshot accumulate an absence counter.
//! Entries are evicted only after the counter crosses a threshold, so one
//! failed poll never wipes the registry.

use crate::device::{Device, DeviceClass, DeviceId, EnumeratedDevice, ObservedState};
use crate::events::{Event, EventBus};
use std::collections::HashMap;
use tracing::{debug, trace};

/// How an enumerated identity resolved against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    MatchedExisting,
    NewlyDiscovered,
    Absent,
}

/// A registry entry: device plus observation bookkeeping
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device: Device,
    pub observed: ObservedState,
    /// Consecutive enumerations this identity was missing from
    pub absent_ticks: u32,
}

impl DeviceRecord {
    /// Present in the most recent enumeration
    pub fn present(&self) -> bool {
        self.absent_ticks == 0
    }

    /// Missing for more than one consecutive tick (a single miss is treated
    /// as a transient enumeration glitch)
    pub fn absent(&self) -> bool {
        self.absent_ticks > 1
    }
}

/// Net effect of one `refresh`
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub added: Vec<DeviceId>,
    pub removed: Vec<DeviceId>,
}

/// In-memory catalog of known devices of one class
pub struct DeviceRegistry {
    class: DeviceClass,
    records: HashMap<DeviceId, DeviceRecord>,
    /// Consecutive absent ticks after which an entry is evicted
    absence_threshold: u32,
    events: EventBus,
}

impl DeviceRegistry {
    pub fn new(class: DeviceClass, absence_threshold: u32, events: EventBus) -> Self {
        Self {
            class,
            records: HashMap::new(),
            // Threshold 0 would evict on the first miss; keep the one-tick grace
            absence_threshold: absence_threshold.max(1),
            events,
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Merge an enumeration snapshot; never fails
    ///
    /// A failed enumeration must be passed as an empty snapshot: absence
    /// counters increment and eviction happens through the normal grace path.
    pub fn refresh(&mut self, snapshot: &[EnumeratedDevice], now: u64) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::default();
        let mut seen: HashMap<&DeviceId, ()> = HashMap::new();

        for entry in snapshot {
            seen.insert(&entry.id, ());
            let resolution = if self.records.contains_key(&entry.id) {
                MatchOutcome::MatchedExisting
            } else {
                MatchOutcome::NewlyDiscovered
            };

            match resolution {
                MatchOutcome::MatchedExisting => {
                    let record = self
                        .records
                        .get_mut(&entry.id)
                        .expect("matched identity must exist");
                    record.device.display_name = entry.display_name.clone();
                    record.device.is_default = entry.is_default;
                    record.absent_ticks = 0;
                    record.observed = ObservedState {
                        value: entry.value.clone(),
                        // observed_at never goes backwards
                        observed_at: now.max(record.observed.observed_at),
                        valid: true,
                    };
                    trace!(id = %entry.id, value = %entry.value, "device re-observed");
                }
                MatchOutcome::NewlyDiscovered => {
                    let device = Device {
                        id: entry.id.clone(),
                        class: self.class,
                        display_name: entry.display_name.clone(),
                        is_default: entry.is_default,
                        enumerated_at: now,
                    };
                    debug!(id = %entry.id, name = %entry.display_name, "device discovered");
                    self.events.publish(Event::DeviceAdded {
                        device: device.clone(),
                    });
                    self.records.insert(
                        entry.id.clone(),
                        DeviceRecord {
                            device,
                            observed: ObservedState {
                                value: entry.value.clone(),
                                observed_at: now,
                                valid: true,
                            },
                            absent_ticks: 0,
                        },
                    );
                    outcome.added.push(entry.id.clone());
                }
                MatchOutcome::Absent => unreachable!("snapshot entries are never absent"),
            }

            if let Some(record) = self.records.get(&entry.id) {
                self.events.publish(Event::DeviceStateObserved {
                    id: entry.id.clone(),
                    state: record.observed.clone(),
                });
            }
        }

        // Identities missing from this snapshot
        let mut evict = Vec::new();
        for (id, record) in self.records.iter_mut() {
            if seen.contains_key(id) {
                continue;
            }
            record.absent_ticks += 1;
            record.observed.valid = false;
            trace!(%id, absent_ticks = record.absent_ticks, "device missing from enumeration");
            if record.absent_ticks >= self.absence_threshold {
                evict.push(id.clone());
            }
        }

        for id in evict {
            debug!(%id, "device evicted after repeated absence");
            self.records.remove(&id);
            self.events.publish(Event::DeviceRemoved { id: id.clone() });
            outcome.removed.push(id);
        }

        outcome
    }

    /// Record the value the engine just applied, pending the next observation
    ///
    /// `observed_at` stays monotonic; `valid` remains true since the apply
    /// succeeded.
    pub fn record_applied(&mut self, id: &DeviceId, value: crate::device::DeviceValue, now: u64) {
        if let Some(record) = self.records.get_mut(id) {
            record.observed = ObservedState {
                value,
                observed_at: now.max(record.observed.observed_at),
                valid: true,
            };
        }
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.records.get(id)
    }

    /// All records, ordered by identity for determinism (enumeration order
    /// from the provider is not guaranteed stable)
    pub fn list(&self) -> Vec<&DeviceRecord> {
        let mut records: Vec<&DeviceRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.device.id.cmp(&b.device.id));
        records
    }

    /// Devices (without bookkeeping), ordered by identity
    pub fn devices(&self) -> Vec<Device> {
        self.list().into_iter().map(|r| r.device.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceValue;

    fn cam(id: &str, enabled: bool) -> EnumeratedDevice {
        EnumeratedDevice {
            id: DeviceId::from(id),
            display_name: format!("Camera {}", id),
            is_default: false,
            value: DeviceValue::Camera { enabled },
        }
    }

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(DeviceClass::Camera, 3, EventBus::new())
    }

    #[test]
    fn test_discover_and_reobserve() {
        let mut reg = registry();

        let outcome = reg.refresh(&[cam("c1", true)], 1000);
        assert_eq!(outcome.added, vec![DeviceId::from("c1")]);
        assert!(outcome.removed.is_empty());

        let outcome = reg.refresh(&[cam("c1", false)], 2000);
        assert!(outcome.added.is_empty());

        let record = reg.get(&DeviceId::from("c1")).unwrap();
        assert!(record.present());
        assert_eq!(record.observed.value, DeviceValue::Camera { enabled: false });
        assert_eq!(record.observed.observed_at, 2000);
    }

    #[test]
    fn test_observed_at_monotonic() {
        let mut reg = registry();
        reg.refresh(&[cam("c1", true)], 5000);
        // Clock hiccup: refresh with an earlier timestamp
        reg.refresh(&[cam("c1", true)], 4000);
        assert_eq!(reg.get(&DeviceId::from("c1")).unwrap().observed.observed_at, 5000);
    }

    #[test]
    fn test_absence_grace() {
        let mut reg = registry();
        reg.refresh(&[cam("c1", true)], 1000);

        // Missing from N-1 = 2 consecutive enumerations: still present
        reg.refresh(&[], 2000);
        reg.refresh(&[], 3000);
        let record = reg.get(&DeviceId::from("c1")).unwrap();
        assert_eq!(record.absent_ticks, 2);
        assert!(record.absent());
        assert!(!record.observed.valid);

        // Missing from the Nth: evicted
        let outcome = reg.refresh(&[], 4000);
        assert_eq!(outcome.removed, vec![DeviceId::from("c1")]);
        assert!(reg.get(&DeviceId::from("c1")).is_none());
    }

    #[test]
    fn test_one_miss_is_transient() {
        let mut reg = registry();
        reg.refresh(&[cam("c1", true)], 1000);
        reg.refresh(&[], 2000);

        let record = reg.get(&DeviceId::from("c1")).unwrap();
        assert_eq!(record.absent_ticks, 1);
        assert!(!record.absent());

        // Reappearing resets the counter and revalidates the observation
        reg.refresh(&[cam("c1", true)], 3000);
        let record = reg.get(&DeviceId::from("c1")).unwrap();
        assert_eq!(record.absent_ticks, 0);
        assert!(record.observed.valid);
    }

    #[test]
    fn test_list_is_ordered_by_identity() {
        let mut reg = registry();
        reg.refresh(&[cam("c9", true), cam("c1", true), cam("c5", true)], 1000);

        let ids: Vec<&str> = reg.list().iter().map(|r| r.device.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c5", "c9"]);
    }

    #[test]
    fn test_removal_emits_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut reg = DeviceRegistry::new(DeviceClass::Camera, 1, bus);

        reg.refresh(&[cam("c1", true)], 1000);
        reg.refresh(&[], 2000);

        let mut saw_removed = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::DeviceRemoved { ref id } if id.as_str() == "c1") {
                saw_removed = true;
            }
        }
        assert!(saw_removed);
    }

    #[test]
    fn test_record_applied_is_optimistic_and_monotonic() {
        let mut reg = registry();
        reg.refresh(&[cam("c1", false)], 5000);

        reg.record_applied(&DeviceId::from("c1"), DeviceValue::Camera { enabled: true }, 4500);
        let record = reg.get(&DeviceId::from("c1")).unwrap();
        assert_eq!(record.observed.value, DeviceValue::Camera { enabled: true });
        assert_eq!(record.observed.observed_at, 5000);
        assert!(record.observed.valid);
    }
}
