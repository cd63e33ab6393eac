//! Script Control Arbiter.

use bevy::prelude::*;
use rustc_hash::FxHashMap;

/// One script's control registration.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub object_id: Entity,
    pub ignore_mask: u32,
    pub event_mask: u32,
}

/// Registers with `(controls, accept, pass_on)` encoding one of four behaviours.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// `accept=0, pass_on=0`: added to ignore mask, no events.
    Suppressed,
    /// `accept=1, pass_on=0`: added to ignore mask, events emitted.
    Captured,
    /// `accept=1, pass_on=1`: not added to ignore mask, events emitted.
    Observed,
    /// `accept=0, pass_on=1`: removed from ignore mask and registration dropped.
    Released,
}

/// Per-presence script control bookkeeping.
#[derive(Component, Default)]
pub struct ScriptControls {
    registrations: FxHashMap<u64, Registration>,
    last_commands: u32,
}

fn registration_key(item_id: Entity) -> u64 {
    item_id.to_bits()
}

impl ScriptControls {
    /// Applies one `(item_id, object_id, controls, accept, pass_on)` registration request and
    /// returns which of the four table rows fired.
    pub fn register(&mut self, item_id: Entity, object_id: Entity, controls: u32, accept: bool, pass_on: bool) -> RegisterOutcome {
        let key = registration_key(item_id);
        match (accept, pass_on) {
            (false, false) => {
                self.registrations.insert(
                    key,
                    Registration {
                        object_id,
                        ignore_mask: controls,
                        event_mask: 0,
                    },
                );
                RegisterOutcome::Suppressed
            }
            (true, false) => {
                self.registrations.insert(
                    key,
                    Registration {
                        object_id,
                        ignore_mask: controls,
                        event_mask: controls,
                    },
                );
                RegisterOutcome::Captured
            }
            (true, true) => {
                self.registrations.insert(
                    key,
                    Registration {
                        object_id,
                        ignore_mask: 0,
                        event_mask: controls,
                    },
                );
                RegisterOutcome::Observed
            }
            (false, true) => {
                self.registrations.remove(&key);
                RegisterOutcome::Released
            }
        }
    }

    pub fn unregister(&mut self, item_id: Entity) {
        self.registrations.remove(&registration_key(item_id));
    }

    /// Snapshots every active registration for cross-region transit. `object_id` is dropped:
    /// an `Entity` only has meaning within the region that minted it.
    #[must_use]
    pub fn snapshot(&self) -> Vec<crate::presence::payload::ScriptedControlPayload> {
        self.registrations
            .iter()
            .map(|(&key, reg)| crate::presence::payload::ScriptedControlPayload {
                item_id_bits: key,
                ignore_mask: reg.ignore_mask,
                event_mask: reg.event_mask,
            })
            .collect()
    }

    /// Restores registrations from a transit snapshot, re-keying each entry to an object id
    /// local to the destination region.
    pub fn restore(&mut self, snapshot: &[crate::presence::payload::ScriptedControlPayload], object_id: Entity) {
        for entry in snapshot {
            self.registrations.insert(
                entry.item_id_bits,
                Registration {
                    object_id,
                    ignore_mask: entry.ignore_mask,
                    event_mask: entry.event_mask,
                },
            );
        }
    }

    /// The union of every active registration's ignore mask.
    #[must_use]
    pub fn aggregated_ignore_mask(&self) -> u32 {
        self.registrations.values().fold(0, |acc, r| acc | r.ignore_mask)
    }

    /// Masks raw client control flags for motion purposes: `observed = raw & ~ignore`.
    #[must_use]
    pub fn apply_ignore_mask(&self, raw: u32) -> u32 {
        raw & !self.aggregated_ignore_mask()
    }

    /// Per-tick dispatch: for each registration whose held or changed bits (masked by its
    /// `event_mask`) are nonzero, returns the `(item_id, held, changed)` event to emit. Updates
    /// `last_commands`.
    pub fn dispatch_tick(&mut self, allflags: u32) -> Vec<(Entity, u32, u32)> {
        let mut events = Vec::new();
        if allflags == self.last_commands && allflags == 0 && self.last_commands == 0 {
            return events;
        }
        for (&key, reg) in &self.registrations {
            let held = allflags & reg.event_mask;
            let changed = (allflags ^ self.last_commands) & reg.event_mask;
            if held != 0 || changed != 0 {
                events.push((Entity::from_bits(key), held, changed));
            }
        }
        self.last_commands = allflags;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    const FWD: u32 = 0b01;
    const BACK: u32 = 0b10;

    #[test]
    fn captured_registration_is_ignored_by_motion_but_reported_to_script() {
        let mut controls = ScriptControls::default();
        let outcome = controls.register(entity(1), entity(100), FWD | BACK, true, false);
        assert_eq!(outcome, RegisterOutcome::Captured);
        assert_eq!(controls.apply_ignore_mask(FWD), 0);

        let events = controls.dispatch_tick(FWD);
        assert_eq!(events, vec![(entity(1), FWD, FWD)]);

        let events = controls.dispatch_tick(0);
        assert_eq!(events, vec![(entity(1), 0, FWD)]);
    }

    #[test]
    fn released_registration_restores_previous_ignore_mask() {
        let mut controls = ScriptControls::default();
        let before = controls.aggregated_ignore_mask();
        controls.register(entity(1), entity(100), FWD, true, true);
        controls.register(entity(1), entity(100), FWD, false, true);
        assert_eq!(controls.aggregated_ignore_mask(), before);
        assert!(controls.registrations.is_empty());
    }

    #[test]
    fn suppressed_registration_adds_to_ignore_mask_with_no_events() {
        let mut controls = ScriptControls::default();
        controls.register(entity(1), entity(100), FWD, false, false);
        assert_eq!(controls.aggregated_ignore_mask(), FWD);
        let events = controls.dispatch_tick(FWD);
        assert!(events.is_empty());
    }

    #[test]
    fn snapshot_round_trips_the_ignore_and_event_masks() {
        let mut controls = ScriptControls::default();
        controls.register(entity(1), entity(100), FWD | BACK, true, false);

        let snapshot = controls.snapshot();
        assert_eq!(snapshot.len(), 1);

        let mut restored = ScriptControls::default();
        restored.restore(&snapshot, entity(200));
        assert_eq!(restored.aggregated_ignore_mask(), controls.aggregated_ignore_mask());
    }
}
