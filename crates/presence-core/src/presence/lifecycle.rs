//! Lifecycle State Machine.
//!
//! `IsInTransit` is tracked as its own flag on [`Lifecycle`] rather than a sixth state: it is an
//! orthogonal bool alongside `LifecycleState`, and the authoritative transition table only names
//! five states. A presence mid-hand-off is simultaneously `Running` (still fully alive from the
//! scene's point of view) and in-transit.

use bevy::prelude::*;
use parking_lot::Mutex;

use crate::error::PresenceError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    PreAdd,
    NotInRegion,
    Running,
    Removing,
    Removed,
}

impl LifecycleState {
    /// Rank used to reject backward transitions. `Running` has no fixed rank relative to itself
    /// since child/root toggling is the orthogonal `IsChild` attribute.
    fn rank(self) -> u8 {
        match self {
            Self::PreAdd => 0,
            Self::NotInRegion => 1,
            Self::Running => 2,
            Self::Removing => 3,
            Self::Removed => 4,
        }
    }
}

/// Authoritative lifecycle state plus the orthogonal child/root, transit, and login attributes.
#[derive(Component)]
pub struct Lifecycle {
    state: LifecycleState,
    is_child: bool,
    is_in_transit: bool,
    is_logging_in: bool,
    /// Guards `MakeRoot` so two concurrent arrivals cannot both promote.
    complete_movement_lock: Mutex<()>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: LifecycleState::PreAdd,
            is_child: true,
            is_in_transit: false,
            is_logging_in: true,
            complete_movement_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn is_child(&self) -> bool {
        self.is_child
    }

    #[must_use]
    pub fn is_in_transit(&self) -> bool {
        self.is_in_transit
    }

    #[must_use]
    pub fn is_logging_in(&self) -> bool {
        self.is_logging_in
    }

    pub fn set_in_transit(&mut self, value: bool) {
        self.is_in_transit = value;
    }

    pub fn set_logging_in(&mut self, value: bool) {
        self.is_logging_in = value;
    }

    /// Moves to `to` if it does not rank before the current state. `Running -> Running` is
    /// always permitted since it carries no ordering information about child/root.
    pub fn transition(&mut self, presence: Entity, to: LifecycleState) -> Result<(), PresenceError> {
        if to.rank() < self.state.rank() {
            return Err(PresenceError::InvalidTransition { presence, from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    /// Promotes a child presence to root. Serialised by `complete_movement_lock`: the
    /// loser of a race observes `is_child = false` and returns `AlreadyRoot`.
    pub fn make_root(&mut self, presence: Entity) -> Result<(), PresenceError> {
        let _guard = self.complete_movement_lock.lock();
        if !self.is_child {
            return Err(PresenceError::AlreadyRoot(presence));
        }
        self.is_child = false;
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// Demotes a root presence to child. Unconditional: the Physical Body detach, movement-bit
    /// clear, teleport-flag reset, and parcel-state clear are driven by the caller from the
    /// returned `true`.
    pub fn make_child(&mut self, presence: Entity) -> Result<bool, PresenceError> {
        if self.is_child {
            return Err(PresenceError::AlreadyChild(presence));
        }
        self.is_child = true;
        Ok(true)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_entity() -> Entity {
        Entity::from_raw(0)
    }

    #[test]
    fn backward_transition_is_rejected_and_does_not_mutate() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(dummy_entity(), LifecycleState::Running).unwrap();
        let err = lifecycle
            .transition(dummy_entity(), LifecycleState::NotInRegion)
            .unwrap_err();
        assert!(matches!(err, PresenceError::InvalidTransition { .. }));
        assert_eq!(lifecycle.state(), LifecycleState::Running);
    }

    #[test]
    fn concurrent_make_root_has_exactly_one_winner() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.make_root(dummy_entity()).is_ok());
        let second = lifecycle.make_root(dummy_entity());
        assert!(matches!(second, Err(PresenceError::AlreadyRoot(_))));
    }

    #[test]
    fn make_child_is_idempotent_no_op_on_existing_child() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.make_child(dummy_entity()).unwrap_err();
        assert!(matches!(err, PresenceError::AlreadyChild(_)));
    }

    #[test]
    fn is_child_and_running_are_independent() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.make_root(dummy_entity()).unwrap();
        lifecycle.make_child(dummy_entity()).unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Running);
        assert!(lifecycle.is_child());
    }
}
