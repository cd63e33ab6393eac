//! Update Scheduler.

use bevy::prelude::*;
use glam::{Quat, Vec3};
use std::time::Duration;

use crate::config::{NeighbourPushConfig, SignificanceConfig};

/// Last-sent state used to gate terse updates and significance events.
#[derive(Component)]
pub struct UpdateScheduler {
    pub last_sent_position: Vec3,
    pub last_sent_rotation: Quat,
    pub last_sent_velocity: Vec3,
    pub movement_anchor: Vec3,
    pub significant_anchor: Vec3,
    pub last_reprioritised_position: Vec3,
    pub last_reprioritised_at: Duration,
    pub last_pushed_position: Vec3,
    pub last_pushed_at: Duration,
    pub busy: bool,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self {
            last_sent_position: Vec3::ZERO,
            last_sent_rotation: Quat::IDENTITY,
            last_sent_velocity: Vec3::ZERO,
            movement_anchor: Vec3::ZERO,
            significant_anchor: Vec3::ZERO,
            last_reprioritised_position: Vec3::ZERO,
            last_reprioritised_at: Duration::ZERO,
            last_pushed_position: Vec3::ZERO,
            last_pushed_at: Duration::ZERO,
            busy: false,
        }
    }
}

/// Whether a terse update should be sent this tick, per the disjunction below.
#[must_use]
pub fn should_send_terse_update(
    scheduler: &UpdateScheduler,
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
    sitting: bool,
    config: &SignificanceConfig,
) -> bool {
    if sitting {
        return false;
    }

    let rotation_changed = (1.0 - scheduler.last_sent_rotation.dot(rotation).abs()) > config.rotation_tolerance;
    let velocity_changed = scheduler.last_sent_velocity.distance(velocity) > config.velocity_tolerance;
    let position_jumped = scheduler.last_sent_position.distance(position) > config.position_tolerance;
    let velocity_became_zero = scheduler.last_sent_velocity != Vec3::ZERO && velocity == Vec3::ZERO;
    let small_move_at_low_speed = scheduler.last_sent_position.distance(position) > config.small_position_tolerance
        && velocity.length_squared() < config.low_speed_threshold_sq;

    rotation_changed || velocity_changed || position_jumped || velocity_became_zero || small_move_at_low_speed
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SignificanceEvents {
    pub client_movement: bool,
    pub significant_client_movement: bool,
}

/// Fires the two significance-threshold events and advances the anchor that triggered.
pub fn check_significance(scheduler: &mut UpdateScheduler, position: Vec3, config: &SignificanceConfig) -> SignificanceEvents {
    let move_distance_sq = scheduler.movement_anchor.distance_squared(position);
    let significant_distance_sq = scheduler.significant_anchor.distance_squared(position);

    let client_movement = move_distance_sq > config.move_threshold_sq;
    let significant_client_movement = significant_distance_sq > config.significant_threshold_sq;

    if client_movement {
        scheduler.movement_anchor = position;
    }
    if significant_client_movement {
        scheduler.significant_anchor = position;
    }

    SignificanceEvents {
        client_movement,
        significant_client_movement,
    }
}

/// Whether reprioritisation should fire this tick: not already busy, moved further than the
/// configured distance, and enough time has passed since the last one.
#[must_use]
pub fn should_reprioritise(scheduler: &UpdateScheduler, position: Vec3, now: Duration, min_period: Duration, distance_threshold_sq: f32) -> bool {
    !scheduler.busy
        && now.saturating_sub(scheduler.last_reprioritised_at) >= min_period
        && scheduler.last_reprioritised_position.distance_squared(position) > distance_threshold_sq
}

/// Whether a neighbour child-agent position push should fire this tick.
#[must_use]
pub fn should_push_neighbour_positions(scheduler: &UpdateScheduler, position: Vec3, now: Duration, has_remote_neighbour: bool, config: &NeighbourPushConfig) -> bool {
    has_remote_neighbour
        && !scheduler.busy
        && now.saturating_sub(scheduler.last_pushed_at) >= Duration::from_millis(config.min_period_millis)
        && scheduler.last_pushed_position.distance_squared(position) > config.distance_sq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significant_movement_updates_only_its_own_anchor() {
        let mut scheduler = UpdateScheduler::default();
        let config = SignificanceConfig::default();
        let events = check_significance(&mut scheduler, Vec3::new(5.0, 0.0, 0.0), &config);
        assert!(events.client_movement);
        assert!(!events.significant_client_movement);
        assert_eq!(scheduler.movement_anchor, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(scheduler.significant_anchor, Vec3::ZERO);
    }

    #[test]
    fn reprioritise_respects_min_period_even_past_distance_threshold() {
        let mut scheduler = UpdateScheduler::default();
        scheduler.last_reprioritised_at = Duration::from_millis(1_000);
        let ready = should_reprioritise(&scheduler, Vec3::new(100.0, 0.0, 0.0), Duration::from_millis(1_500), Duration::from_millis(15_000), 1.0);
        assert!(!ready);
    }

    #[test]
    fn neighbour_push_requires_a_remote_neighbour() {
        let scheduler = UpdateScheduler::default();
        let config = NeighbourPushConfig::default();
        let ready = should_push_neighbour_positions(&scheduler, Vec3::new(50.0, 0.0, 0.0), Duration::from_secs(20), false, &config);
        assert!(!ready);
    }
}
