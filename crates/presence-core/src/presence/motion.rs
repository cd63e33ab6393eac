//! Motion Controller.

use bevy::prelude::*;
use bitfield_struct::bitfield;
use glam::{Quat, Vec3};

use crate::config::Config;

/// One of the twelve compile-time direction impulses: six primary axes plus six "nudge"
/// variants at the same magnitude. Forward/back and left/right are in the horizontal (X/Z)
/// plane; up/down is world-vertical Y, matching [`crate::presence::Camera::up_axis`] and every
/// other vertical reading in the crate (`ground_height`, [`presence_geom::Ray::straight_down`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
    ForwardNudge,
    BackNudge,
    LeftNudge,
    RightNudge,
    UpNudge,
    DownNudge,
}

const NOMINAL: f32 = 1.0;

/// The 12-entry impulse vector table.
pub const DIRECTION_TABLE: [(Direction, Vec3); 12] = [
    (Direction::Forward, Vec3::new(NOMINAL, 0.0, 0.0)),
    (Direction::Back, Vec3::new(-NOMINAL, 0.0, 0.0)),
    (Direction::Left, Vec3::new(0.0, 0.0, NOMINAL)),
    (Direction::Right, Vec3::new(0.0, 0.0, -NOMINAL)),
    (Direction::Up, Vec3::new(0.0, NOMINAL, 0.0)),
    (Direction::Down, Vec3::new(0.0, -NOMINAL, 0.0)),
    (Direction::ForwardNudge, Vec3::new(NOMINAL, 0.0, 0.0)),
    (Direction::BackNudge, Vec3::new(-NOMINAL, 0.0, 0.0)),
    (Direction::LeftNudge, Vec3::new(0.0, 0.0, NOMINAL)),
    (Direction::RightNudge, Vec3::new(0.0, 0.0, -NOMINAL)),
    (Direction::UpNudge, Vec3::new(0.0, NOMINAL, 0.0)),
    (Direction::DownNudge, Vec3::new(0.0, -NOMINAL, 0.0)),
];

/// Post-scale applied to the accumulated control vector in `AddNewMovement`:
/// `0.03 * 128`.
pub const MOVEMENT_POST_SCALE: f32 = 0.03 * 128.0;

/// Raw protocol control-flag bit positions, in `AgentUpdate` order. The client sends these as a
/// 32-bit mask; only the first twelve plus `STOP` (bit 12) are direction bits.
pub mod control_bits {
    pub const AT_POS: u32 = 1 << 0;
    pub const AT_NEG: u32 = 1 << 1;
    pub const LEFT_POS: u32 = 1 << 2;
    pub const LEFT_NEG: u32 = 1 << 3;
    pub const UP_POS: u32 = 1 << 4;
    pub const UP_NEG: u32 = 1 << 5;
    pub const AT_POS_NUDGE: u32 = 1 << 6;
    pub const AT_NEG_NUDGE: u32 = 1 << 7;
    pub const LEFT_POS_NUDGE: u32 = 1 << 8;
    pub const LEFT_NEG_NUDGE: u32 = 1 << 9;
    pub const UP_POS_NUDGE: u32 = 1 << 10;
    pub const UP_NEG_NUDGE: u32 = 1 << 11;
    pub const STOP: u32 = 1 << 12;
}

/// Extracts the twelve direction bits (plus `STOP`) from a raw 32-bit `AgentUpdate` control mask.
/// Everything above bit 12 is protocol state this crate doesn't model (sit-on-ground request,
/// mouselook, and the like) and is ignored here.
#[must_use]
pub fn movement_flags_from_raw(raw: u32) -> MovementFlags {
    use control_bits::{AT_NEG, AT_NEG_NUDGE, AT_POS, AT_POS_NUDGE, LEFT_NEG, LEFT_NEG_NUDGE, LEFT_POS, LEFT_POS_NUDGE, STOP, UP_NEG, UP_NEG_NUDGE, UP_POS, UP_POS_NUDGE};

    MovementFlags::new()
        .with_forward(raw & AT_POS != 0)
        .with_back(raw & AT_NEG != 0)
        .with_left(raw & LEFT_POS != 0)
        .with_right(raw & LEFT_NEG != 0)
        .with_up(raw & UP_POS != 0)
        .with_down(raw & UP_NEG != 0)
        .with_forward_nudge(raw & AT_POS_NUDGE != 0)
        .with_back_nudge(raw & AT_NEG_NUDGE != 0)
        .with_left_nudge(raw & LEFT_POS_NUDGE != 0)
        .with_right_nudge(raw & LEFT_NEG_NUDGE != 0)
        .with_up_nudge(raw & UP_POS_NUDGE != 0)
        .with_down_nudge(raw & UP_NEG_NUDGE != 0)
        .with_stop(raw & STOP != 0)
}

/// Folds every set direction bit into a single accumulated control vector by summing the
/// corresponding [`DIRECTION_TABLE`] impulses.
#[must_use]
pub fn accumulated_control_vector(flags: MovementFlags) -> Vec3 {
    let bits = [
        (flags.forward(), Direction::Forward),
        (flags.back(), Direction::Back),
        (flags.left(), Direction::Left),
        (flags.right(), Direction::Right),
        (flags.up(), Direction::Up),
        (flags.down(), Direction::Down),
        (flags.forward_nudge(), Direction::ForwardNudge),
        (flags.back_nudge(), Direction::BackNudge),
        (flags.left_nudge(), Direction::LeftNudge),
        (flags.right_nudge(), Direction::RightNudge),
        (flags.up_nudge(), Direction::UpNudge),
        (flags.down_nudge(), Direction::DownNudge),
    ];

    bits.into_iter().filter(|(set, _)| *set).fold(Vec3::ZERO, |acc, (_, direction)| {
        let (_, impulse) = DIRECTION_TABLE.into_iter().find(|(d, _)| *d == direction).expect("every Direction has a table entry");
        acc + impulse
    })
}

/// Twelve direction bits plus the stop bit, stored compactly.
#[bitfield(u16)]
pub struct MovementFlags {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub forward_nudge: bool,
    pub back_nudge: bool,
    pub left_nudge: bool,
    pub right_nudge: bool,
    pub up_nudge: bool,
    pub down_nudge: bool,
    pub stop: bool,
    #[bits(3)]
    __: u8,
}

/// Per-presence motion state.
#[derive(Component)]
pub struct MotionInput {
    pub flags: MovementFlags,
    pub moving_to_target: bool,
    pub target: Vec3,
    pub land_at_target: bool,
    pub speed_modifier: f32,
    pub always_run: bool,
    pub agent_control_stop_active: bool,
    /// Ticks remaining in the "assert colliding" hack after a move-to-target landing.
    pub assert_colliding_ticks: u8,
    pub ticks_since_ray_cast: u32,
    pub doing_cam_ray_cast: bool,
}

impl Default for MotionInput {
    fn default() -> Self {
        Self {
            flags: MovementFlags::new(),
            moving_to_target: false,
            target: Vec3::ZERO,
            land_at_target: false,
            speed_modifier: 1.0,
            always_run: false,
            agent_control_stop_active: false,
            assert_colliding_ticks: 0,
            ticks_since_ray_cast: 0,
            doing_cam_ray_cast: false,
        }
    }
}

const NUM_MOVEMENTS_BETWEEN_RAY_CAST: u32 = 5;

/// Whether a per-tick camera ray-cast should be fired, per the fixed tick cadence below.
/// Advances the counter as a side effect.
pub fn should_ray_cast_camera(input: &mut MotionInput, in_mouselook: bool, sitting: bool) -> bool {
    if in_mouselook || sitting || input.doing_cam_ray_cast {
        return false;
    }
    input.ticks_since_ray_cast += 1;
    if input.ticks_since_ray_cast >= NUM_MOVEMENTS_BETWEEN_RAY_CAST {
        input.ticks_since_ray_cast = 0;
        true
    } else {
        false
    }
}

/// Follow-cam-auto heuristic: camera looks roughly straight ahead and roughly level.
#[must_use]
pub fn is_follow_cam_auto(camera_up: Vec3, look_delta_x: f32, look_delta_y: f32) -> bool {
    (camera_up.y - 0.97).abs() < 0.01 && look_delta_x.abs() < 0.4 && look_delta_y.abs() < 0.4
}

/// Flying-state precedence: `force_fly > fly_disabled > client_fly_flag`.
#[must_use]
pub fn resolve_flying(force_fly: bool, fly_disabled: bool, client_fly_flag: bool) -> bool {
    if force_fly {
        true
    } else if fly_disabled {
        false
    } else {
        client_fly_flag
    }
}

/// Recentre position used when physics reports a position that was never finite.
pub const RECENTRE_POSITION: Vec3 = Vec3::new(127.0, 127.0, 127.0);

/// Move-to-target resolution. Returns `None` when the target was reached (the caller
/// should clear `moving_to_target`), or `Some(direction_bits)` to fold into the control vector.
pub fn move_to_target(position: Vec3, rotation: Quat, target: Vec3, flying_not_landing: bool, tolerance: f32) -> MoveToTargetOutcome {
    let delta = target - position;
    let distance = if flying_not_landing {
        delta.length()
    } else {
        Vec3::new(delta.x, 0.0, delta.z).length()
    };

    if distance <= tolerance {
        return MoveToTargetOutcome::Reached;
    }

    let local = rotation.inverse() * delta;
    let local = local.normalize_or_zero();

    MoveToTargetOutcome::Moving {
        forward: local.x > 0.0,
        back: local.x < 0.0,
        left: local.z > 0.0,
        right: local.z < 0.0,
        impulse: local,
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MoveToTargetOutcome {
    Reached,
    Moving {
        forward: bool,
        back: bool,
        left: bool,
        right: bool,
        impulse: Vec3,
    },
}

/// Flying-roll accumulation. `turning` is nonzero yaw input; `vertical` is
/// up(+1)/down(-1)/neither(0).
pub fn apply_flying_roll(current: f32, turning: f32, vertical: i8, config: &crate::config::FlyingRollConfig) -> f32 {
    if turning == 0.0 {
        let sign = current.signum();
        let relaxed = current.abs() - config.relax_per_tick;
        if relaxed <= 0.0 {
            0.0
        } else {
            sign * relaxed
        }
    } else {
        let accumulate = config.accumulate_per_tick * turning.signum() * if vertical != 0 { 1.5 } else { 1.0 };
        (current + accumulate).clamp(-config.max_radians, config.max_radians)
    }
}

/// `AddNewMovement`: rotates, clamps, and scales the accumulated control vector into the
/// force the physics adapter applies next tick.
pub fn add_new_movement(
    accumulated: Vec3,
    body_rotation: Quat,
    speed_modifier: f32,
    scale: f32,
    in_mouselook: bool,
    falling_and_not_hovering: bool,
    flying_and_colliding_downward: bool,
    flying: bool,
    on_ground_and_jumping: bool,
) -> Vec3 {
    let mut v = body_rotation * accumulated;

    if in_mouselook {
        v.y = 0.0;
    }

    v *= MOVEMENT_POST_SCALE * speed_modifier * scale;

    if falling_and_not_hovering {
        if flying {
            v.y = 0.0;
        } else {
            v.y = -9999.0;
        }
    }

    if flying_and_colliding_downward {
        v.y = 0.0;
    }

    if flying {
        v *= 4.0;
    }

    if on_ground_and_jumping && v.y > 2.0 {
        v.y *= 2.6;
    }

    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn direction_table_has_twelve_unit_impulses() {
        assert_eq!(DIRECTION_TABLE.len(), 12);
        for (_, v) in DIRECTION_TABLE {
            assert_relative_eq!(v.length(), 1.0);
        }
    }

    #[test]
    fn move_to_target_reports_reached_within_tolerance() {
        let outcome = move_to_target(Vec3::ZERO, Quat::IDENTITY, Vec3::new(0.05, 0.0, 0.0), false, 0.1);
        assert_eq!(outcome, MoveToTargetOutcome::Reached);
    }

    #[test]
    fn move_to_target_sets_forward_bit_toward_positive_x() {
        let outcome = move_to_target(Vec3::ZERO, Quat::IDENTITY, Vec3::new(5.0, 0.0, 0.0), false, 0.1);
        match outcome {
            MoveToTargetOutcome::Moving { forward, back, .. } => {
                assert!(forward);
                assert!(!back);
            }
            MoveToTargetOutcome::Reached => panic!("expected Moving"),
        }
    }

    #[test]
    fn flying_roll_clamps_to_max_radians() {
        let config = crate::config::FlyingRollConfig::default();
        let mut roll = 0.0;
        for _ in 0..100 {
            roll = apply_flying_roll(roll, 1.0, 0, &config);
        }
        assert_relative_eq!(roll, config.max_radians);
    }

    #[test]
    fn flying_roll_relaxes_to_zero_without_turning() {
        let config = crate::config::FlyingRollConfig::default();
        let mut roll = config.max_radians;
        for _ in 0..200 {
            roll = apply_flying_roll(roll, 0.0, 0, &config);
        }
        assert_eq!(roll, 0.0);
    }

    #[test]
    fn falling_without_flying_uses_sentinel() {
        let v = add_new_movement(Vec3::new(1.0, 1.0, 0.0), Quat::IDENTITY, 1.0, 1.0, false, true, false, false, false);
        assert_eq!(v.y, -9999.0);
    }

    #[test]
    fn movement_flags_from_raw_extracts_forward_and_up() {
        let raw = control_bits::AT_POS | control_bits::UP_POS;
        let flags = movement_flags_from_raw(raw);
        assert!(flags.forward());
        assert!(flags.up());
        assert!(!flags.back());
    }

    #[test]
    fn accumulated_control_vector_sums_set_direction_bits() {
        let mut flags = MovementFlags::new();
        flags.set_forward(true);
        flags.set_up(true);
        let v = accumulated_control_vector(flags);
        assert_eq!(v, Vec3::new(NOMINAL, NOMINAL, 0.0));
    }

    #[test]
    fn jump_boost_multiplies_y_when_on_ground() {
        let v = add_new_movement(Vec3::new(0.0, 3.0, 0.0), Quat::IDENTITY, 1.0, 1.0, false, false, false, false, true);
        assert_relative_eq!(v.y, 3.0 * MOVEMENT_POST_SCALE * 2.6);
    }
}
