//! Sit/Stand Controller.

use bevy::prelude::*;
use glam::{Quat, Vec3};

use crate::{
    collab::{PhysicsScene, SitResponse, SitSolution},
    config::SitConfig,
    error::PresenceError,
};

/// `(parent_object_id, parent_part_id, prev_sit_offset)`. A non-zero
/// `parent_part_id` means "sitting".
#[derive(Component, Debug, Copy, Clone, PartialEq, Default)]
pub struct Seat {
    pub parent_object_id: Option<Entity>,
    pub parent_part_id: u32,
    pub prev_sit_offset: Vec3,
}

impl Seat {
    #[must_use]
    pub fn is_sat_on_object(&self) -> bool {
        self.parent_part_id != 0
    }
}

/// A candidate seat part as surfaced by the `Scene` collaborator.
#[derive(Debug, Clone, Copy)]
pub struct SitPart {
    pub part_id: u32,
    pub link_number: u32,
    pub is_selected: bool,
    pub sit_target: Option<(Vec3, Quat)>,
    pub sit_target_occupied: bool,
    pub custom_sit_animation: Option<&'static str>,
}

/// Picks the sit-eligible part: prefer any linked part with a free, set sit-target, selected
/// part first, then link-number order; fall back to the clicked part.
#[must_use]
pub fn resolve_sit_part(clicked: SitPart, candidates: &[SitPart]) -> SitPart {
    let mut eligible: Vec<&SitPart> = candidates
        .iter()
        .filter(|p| p.sit_target.is_some() && !p.sit_target_occupied)
        .collect();

    eligible.sort_by(|a, b| b.is_selected.cmp(&a.is_selected).then(a.link_number.cmp(&b.link_number)));

    eligible.first().map_or(clicked, |p| **p)
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SitOutcome {
    pub seat: Seat,
    pub body_position: Vec3,
    pub body_rotation: Quat,
    pub response: SitResponse,
    pub animation: &'static str,
}

/// Computes a sit from an explicit sit-target part.
#[must_use]
pub fn sit_on_explicit_target(
    part: &SitPart,
    part_world_position: Vec3,
    part_world_rotation: Quat,
    root_part_rotation: Quat,
    avatar_half_height: f32,
    avatar_height: f32,
    legacy_offset: bool,
    config: &SitConfig,
) -> SitOutcome {
    let (sit_target_pos, sit_target_rot) = part.sit_target.expect("explicit sit target required");

    let offset = if legacy_offset {
        let up = part_world_rotation * Vec3::Y;
        let scale = config.legacy_offset_scale / part_world_rotation.length_sq().max(f32::EPSILON);
        Vec3::new(0.0, config.vertical_adjustment, 0.0) - up * scale
    } else {
        let normalized_rotation = part_world_rotation.normalize();
        let up = normalized_rotation * Vec3::Y;
        up * (config.modern_offset_scale * avatar_height) + Vec3::new(0.0, config.vertical_adjustment, 0.0)
    };

    let seat_position = part_world_position + part_world_rotation * sit_target_pos + Vec3::new(0.0, avatar_half_height, 0.0) + offset;
    let seat_rotation = root_part_rotation * part_world_rotation * sit_target_rot;

    let response = SitResponse {
        offset: sit_target_pos,
        orientation: sit_target_rot,
        camera_at_offset: Vec3::new(0.0, 0.0, 0.0),
        camera_eye_offset: Vec3::new(0.0, 0.0, 0.0),
        force_mouselook: false,
    };

    SitOutcome {
        seat: Seat {
            parent_object_id: None,
            parent_part_id: part.part_id,
            prev_sit_offset: sit_target_pos,
        },
        body_position: seat_position,
        body_rotation: seat_rotation,
        response,
        animation: part.custom_sit_animation.unwrap_or("SIT"),
    }
}

/// Computes a sit with no explicit target: delegate to physics, else fall back to a geometric
/// offset when the requester is within `max_geometric_fallback_distance` of the resolved world
/// position.
pub fn sit_on_surface(
    physics: &dyn PhysicsScene,
    hit_point: Vec3,
    requester_position: Vec3,
    resolved_world_position: Vec3,
    part_id: u32,
    config: &SitConfig,
    presence: Entity,
) -> Result<SitSolution, PresenceError> {
    if let Some(solution) = physics.sit_on_surface(hit_point) {
        return Ok(solution);
    }

    if requester_position.distance(resolved_world_position) <= config.max_geometric_fallback_distance {
        return Ok(SitSolution {
            position: hit_point + Vec3::new(0.0, config.vertical_adjustment, 0.0),
            rotation: Quat::IDENTITY,
        });
    }

    let _ = part_id;
    Err(PresenceError::SitRefused(presence))
}

/// Sit-on-ground path: simpler than an object sit, no seat linkage.
#[must_use]
pub fn sit_on_ground() -> &'static str {
    "SIT_GROUND_CONSTRAINED"
}

/// Stand-up extraction offset applied in the seat's rotation frame:
/// `(0.75, sit_avatar_height + 0.3, 0)`.
#[must_use]
pub fn stand_up(seat_world_position: Vec3, seat_world_rotation: Quat, sit_target_rotation: Option<Quat>, stored_body_rotation: Quat, avatar_height: f32) -> (Vec3, Quat) {
    let offset = Vec3::new(0.75, avatar_height + 0.3, 0.0);
    let stand_position = seat_world_position + seat_world_rotation * offset;
    let orientation_component = sit_target_rotation.unwrap_or(stored_body_rotation);
    let body_rotation = seat_world_rotation * orientation_component;
    (stand_position, body_rotation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_sit_part_prefers_selected_then_link_order() {
        let clicked = SitPart {
            part_id: 9,
            link_number: 9,
            is_selected: false,
            sit_target: None,
            sit_target_occupied: false,
            custom_sit_animation: None,
        };
        let a = SitPart {
            part_id: 1,
            link_number: 2,
            is_selected: false,
            sit_target: Some((Vec3::ZERO, Quat::IDENTITY)),
            sit_target_occupied: false,
            custom_sit_animation: None,
        };
        let b = SitPart {
            part_id: 2,
            link_number: 1,
            is_selected: true,
            sit_target: Some((Vec3::ZERO, Quat::IDENTITY)),
            sit_target_occupied: false,
            custom_sit_animation: None,
        };
        let chosen = resolve_sit_part(clicked, &[a, b]);
        assert_eq!(chosen.part_id, 2);
    }

    #[test]
    fn resolve_sit_part_falls_back_to_clicked_when_none_eligible() {
        let clicked = SitPart {
            part_id: 9,
            link_number: 9,
            is_selected: false,
            sit_target: None,
            sit_target_occupied: false,
            custom_sit_animation: None,
        };
        let occupied = SitPart {
            part_id: 1,
            link_number: 1,
            is_selected: false,
            sit_target: Some((Vec3::ZERO, Quat::IDENTITY)),
            sit_target_occupied: true,
            custom_sit_animation: None,
        };
        let chosen = resolve_sit_part(clicked, &[occupied]);
        assert_eq!(chosen.part_id, 9);
    }

    #[test]
    fn stand_up_uses_sit_target_rotation_when_present() {
        let (_, rotation) = stand_up(Vec3::ZERO, Quat::IDENTITY, Some(Quat::from_rotation_z(1.0)), Quat::IDENTITY, 1.8);
        assert_eq!(rotation, Quat::from_rotation_z(1.0));
    }
}
