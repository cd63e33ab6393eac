//! Physical Body Adapter.

use std::collections::HashSet;

use bevy::prelude::*;
use presence_geom::CollisionPlane;

use crate::collab::PhysicsBodyId;

/// Standard avatar half-extents `(width 0.45, height 1.9, depth 0.6)` used absent a configured
/// appearance size. Height is the Y component, matching every other vertical reading in the crate.
pub const STANDARD_AVATAR_SHAPE: glam::Vec3 = glam::Vec3::new(0.45, 1.9, 0.6);

/// Collision callback subscription cadence.
pub const COLLISION_CADENCE_MILLIS: u64 = 100;

/// Optional handle to a physical body. Absent while sitting or a child agent.
#[derive(Component, Default)]
pub struct PhysicsLink {
    pub body: Option<PhysicsBodyId>,
    pub collision_plane: CollisionPlane,
    pub colliders: HashSet<Entity>,
    pub flying: bool,
}

impl PhysicsLink {
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.body.is_some()
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Contact {
    pub other: Entity,
    pub point: glam::Vec3,
    pub normal: glam::Vec3,
    pub relative_speed: f32,
    pub penetration_depth: f32,
    pub character_feet: bool,
    pub damage: Option<f32>,
}

#[derive(Debug, Default)]
pub struct CollisionDiff {
    pub started: Vec<Entity>,
    pub ended: Vec<Entity>,
    pub continuing: Vec<Entity>,
}

/// Diffs the current tick's collider set against the previous one.
#[must_use]
pub fn diff_colliders(previous: &HashSet<Entity>, current_contacts: &[Contact]) -> (CollisionDiff, HashSet<Entity>) {
    let current: HashSet<Entity> = current_contacts.iter().map(|c| c.other).collect();

    let diff = CollisionDiff {
        started: current.difference(previous).copied().collect(),
        ended: previous.difference(&current).copied().collect(),
        continuing: previous.intersection(&current).copied().collect(),
    };

    (diff, current)
}

/// Selects the collision plane from the lowest (most-vertically-down) `character_feet` contact,
/// or resets to the unconstrained default when there is none.
#[must_use]
pub fn compute_collision_plane(contacts: &[Contact]) -> CollisionPlane {
    contacts
        .iter()
        .filter(|c| c.character_feet)
        .min_by(|a, b| a.point.y.total_cmp(&b.point.y))
        .map_or(CollisionPlane::UNCONSTRAINED, |c| CollisionPlane::from_contact(c.normal, c.point))
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DamageOutcome {
    pub health_delta: f32,
    pub kill_colliding_group: bool,
}

/// Per-contact damage rule: a collider with a group-level damage value deletes the
/// group and applies that damage; an ordinary contact with penetration depth `>= 0.10` applies
/// `depth * 5`.
#[must_use]
pub fn damage_for_contact(contact: &Contact) -> Option<DamageOutcome> {
    if let Some(damage) = contact.damage {
        return Some(DamageOutcome { health_delta: -damage, kill_colliding_group: true });
    }
    if contact.penetration_depth >= 0.10 {
        return Some(DamageOutcome {
            health_delta: -(contact.penetration_depth * 5.0),
            kill_colliding_group: false,
        });
    }
    None
}

/// Per-tick passive regeneration toward 100, 0.03 per tick.
#[must_use]
pub fn heal_tick(health: f32) -> f32 {
    (health + 0.03).min(100.0)
}

#[derive(Component, Debug, Copy, Clone, PartialEq)]
pub struct Health {
    pub value: f32,
    pub invulnerable: bool,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            value: 100.0,
            invulnerable: false,
        }
    }
}

impl Health {
    /// Invulnerable and elevated-access avatars skip damage entirely.
    pub fn apply(&mut self, outcome: DamageOutcome, elevated_access: bool) -> bool {
        if self.invulnerable || elevated_access {
            return false;
        }
        self.value = (self.value + outcome.health_delta).max(0.0);
        self.value <= 0.0
    }

    pub fn heal(&mut self) {
        self.value = heal_tick(self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn entity(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    #[test]
    fn diff_colliders_classifies_started_ended_continuing() {
        let mut previous = HashSet::new();
        previous.insert(entity(1));
        previous.insert(entity(2));

        let contacts = vec![
            Contact {
                other: entity(2),
                point: Vec3::ZERO,
                normal: Vec3::Z,
                relative_speed: 0.0,
                penetration_depth: 0.0,
                character_feet: false,
                damage: None,
            },
            Contact {
                other: entity(3),
                point: Vec3::ZERO,
                normal: Vec3::Z,
                relative_speed: 0.0,
                penetration_depth: 0.0,
                character_feet: false,
                damage: None,
            },
        ];

        let (diff, current) = diff_colliders(&previous, &contacts);
        assert_eq!(diff.started, vec![entity(3)]);
        assert_eq!(diff.ended, vec![entity(1)]);
        assert_eq!(diff.continuing, vec![entity(2)]);
        assert!(current.contains(&entity(2)) && current.contains(&entity(3)));
    }

    #[test]
    fn compute_collision_plane_picks_lowest_feet_contact() {
        let contacts = vec![
            Contact {
                other: entity(1),
                point: Vec3::new(0.0, 2.0, 0.0),
                normal: Vec3::Y,
                relative_speed: 0.0,
                penetration_depth: 0.0,
                character_feet: true,
                damage: None,
            },
            Contact {
                other: entity(2),
                point: Vec3::new(0.0, 1.0, 0.0),
                normal: Vec3::Y,
                relative_speed: 0.0,
                penetration_depth: 0.0,
                character_feet: true,
                damage: None,
            },
        ];
        let plane = compute_collision_plane(&contacts);
        assert_eq!(plane.normal, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(plane.offset, 1.0);
    }

    #[test]
    fn invulnerable_health_skips_damage() {
        let mut health = Health {
            value: 100.0,
            invulnerable: true,
        };
        let killed = health.apply(
            DamageOutcome {
                health_delta: -50.0,
                kill_colliding_group: false,
            },
            false,
        );
        assert!(!killed);
        assert_eq!(health.value, 100.0);
    }

    #[test]
    fn health_heals_toward_one_hundred() {
        assert_eq!(heal_tick(99.99), 100.0);
        assert!((heal_tick(50.0) - 50.03).abs() < 1e-6);
    }
}
