//! Landing policies, telehub routing, and the teleport-flags bitset.

use bevy::prelude::*;
use enumset::{EnumSet, EnumSetType};
use glam::Vec3;
use tracing::debug;

use crate::{
    collab::{LandChannel, LandingType, Scene},
    config::Config,
    error::PresenceError,
};

/// The observable teleport-flags bitset.
#[derive(EnumSetType, Debug)]
pub enum TeleportFlag {
    Default,
    ViaLure,
    ViaLogin,
    ViaHGLogin,
    ViaLocation,
    ViaRegionID,
    ViaLandmark,
}

pub type TeleportFlags = EnumSet<TeleportFlag>;

/// Arrival flag set that makes a landing-point redirect eligible.
fn redirect_eligible(flags: TeleportFlags) -> bool {
    use TeleportFlag::{ViaHGLogin, ViaLandmark, ViaLocation, ViaLogin};
    flags.contains(ViaLogin)
        || flags.contains(ViaLandmark)
        || flags.contains(ViaLocation)
        || flags.contains(ViaHGLogin)
}

/// The two landing-point policies a host selects per region.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LandingPolicy {
    /// Honours estate ban checks and only redirects non-privileged arrivals.
    #[default]
    Permissive,
    /// Never redirects elevated-access users; always telehub-routes when direct teleport is
    /// disallowed; also respects `user_look_at`.
    Strict,
}

/// Mode used to pick a telehub spawn point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TelehubMode {
    #[default]
    Random,
    Sequence,
    Closest,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SpawnPoint {
    pub position: Vec3,
}

pub struct LandingRequest {
    pub requested_position: Vec3,
    pub flags: TeleportFlags,
    pub is_owner_manager_or_god: bool,
    pub access_level: u32,
}

/// Resolves a requested teleport position into a final landing position, applying estate/telehub
/// routing and landing-point redirection per the selected [`LandingPolicy`].
pub fn resolve_landing(
    policy: LandingPolicy,
    mode: TelehubMode,
    scene: &dyn Scene,
    land: &dyn LandChannel,
    presence: Entity,
    request: &LandingRequest,
) -> Result<Vec3, PresenceError> {
    let direct_allowed = scene.direct_teleport_allowed();
    let telehub = scene.telehub_spawn_points();

    let never_redirect_privileged = matches!(policy, LandingPolicy::Strict) && request.access_level >= 200;

    if !direct_allowed && !never_redirect_privileged {
        if let Some(points) = telehub.filter(|points| !points.is_empty()) {
            return route_telehub(mode, &points, land, presence, request.requested_position);
        }
        if matches!(policy, LandingPolicy::Strict) {
            return Err(PresenceError::LandingDenied {
                presence,
                reason: "direct teleport disallowed and no telehub is configured".into(),
            });
        }
    }

    if never_redirect_privileged || request.is_owner_manager_or_god {
        return Ok(request.requested_position);
    }

    if !redirect_eligible(request.flags) {
        return Ok(request.requested_position);
    }

    let parcel = land.parcel_at(request.requested_position.x, request.requested_position.z);

    if parcel.landing_type == LandingType::LandingPoint {
        if let Some(user_location) = parcel.user_location.filter(|p| *p != Vec3::ZERO) {
            debug!(?presence, "redirected to parcel landing point");
            return Ok(user_location);
        }
    }

    Ok(request.requested_position)
}

fn route_telehub(
    mode: TelehubMode,
    points: &[SpawnPoint],
    land: &dyn LandChannel,
    presence: Entity,
    requested: Vec3,
) -> Result<Vec3, PresenceError> {
    let permits = |p: &SpawnPoint| {
        let parcel = land.parcel_at(p.position.x, p.position.z);
        land.ban_check(presence, parcel.id)
    };

    match mode {
        TelehubMode::Random => {
            let mut indices: Vec<usize> = (0..points.len()).collect();
            fastrand::shuffle(&mut indices);
            for i in indices {
                if permits(&points[i]) {
                    return Ok(points[i].position);
                }
            }
            // Exhausted without a permitted point: fall through to sequence.
            route_telehub(TelehubMode::Sequence, points, land, presence, requested)
        }
        TelehubMode::Sequence => points
            .iter()
            .find(|p| permits(p))
            .map(|p| p.position)
            .ok_or_else(|| PresenceError::LandingDenied {
                presence,
                reason: "no telehub spawn point permits this avatar".into(),
            }),
        TelehubMode::Closest => points
            .iter()
            .filter(|p| permits(p))
            .min_by(|a, b| {
                let da = a.position.distance_squared(requested);
                let db = b.position.distance_squared(requested);
                da.total_cmp(&db)
            })
            .map(|p| p.position)
            .ok_or_else(|| PresenceError::LandingDenied {
                presence,
                reason: "no telehub spawn point permits this avatar".into(),
            }),
    }
}

/// Clamps a position into the region's horizontal bounds and raises it to stand on the ground.
/// This is a floor, not an overwrite: a position already above the ground keeps its height.
#[must_use]
pub fn clamp_and_ground(scene: &dyn Scene, position: Vec3, half_avatar_height: f32) -> Vec3 {
    let (size_x, size_y) = scene.region_size();
    let x = position.x.clamp(0.5, size_x - 0.5);
    let z = position.z.clamp(0.5, size_y - 0.5);
    let ground = scene.ground_height(x, z);
    Vec3::new(x, position.y.max(ground + half_avatar_height), z)
}

/// Probes downward from a configured test height for the first non-adjacent surface.
#[must_use]
pub fn probe_landing_surface(scene: &dyn Scene, position: Vec3, config: &Config) -> Option<f32> {
    let ground = scene.ground_height(position.x, position.z);
    let test_height = (config.landing.ray_cast_height_cap)
        .min(ground + config.landing.ray_cast_ground_margin)
        .max(ground);

    let origin = Vec3::new(position.x, position.y.max(ground + test_height), position.z);
    let ray = presence_geom::Ray::straight_down(origin);

    let hits = scene.ray_cast(ray, config.landing.max_ray_contacts);

    let mut last_accepted: Option<f32> = None;
    for hit in hits {
        if !hit.is_opaque || hit.is_volume_detect {
            continue;
        }
        if let Some(last) = last_accepted {
            if (last - hit.point.y).abs() < config.landing.min_surface_gap {
                continue;
            }
        }
        last_accepted = Some(hit.point.y);
        return last_accepted;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubScene;

    #[test]
    fn redirect_eligible_requires_a_named_arrival_path() {
        assert!(!redirect_eligible(TeleportFlags::only(TeleportFlag::Default)));
        assert!(redirect_eligible(TeleportFlags::only(TeleportFlag::ViaLocation)));
        assert!(redirect_eligible(TeleportFlags::only(TeleportFlag::ViaLandmark)));
    }

    #[test]
    fn clamp_and_ground_clamps_into_region_bounds() {
        let scene = StubScene::flat(20.0, 256.0, 256.0);
        let position = clamp_and_ground(&scene, Vec3::new(-5.0, 0.0, 300.0), 0.95);
        assert_eq!(position.x, 0.5);
        assert_eq!(position.z, 255.5);
        assert_eq!(position.y, 20.95);
    }

    #[test]
    fn clamp_and_ground_is_a_floor_not_an_overwrite() {
        let scene = StubScene::flat(20.0, 256.0, 256.0);
        let position = clamp_and_ground(&scene, Vec3::new(50.0, 22.0, 50.0), 0.95);
        assert_eq!(position, Vec3::new(50.0, 22.0, 50.0));
    }
}
