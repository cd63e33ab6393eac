//! Transit Coordinator.

use std::time::Duration;

use bevy::prelude::*;
use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::{
    collab::{AttachmentModule, GridService, PhysicsScene, Scene, TransferModule},
    config::Config,
    error::{PresenceError, PresenceResult},
    presence::{
        landing::{self, LandingPolicy, LandingRequest, TelehubMode},
        lifecycle::Lifecycle,
        payload::TransitPayload,
    },
};

/// One known neighbour: seed capability endpoint plus region size.
#[derive(Debug, Clone)]
pub struct Neighbour {
    pub seed_capability_endpoint: String,
    pub size_x: f32,
    pub size_y: f32,
    pub session_token: String,
}

/// Per-presence transit bookkeeping.
#[derive(Component, Default)]
pub struct Transit {
    /// Empty until the peer region confirms it.
    pub origin_region_id: Option<u64>,
    pub callback_uri: Option<String>,
    pub do_not_close_after_teleport: bool,
    pub neighbours: FxHashMap<u64, Neighbour>,
    pub child_update_gate_open_after: Option<std::time::Duration>,
}

impl Transit {
    /// A presence never lists its own region as a neighbour.
    pub fn insert_neighbour(&mut self, own_region_handle: u64, region_handle: u64, neighbour: Neighbour) {
        if region_handle == own_region_handle {
            return;
        }
        self.neighbours.insert(region_handle, neighbour);
    }
}

/// Arguments to [`complete_movement`], gathered from the request and the presence's current
/// state.
pub struct CompleteMovementRequest<'a> {
    pub is_npc: bool,
    pub is_real_login: bool,
    pub declared_position: Vec3,
    pub client_look: Option<Vec3>,
    pub current_velocity: Vec3,
    pub flying: bool,
    pub flags: crate::presence::landing::TeleportFlags,
    pub landing_policy: LandingPolicy,
    pub telehub_mode: TelehubMode,
    pub scene: &'a dyn Scene,
    pub land: &'a dyn crate::collab::LandChannel,
    pub physics: &'a dyn PhysicsScene,
    pub avatar_half_extents: Vec3,
    pub is_owner_manager_or_god: bool,
    pub access_level: u32,
    pub config: &'a Config,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CompleteMovementOutcome {
    pub position: Vec3,
    pub look: Vec3,
    pub momentum_carried: bool,
    pub body: crate::collab::PhysicsBodyId,
}

/// Computes the landing look vector: client-sent look, else horizontal-projected-and-normalised
/// current velocity, else a default horizontal vector.
#[must_use]
fn landing_look(client_look: Option<Vec3>, velocity: Vec3) -> Vec3 {
    if let Some(look) = client_look {
        return look.normalize_or_zero();
    }
    let horizontal = Vec3::new(velocity.x, 0.0, velocity.z);
    let normalised = horizontal.normalize_or_zero();
    if normalised == Vec3::ZERO {
        Vec3::X
    } else {
        normalised
    }
}

/// `CompleteMovement` inbound hand-off. Step 1's bounded wait is modelled by
/// the caller polling [`Transit::origin_region_id`] before calling this function and passing
/// `PeerHandshakeTimeout` up if it never arrives; this function covers steps 2 onward.
pub fn complete_movement(
    presence: Entity,
    lifecycle: &mut Lifecycle,
    transit: &mut Transit,
    request: &CompleteMovementRequest<'_>,
) -> PresenceResult<CompleteMovementOutcome> {
    let look = landing_look(request.client_look, request.current_velocity);

    if let Err(PresenceError::AlreadyRoot(e)) = lifecycle.make_root(presence) {
        return Err(PresenceError::AlreadyRoot(e));
    }

    let half_avatar_height = request.avatar_half_extents.y;
    let mut position = landing::clamp_and_ground(request.scene, request.declared_position, half_avatar_height);

    let location_arrival = crate::collab::arrival_is_redirectable(request.flags);
    if location_arrival {
        if let Some(surface_y) = landing::probe_landing_surface(request.scene, position, request.config) {
            position.y = surface_y + half_avatar_height;
        }
    }

    let landing_request = LandingRequest {
        requested_position: position,
        flags: request.flags,
        is_owner_manager_or_god: request.is_owner_manager_or_god,
        access_level: request.access_level,
    };
    position = landing::resolve_landing(
        request.landing_policy,
        request.telehub_mode,
        request.scene,
        request.land,
        presence,
        &landing_request,
    )?;

    let body = request.physics.add_avatar(presence, request.avatar_half_extents, half_avatar_height, request.flying);

    let is_simple_teleport = !request.flags.is_empty() && !location_arrival;
    if !is_simple_teleport {
        request.physics.set_momentum(presence, Vec3::ZERO);
    }

    transit.child_update_gate_open_after = Some(Duration::from_millis(request.config.transit.child_update_gate_millis));

    if let Some(callback) = transit.callback_uri.take() {
        info!(?presence, callback, "releasing callback after completed movement");
    }

    Ok(CompleteMovementOutcome { position, look, momentum_carried: is_simple_teleport, body })
}

/// Outbound border-cross prediction. Returns `None` when the predicted
/// position stays inside the region.
#[must_use]
pub fn predict_crossing(position: Vec3, velocity: Vec3, region_size: (f32, f32)) -> Option<Vec3> {
    let predicted = position + velocity * 0.1;
    let (size_x, size_y) = region_size;
    let outside = predicted.x < 0.0 || predicted.x > size_x || predicted.z < 0.0 || predicted.z > size_y;
    outside.then_some(predicted)
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CrossOutcome {
    pub accepted: bool,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Attempts a border cross via the transfer module; on refusal, reflects the avatar just inside
/// the border and zeroes velocity.
pub fn cross_to_new_region(transfer: &dyn TransferModule, presence: Entity, position: Vec3, velocity: Vec3, region_size: (f32, f32)) -> CrossOutcome {
    let direction = velocity.normalize_or_zero();
    if transfer.cross_agent(presence, direction) {
        return CrossOutcome {
            accepted: true,
            position,
            velocity,
        };
    }

    let (size_x, size_y) = region_size;
    let mut reflected = position;
    if position.x < 0.0 || position.x > size_x {
        reflected.x = position.x + 2.0 * velocity.x;
    }
    if position.z < 0.0 || position.z > size_y {
        reflected.z = position.z + 2.0 * velocity.z;
    }

    let _ = presence;
    CrossOutcome {
        accepted: false,
        position: reflected,
        velocity: Vec3::ZERO,
    }
}

/// The "is-outside-view" predicate used for neighbour pruning:
/// true when the neighbour's own draw distance also cannot see back into `own_region`.
#[must_use]
pub fn is_outside_view(own_region_size: (f32, f32), own_position: Vec3, neighbour_size: (f32, f32), distance_to_neighbour_centre: f32, view_distance: f32) -> bool {
    let _ = (own_region_size, own_position, neighbour_size);
    distance_to_neighbour_centre > view_distance
}

/// Closes neighbours that fall outside the new view rectangle, requesting the grid service
/// close each child-agent connection.
pub fn prune_neighbours(transit: &mut Transit, grid: &dyn GridService, presence: Entity, own_region_size: (f32, f32), own_position: Vec3, view_distance: f32, neighbour_centre: impl Fn(u64) -> (f32, Vec3)) -> Vec<PresenceError> {
    let mut errors = Vec::new();
    let to_close: Vec<u64> = transit
        .neighbours
        .iter()
        .filter_map(|(&handle, n)| {
            let (distance, _) = neighbour_centre(handle);
            is_outside_view(own_region_size, own_position, (n.size_x, n.size_y), distance, view_distance).then_some(handle)
        })
        .collect();

    for handle in to_close {
        if let Some(neighbour) = transit.neighbours.remove(&handle) {
            if let Err(reason) = grid.close_child_agent(handle, &neighbour.session_token) {
                let reason = reason.to_string();
                warn!(?presence, handle, reason, "failed to close neighbour child-agent connection");
                errors.push(PresenceError::NeighbourCloseFailed { presence, region_handle: handle, reason });
            }
        }
    }

    errors
}

/// Arguments to [`snapshot_for_transit`], gathered from every component the presence carries.
pub struct TransitSnapshotRequest<'a> {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
    pub flying: bool,
    pub flags: crate::presence::landing::TeleportFlags,
    pub camera: &'a crate::presence::Camera,
    pub view_distances: &'a crate::presence::ViewDistances,
    pub control_flags: u32,
    pub speed_modifier: f32,
    pub always_run: bool,
    pub access_level: u32,
    pub seat: &'a crate::presence::sit::Seat,
    pub scripts: &'a crate::presence::scripts::ScriptControls,
    pub transit: &'a Transit,
    pub session_id: uuid::Uuid,
    pub attachments: &'a dyn AttachmentModule,
    pub presence: Entity,
}

/// Builds the cross-region transit payload.
#[must_use]
pub fn snapshot_for_transit(request: &TransitSnapshotRequest<'_>) -> TransitPayload {
    use crate::presence::payload::{CameraPayload, NeighbourPayload};

    TransitPayload {
        position: request.position,
        velocity: request.velocity,
        rotation: request.rotation,
        flying: request.flying,
        flags: request.flags,
        camera: CameraPayload {
            position: request.camera.position,
            at_axis: request.camera.at_axis,
            left_axis: request.camera.left_axis,
            up_axis: request.camera.up_axis,
        },
        draw_distance: request.view_distances.draw_distance,
        region_view_distance: request.view_distances.region_view_distance,
        control_flags: request.control_flags,
        speed_modifier: request.speed_modifier,
        always_run: request.always_run,
        access_level: request.access_level,
        parent_part_id: request.seat.parent_part_id,
        prev_sit_offset: request.seat.prev_sit_offset,
        scripted_controls: request.scripts.snapshot(),
        attachments: request.attachments.copy_to_transit(request.presence),
        neighbours: request
            .transit
            .neighbours
            .iter()
            .map(|(&region_handle, n)| NeighbourPayload {
                region_handle,
                seed_capability_endpoint: n.seed_capability_endpoint.clone(),
                size_x: n.size_x,
                size_y: n.size_y,
            })
            .collect(),
        session_id: request.session_id,
        origin_region_id: request.transit.origin_region_id,
    }
}

/// State restored on the destination side from a transit payload.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RestoredState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
    pub flying: bool,
    pub control_flags: u32,
    pub speed_modifier: f32,
    pub always_run: bool,
    pub access_level: u32,
    pub parent_part_id: u32,
    pub prev_sit_offset: Vec3,
}

/// Restores presence state on the destination side from a transit payload, rezzing attachments
/// and re-keying script-control registrations through the collaborators, and seeding the
/// neighbour table it carried. `object_id` is the destination-region entity that now owns any
/// restored script registrations.
pub fn restore_from_transit(
    payload: &TransitPayload,
    attachments: &dyn AttachmentModule,
    scripts: &mut crate::presence::scripts::ScriptControls,
    transit: &mut Transit,
    presence: Entity,
    object_id: Entity,
    own_region_handle: u64,
) -> RestoredState {
    attachments.rez(presence, &payload.attachments);
    scripts.restore(&payload.scripted_controls, object_id);

    transit.origin_region_id = payload.origin_region_id;
    for neighbour in &payload.neighbours {
        transit.insert_neighbour(
            own_region_handle,
            neighbour.region_handle,
            Neighbour {
                seed_capability_endpoint: neighbour.seed_capability_endpoint.clone(),
                size_x: neighbour.size_x,
                size_y: neighbour.size_y,
                session_token: String::new(),
            },
        );
    }

    RestoredState {
        position: payload.position,
        velocity: payload.velocity,
        rotation: payload.rotation,
        flying: payload.flying,
        control_flags: payload.control_flags,
        speed_modifier: payload.speed_modifier,
        always_run: payload.always_run,
        access_level: payload.access_level,
        parent_part_id: payload.parent_part_id,
        prev_sit_offset: payload.prev_sit_offset,
    }
}
