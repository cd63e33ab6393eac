//! Wires the sibling modules' pure functions into systems driven by [`super::PresencePlugin`].
//! Each system stays a thin adapter over its sibling module; the logic itself lives there and is
//! unit-tested there.

use std::time::Duration;

use bevy::prelude::*;
use presence_geom::CollisionPlane;
use rustc_hash::FxHashMap;

use crate::{
    collab::{ClientSinkHandle, GridServiceHandle, LandChannelHandle, PhysicsSceneHandle, TransferModuleHandle, UpdateFlags},
    config::Config,
    events::{
        AgentUpdateEvent, AvatarKillEvent, ClientMovementEvent, CollisionEndEvent, CollisionEvent, CollisionStartEvent, ContactReportEvent, ControlEvent,
        ParcelBoundaryEvent, SignificantClientMovementEvent, SitRequestEvent, StandUpEvent, TeleportRequestEvent,
    },
    presence::{
        body::{self, Health, PhysicsLink},
        landing::LandingPolicy,
        lifecycle::Lifecycle,
        motion::{self, MotionInput, MovementFlags},
        parcel::{self, ParcelState, Visibility},
        schedule::{self, UpdateScheduler},
        scripts::ScriptControls,
        sit::{self, Seat, SitPart},
        transit::{self, Transit},
        BodyRotation, Identity, Position, Presence, Velocity, ViewDistances,
    },
};

/// Internal simulation clock, advanced once per `Update` tick. Deliberately not bevy's own
/// [`Time`](bevy::time::Time): every scheduling function in [`schedule`] already takes an
/// explicit `now: Duration`, so the host application's tick cadence is the only input needed.
#[derive(Resource, Debug, Copy, Clone, Default)]
pub struct SimClock {
    pub now: Duration,
}

pub const TICK_PERIOD: Duration = Duration::from_millis(100);

pub fn advance_clock(mut clock: ResMut<SimClock>) {
    clock.now += TICK_PERIOD;
}

/// `AgentUpdate` handling: the per-tick entry point that folds client control flags into the
/// accumulated movement impulse, advances the update scheduler, and dispatches script controls.
#[allow(clippy::type_complexity)]
pub fn handle_agent_update(
    mut events: EventReader<'_, '_, AgentUpdateEvent>,
    config: Res<'_, Config>,
    physics: Res<'_, PhysicsSceneHandle>,
    mut query: Query<'_, '_, (&Position, &Velocity, &mut MotionInput, &mut UpdateScheduler, &mut ScriptControls, &PhysicsLink, &Seat), With<Presence>>,
    mut client_movement: EventWriter<'_, ClientMovementEvent>,
    mut significant_movement: EventWriter<'_, SignificantClientMovementEvent>,
    mut control_events: EventWriter<'_, ControlEvent>,
) {
    for event in events.read() {
        let Ok((position, velocity, mut motion_input, mut scheduler, mut scripts, physics_link, seat)) = query.get_mut(event.presence) else {
            continue;
        };

        let observed = scripts.apply_ignore_mask(event.control_flags);
        for (item_id, held, changed) in scripts.dispatch_tick(event.control_flags) {
            control_events.write(ControlEvent { item_id, held, changed });
        }

        motion_input.flags = motion::movement_flags_from_raw(observed);

        let on_ground = physics_link.collision_plane != CollisionPlane::UNCONSTRAINED;
        let accumulated = motion::accumulated_control_vector(motion_input.flags);
        let force = motion::add_new_movement(
            accumulated,
            event.body_rotation,
            motion_input.speed_modifier,
            1.0,
            event.in_mouselook,
            !on_ground && !physics_link.flying,
            physics_link.flying && on_ground && force_points_down(accumulated),
            physics_link.flying,
            on_ground && accumulated.y > 0.0,
        );
        physics.set_target_velocity(physics_link.body.unwrap_or(crate::collab::PhysicsBodyId(0)), force);

        let significance = schedule::check_significance(&mut scheduler, position.0, &config.significance);
        if significance.client_movement {
            client_movement.write(ClientMovementEvent {
                presence: event.presence,
                position: position.0,
            });
        }
        if significance.significant_client_movement {
            significant_movement.write(SignificantClientMovementEvent {
                presence: event.presence,
                position: position.0,
            });
        }

        let sitting = seat.is_sat_on_object();
        if schedule::should_send_terse_update(&scheduler, position.0, BodyRotation::default().0, velocity.0, sitting, &config.significance) {
            scheduler.last_sent_position = position.0;
            scheduler.last_sent_velocity = velocity.0;
        }
    }
}

fn force_points_down(accumulated: Vec3) -> bool {
    accumulated.y < 0.0
}

/// Physical Body Adapter: diffs the contact set, applies per-contact damage, and recomputes the
/// camera-constraint plane.
pub fn handle_contact_reports(
    mut events: EventReader<'_, '_, ContactReportEvent>,
    sink: Res<'_, ClientSinkHandle>,
    mut query: Query<'_, '_, (&mut PhysicsLink, &mut Health, &Identity), With<Presence>>,
    mut started: EventWriter<'_, CollisionStartEvent>,
    mut continuing: EventWriter<'_, CollisionEvent>,
    mut ended: EventWriter<'_, CollisionEndEvent>,
) {
    for event in events.read() {
        let Ok((mut link, mut health, identity)) = query.get_mut(event.presence) else {
            continue;
        };

        let (diff, current) = body::diff_colliders(&link.colliders, &event.contacts);
        link.colliders = current;

        for other in diff.started {
            started.write(CollisionStartEvent {
                presence: event.presence,
                other,
                other_local_id: other.to_bits(),
            });
        }
        for other in diff.continuing {
            continuing.write(CollisionEvent {
                presence: event.presence,
                other,
                other_local_id: other.to_bits(),
            });
        }
        for other in diff.ended {
            ended.write(CollisionEndEvent {
                presence: event.presence,
                other,
                other_local_id: other.to_bits(),
            });
        }

        for contact in &event.contacts {
            if let Some(outcome) = body::damage_for_contact(contact) {
                health.apply(outcome, identity.is_elevated());
                sink.send_health(event.presence, health.value);
            }
        }

        let plane = body::compute_collision_plane(&event.contacts);
        if plane != link.collision_plane {
            link.collision_plane = plane;
            sink.send_camera_constraint(event.presence, plane);
        }
    }
}

/// Per-tick passive health regeneration.
pub fn regenerate_health(mut query: Query<'_, '_, &mut Health, With<Presence>>) {
    for mut health in &mut query {
        health.heal();
    }
}

/// Transit Coordinator: completes an inbound teleport/`CompleteMovement` request.
#[allow(clippy::too_many_arguments)]
pub fn handle_teleport_requests(
    mut events: EventReader<'_, '_, TeleportRequestEvent>,
    config: Res<'_, Config>,
    scene: Res<'_, crate::collab::SceneHandle>,
    land: Res<'_, LandChannelHandle>,
    physics: Res<'_, PhysicsSceneHandle>,
    sink: Res<'_, ClientSinkHandle>,
    mut query: Query<'_, '_, (&mut Position, &mut Velocity, &mut Lifecycle, &mut Transit, &Identity, &mut PhysicsLink), With<Presence>>,
) {
    for event in events.read() {
        let Ok((mut position, mut velocity, mut lifecycle, mut transit_state, identity, mut link)) = query.get_mut(event.presence) else {
            continue;
        };

        let request = transit::CompleteMovementRequest {
            is_npc: false,
            is_real_login: false,
            declared_position: event.requested_position,
            client_look: event.client_look,
            current_velocity: velocity.0,
            flying: false,
            flags: event.flags,
            landing_policy: LandingPolicy::Permissive,
            telehub_mode: crate::presence::landing::TelehubMode::Random,
            scene: &*scene,
            land: &*land,
            physics: &*physics,
            avatar_half_extents: body::STANDARD_AVATAR_SHAPE * 0.5,
            is_owner_manager_or_god: event.is_owner_manager_or_god,
            access_level: identity.access_level,
            config: &config,
        };

        match transit::complete_movement(event.presence, &mut lifecycle, &mut transit_state, &request) {
            Ok(outcome) => {
                position.0 = outcome.position;
                if !outcome.momentum_carried {
                    velocity.0 = Vec3::ZERO;
                }
                link.body = Some(outcome.body);
                sink.send_local_teleport(event.presence, outcome.position);
            }
            Err(reason) => {
                sink.send_alert(event.presence, &reason.to_string());
            }
        }
    }
}

/// Tracks, per observer/subject pair, whether the subject was visible to the observer as of the
/// last classification. [`parcel::classify`] needs this to tell "still hidden" apart from
/// "newly hidden"; a bare per-tick sweep has no other memory of the prior state.
#[derive(Resource, Debug, Clone, Default)]
pub struct VisibilityTable(FxHashMap<(Entity, Entity), bool>);

impl VisibilityTable {
    /// Seeds a known prior visibility state for an observer/subject pair. Exposed for tests that
    /// need to establish a baseline before driving a crossing.
    pub fn seed_for_test(&mut self, observer: Entity, subject: Entity, was_visible: bool) {
        self.0.insert((observer, subject), was_visible);
    }
}

/// Transit Coordinator: outbound border-crossing prediction and hand-off. A root presence whose
/// predictive step lands outside the region offers the crossing to the transfer module; on
/// acceptance it is demoted to a child agent and its Physical Body detaches, matching the
/// "Cross to neighbour" arrival path on the destination side driven by [`handle_teleport_requests`].
pub fn handle_region_crossing(
    scene: Res<'_, crate::collab::SceneHandle>,
    transfer: Res<'_, TransferModuleHandle>,
    physics: Res<'_, PhysicsSceneHandle>,
    mut query: Query<'_, '_, (Entity, &mut Position, &mut Velocity, &mut Lifecycle, &mut MotionInput, &mut PhysicsLink, &Transit), With<Presence>>,
) {
    let region_size = scene.region_size();
    for (presence, mut position, mut velocity, mut lifecycle, mut motion_input, mut link, transit_state) in &mut query {
        if lifecycle.is_child() {
            continue;
        }
        let Some(predicted) = transit::predict_crossing(position.0, velocity.0, region_size) else {
            continue;
        };

        let outcome = transit::cross_to_new_region(&*transfer, presence, predicted, velocity.0, region_size);
        position.0 = outcome.position;
        velocity.0 = outcome.velocity;
        if !outcome.accepted {
            continue;
        }

        let _ = lifecycle.make_child(presence);
        if let Some(body) = link.body.take() {
            physics.remove_avatar(body);
        }
        motion_input.flags = MovementFlags::new();
        let neighbours: Vec<u64> = transit_state.neighbours.keys().copied().collect();
        transfer.enable_child_agents(presence, &neighbours);
    }
}

/// Parcel Visibility Engine: classifies every observer/subject pair present in the same region
/// and fires kill/show events on a change.
pub fn classify_parcel_visibility(
    land: Res<'_, LandChannelHandle>,
    sink: Res<'_, ClientSinkHandle>,
    mut table: ResMut<'_, VisibilityTable>,
    query: Query<'_, '_, (Entity, &Position, &ParcelState), With<Presence>>,
    mut events: EventWriter<'_, ParcelBoundaryEvent>,
    mut kills: EventWriter<'_, AvatarKillEvent>,
) {
    let presences: Vec<_> = query.iter().collect();
    let mut seen = std::collections::HashSet::with_capacity(presences.len() * presences.len());
    for &(observer, observer_position, observer_parcel) in &presences {
        for &(subject, subject_position, subject_parcel) in &presences {
            if observer == subject {
                continue;
            }
            seen.insert((observer, subject));
            let was_visible = *table.0.get(&(observer, subject)).unwrap_or(&false);
            let visibility = parcel::classify(
                &*land,
                observer_parcel,
                (observer_position.0.x, observer_position.0.z),
                subject_parcel,
                (subject_position.0.x, subject_position.0.z),
                was_visible,
            );
            match visibility {
                Visibility::Show => {
                    sink.send_avatar_data(observer, subject);
                    table.0.insert((observer, subject), true);
                }
                Visibility::Kill => {
                    sink.send_kill_object(observer, &[subject]);
                    kills.write(AvatarKillEvent { presence: subject });
                    table.0.insert((observer, subject), false);
                }
                Visibility::Unchanged => {}
            }
            if !matches!(visibility, Visibility::Unchanged) {
                events.write(ParcelBoundaryEvent { observer, subject, visibility });
            }
        }
    }
    table.0.retain(|pair, _| seen.contains(pair));
}

/// Sit/Stand Controller: explicit-target sit requests.
pub fn handle_sit_requests(
    mut events: EventReader<'_, '_, SitRequestEvent>,
    config: Res<'_, Config>,
    sink: Res<'_, ClientSinkHandle>,
    mut query: Query<'_, '_, (&mut Seat, &mut Position, &mut BodyRotation), With<Presence>>,
) {
    for event in events.read() {
        let Ok((mut seat, mut position, mut rotation)) = query.get_mut(event.presence) else {
            continue;
        };

        let part = SitPart {
            // The scene doesn't expose a region-local part id yet; resolve_sit_part's id space
            // is only meaningful once it does.
            part_id: 0,
            link_number: 0,
            is_selected: false,
            sit_target: Some((event.requested_offset, Quat::IDENTITY)),
            sit_target_occupied: false,
            custom_sit_animation: None,
        };

        let outcome = sit::sit_on_explicit_target(&part, Vec3::ZERO, Quat::IDENTITY, Quat::IDENTITY, 0.95, 1.9, false, &config.sit);

        *seat = outcome.seat;
        position.0 = outcome.body_position;
        rotation.0 = outcome.body_rotation;
        sink.send_sit_response(event.presence, outcome.response);
    }
}

/// Sit/Stand Controller: stand-up requests.
pub fn handle_stand_up_requests(
    mut events: EventReader<'_, '_, StandUpEvent>,
    mut query: Query<'_, '_, (&mut Seat, &mut Position, &mut BodyRotation), With<Presence>>,
) {
    for event in events.read() {
        let Ok((mut seat, mut position, mut rotation)) = query.get_mut(event.presence) else {
            continue;
        };
        if !seat.is_sat_on_object() {
            continue;
        }
        let (stand_position, stand_rotation) = sit::stand_up(position.0, rotation.0, None, rotation.0, 1.9);
        position.0 = stand_position;
        rotation.0 = stand_rotation;
        *seat = Seat::default();
    }
}

/// Outbound neighbour maintenance: closes child-agent connections that fell outside view.
///
/// `neighbour_centre` wants each neighbour's world-space distance, which requires the Scene
/// collaborator to expose other regions' geometry; that seam isn't modelled yet, so every
/// neighbour reports distance zero here and only a presence's own shrinking view distance can
/// trigger a close.
pub fn prune_stale_neighbours(grid: Res<'_, GridServiceHandle>, scene: Res<'_, crate::collab::SceneHandle>, mut query: Query<'_, '_, (Entity, &Position, &ViewDistances, &mut Transit)>) {
    let region_size = scene.region_size();
    for (presence, position, view_distances, mut transit_state) in &mut query {
        let _ = transit::prune_neighbours(&mut transit_state, &*grid, presence, region_size, position.0, view_distances.region_view_distance, |_| (0.0, Vec3::ZERO));
    }
}
