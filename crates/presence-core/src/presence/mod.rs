//! The Presence entity and its components.
//!
//! Broken up into small single-purpose components rather than one monolithic struct, so systems
//! can borrow only the slice of state they touch.

pub mod body;
pub mod landing;
pub mod lifecycle;
pub mod motion;
pub mod parcel;
pub mod payload;
pub mod schedule;
pub mod scripts;
pub mod sit;
pub mod systems;
pub mod transit;

use bevy::prelude::*;
use glam::{Quat, Vec3};
use uuid::Uuid;

/// Marker component for the presence entity itself.
#[derive(Component, Debug, Copy, Clone)]
pub struct Presence;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresenceKind {
    Human,
    NonPlayerCharacter,
}

/// Identity fields.
#[derive(Component, Debug, Clone)]
pub struct Identity {
    pub stable_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub kind: PresenceKind,
    /// 0 = normal, >= 200 = god.
    pub access_level: u32,
}

impl Identity {
    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.access_level >= 200
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// World or region-relative absolute position.
#[derive(Component, Debug, Copy, Clone, PartialEq, Default)]
pub struct Position(pub Vec3);

/// Body rotation: world when standing, relative to the seat when sitting.
#[derive(Component, Debug, Copy, Clone, PartialEq)]
pub struct BodyRotation(pub Quat);

impl Default for BodyRotation {
    fn default() -> Self {
        Self(Quat::IDENTITY)
    }
}

#[derive(Component, Debug, Copy, Clone, PartialEq, Default)]
pub struct Velocity(pub Vec3);

#[derive(Component, Debug, Copy, Clone, PartialEq, Default)]
pub struct AngularVelocity(pub Vec3);

/// Camera position plus three orthonormal axes.
#[derive(Component, Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub at_axis: Vec3,
    pub left_axis: Vec3,
    pub up_axis: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            at_axis: Vec3::X,
            left_axis: Vec3::Z,
            up_axis: Vec3::Y,
        }
    }
}

/// Draw distance and region-view distance, each clamped `32..= max`.
#[derive(Component, Debug, Copy, Clone, PartialEq)]
pub struct ViewDistances {
    pub draw_distance: f32,
    pub region_view_distance: f32,
}

impl ViewDistances {
    #[must_use]
    pub fn new(requested_draw: f32, requested_region: f32, config: &crate::config::DrawDistanceConfig) -> Self {
        Self {
            draw_distance: requested_draw.clamp(config.min, config.max_draw_distance),
            region_view_distance: requested_region.clamp(config.min, config.max_region_view_distance),
        }
    }
}

/// All components an entity needs to represent a Presence.
#[derive(Bundle)]
pub struct PresenceBundle {
    pub marker: Presence,
    pub identity: Identity,
    pub lifecycle: lifecycle::Lifecycle,
    pub position: Position,
    pub rotation: BodyRotation,
    pub velocity: Velocity,
    pub angular_velocity: AngularVelocity,
    pub camera: Camera,
    pub view_distances: ViewDistances,
    pub physics: body::PhysicsLink,
    pub health: body::Health,
    pub seat: sit::Seat,
    pub parcel: parcel::ParcelState,
    pub transit: transit::Transit,
    pub motion: motion::MotionInput,
    pub scripts: scripts::ScriptControls,
    pub scheduler: schedule::UpdateScheduler,
}

/// Registers the events every presence sub-module can emit. Systems are wired by the host
/// application against the collaborator traits in [`crate::collab`].
pub struct PresencePlugin;

impl Plugin for PresencePlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<crate::events::ClientMovementEvent>()
            .add_event::<crate::events::SignificantClientMovementEvent>()
            .add_event::<crate::events::ControlEvent>()
            .add_event::<crate::events::CollisionStartEvent>()
            .add_event::<crate::events::CollisionEvent>()
            .add_event::<crate::events::CollisionEndEvent>()
            .add_event::<crate::events::ParcelBoundaryEvent>()
            .add_event::<crate::events::AvatarKillEvent>()
            .add_event::<crate::events::SitRequestEvent>()
            .add_event::<crate::events::StandUpEvent>()
            .add_event::<crate::events::AgentUpdateEvent>()
            .add_event::<crate::events::ContactReportEvent>()
            .add_event::<crate::events::TeleportRequestEvent>()
            .init_resource::<systems::SimClock>()
            .init_resource::<systems::VisibilityTable>()
            .add_systems(
                Update,
                (
                    systems::advance_clock,
                    systems::handle_agent_update,
                    systems::handle_contact_reports,
                    systems::regenerate_health,
                    systems::handle_teleport_requests,
                ),
            )
            .add_systems(
                Update,
                (
                    systems::handle_region_crossing,
                    systems::classify_parcel_visibility,
                    systems::handle_sit_requests,
                    systems::handle_stand_up_requests,
                    systems::prune_stale_neighbours,
                ),
            );
    }
}
