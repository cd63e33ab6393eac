//! Presence-core events.

use bevy::prelude::*;
use glam::{Quat, Vec3};

/// Inbound per-tick client control state, the central entry point the
/// [orchestrator](crate::presence::systems) folds into motion, scheduling, and script dispatch.
#[derive(Event, Debug, Copy, Clone)]
pub struct AgentUpdateEvent {
    pub presence: Entity,
    pub body_rotation: Quat,
    pub control_flags: u32,
    pub in_mouselook: bool,
}

/// One tick's physics contact report for a presence's body.
#[derive(Event, Debug, Clone)]
pub struct ContactReportEvent {
    pub presence: Entity,
    pub contacts: Vec<crate::presence::body::Contact>,
}

/// Inbound teleport/`CompleteMovement` request.
#[derive(Event, Debug, Copy, Clone)]
pub struct TeleportRequestEvent {
    pub presence: Entity,
    pub requested_position: Vec3,
    pub client_look: Option<Vec3>,
    pub flags: crate::presence::landing::TeleportFlags,
    pub is_owner_manager_or_god: bool,
}

#[derive(Event, Debug, Copy, Clone)]
pub struct ClientMovementEvent {
    pub presence: Entity,
    pub position: Vec3,
}

#[derive(Event, Debug, Copy, Clone)]
pub struct SignificantClientMovementEvent {
    pub presence: Entity,
    pub position: Vec3,
}

/// Script control dispatch: `held`/`changed` are control-flag bitmasks.
#[derive(Event, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    pub item_id: Entity,
    pub held: u32,
    pub changed: u32,
}

#[derive(Event, Debug, Copy, Clone)]
pub struct CollisionStartEvent {
    pub presence: Entity,
    pub other: Entity,
    /// `0` means a land collision.
    pub other_local_id: u64,
}

#[derive(Event, Debug, Copy, Clone)]
pub struct CollisionEvent {
    pub presence: Entity,
    pub other: Entity,
    pub other_local_id: u64,
}

#[derive(Event, Debug, Copy, Clone)]
pub struct CollisionEndEvent {
    pub presence: Entity,
    pub other: Entity,
    pub other_local_id: u64,
}

/// One parcel-boundary classification result for a single peer pair.
#[derive(Event, Debug, Copy, Clone)]
pub struct ParcelBoundaryEvent {
    pub observer: Entity,
    pub subject: Entity,
    pub visibility: crate::presence::parcel::Visibility,
}

#[derive(Event, Debug, Copy, Clone)]
pub struct AvatarKillEvent {
    pub presence: Entity,
}

#[derive(Event, Debug, Copy, Clone)]
pub struct SitRequestEvent {
    pub presence: Entity,
    pub target_part: Entity,
    pub requested_offset: Vec3,
}

#[derive(Event, Debug, Copy, Clone)]
pub struct StandUpEvent {
    pub presence: Entity,
}
