//! External collaborators.
//!
//! Everything in this module is a seam, not an implementation: asset storage, inventory and
//! appearance, the physics engine, the wire codec, parcel/land geometry, group/friends
//! notification, and script execution are explicitly out of scope and are consumed here as
//! abstract traits. Production wiring of these traits to a concrete scene, physics engine, and
//! network layer lives outside this crate; [`crate::test_support`] ships a minimal double of each
//! for the test suite, building a bare [`bevy::app::App`] with stub resources instead of a live
//! proxy connection.

use std::sync::Arc;

use bevy::prelude::{Entity, Resource};
use glam::Vec3;
use presence_geom::Ray;

use crate::presence::{
    landing::{SpawnPoint, TeleportFlags},
    parcel::ParcelId,
    payload::AttachmentsPayload,
};

/// A ground-height / ray-cast / part-lookup collaborator.
pub trait Scene: Send + Sync {
    /// Ground height at `(x, z)`, used to raise a landing position above the surface.
    fn ground_height(&self, x: f32, z: f32) -> f32;

    /// Casts a ray through the scene, returning ordered hits (closest first). Used for the
    /// landing probe and the camera-collision probe.
    fn ray_cast(&self, ray: Ray, max_hits: u32) -> Vec<RayHit>;

    /// The width/length of the region along each horizontal axis, in metres.
    fn region_size(&self) -> (f32, f32);

    /// All telehub spawn points configured for this region, if a telehub object exists.
    fn telehub_spawn_points(&self) -> Option<Vec<SpawnPoint>>;

    /// Whether direct (non-telehub) teleport is permitted by estate settings.
    fn direct_teleport_allowed(&self) -> bool;
}

/// One ray-cast hit.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub is_opaque: bool,
    pub is_volume_detect: bool,
    pub character_feet: bool,
}

/// The physics engine, consumed as an abstract capability.
pub trait PhysicsScene: Send + Sync {
    /// Adds an avatar body with the given half-extents, returning a handle. `flying` selects
    /// the initial movement mode.
    fn add_avatar(&self, entity: Entity, half_extents: Vec3, feet_offset: f32, flying: bool) -> PhysicsBodyId;

    fn remove_avatar(&self, body: PhysicsBodyId);

    fn set_target_velocity(&self, body: PhysicsBodyId, velocity: Vec3);

    fn set_momentum(&self, body: PhysicsBodyId, momentum: Vec3);

    /// Asks physics to solve a "sit on surface" placement at the given hit point. `None` means
    /// physics declined and the caller should fall back to a geometric offset.
    fn sit_on_surface(&self, hit_point: Vec3) -> Option<SitSolution>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PhysicsBodyId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SitSolution {
    pub position: Vec3,
    pub rotation: glam::Quat,
}

/// The bitmask of fields included in an outbound entity update.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct UpdateFlags {
    pub position: bool,
    pub rotation: bool,
    pub velocity: bool,
    pub acceleration: bool,
    pub angular_velocity: bool,
    pub full_update: bool,
}

/// Everything the client protocol codec exposes to the core. The codec
/// itself is out of scope; this is a pure message sink.
pub trait ClientSink: Send + Sync {
    fn send_avatar_data(&self, to: Entity, of: Entity);
    fn send_appearance(&self, to: Entity, of: Entity);
    fn send_animations(&self, to: Entity, of: Entity);
    fn send_entity_update(&self, to: Entity, of: Entity, flags: UpdateFlags);
    fn send_sit_response(&self, to: Entity, response: SitResponse);
    fn send_kill_object(&self, to: Entity, local_ids: &[Entity]);
    fn send_alert(&self, to: Entity, message: &str);
    fn send_camera_constraint(&self, to: Entity, plane: presence_geom::CollisionPlane);
    fn send_local_teleport(&self, to: Entity, position: Vec3);
    fn send_take_controls(&self, to: Entity, controls: u32, pass_to_agent: bool);
    fn send_health(&self, to: Entity, health: f32);
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SitResponse {
    pub offset: Vec3,
    pub orientation: glam::Quat,
    pub camera_at_offset: Vec3,
    pub camera_eye_offset: Vec3,
    pub force_mouselook: bool,
}

/// Cross-region hand-off.
pub trait TransferModule: Send + Sync {
    fn enable_child_agents(&self, presence: Entity, neighbours: &[u64]);

    /// Attempts to move `presence` to the region across the border in `direction`. Returns
    /// `true` if the destination region accepted the hand-off.
    fn cross_agent(&self, presence: Entity, direction: Vec3) -> bool;

    fn release_agent(&self, callback_uri: &str);
}

/// Closing a neighbour's child-agent connection.
pub trait GridService: Send + Sync {
    fn close_child_agent(&self, region_handle: u64, session_token: &str) -> anyhow::Result<()>;
}

/// Rez/delete/copy of attachments during transit.
pub trait AttachmentModule: Send + Sync {
    fn rez(&self, presence: Entity, payload: &AttachmentsPayload);
    fn delete_all(&self, presence: Entity);
    fn copy_to_transit(&self, presence: Entity) -> AttachmentsPayload;
}

/// Parcel/land geometry queries.
pub trait LandChannel: Send + Sync {
    fn parcel_at(&self, x: f32, z: f32) -> LandParcel;
    fn ban_check(&self, presence: Entity, parcel: ParcelId) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandParcel {
    pub id: ParcelId,
    pub see_avatars: bool,
    pub landing_type: LandingType,
    pub user_location: Option<Vec3>,
    pub user_look_at: Option<Vec3>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingType {
    None,
    LandingPoint,
    Direct,
}

/// Taken together, `TeleportFlags` tells a [`LandChannel`]/telehub policy which arrival path
/// produced this request.
pub fn arrival_is_redirectable(flags: TeleportFlags) -> bool {
    use crate::presence::landing::TeleportFlag::{ViaHGLogin, ViaLandmark, ViaLocation, ViaLogin, ViaLure};
    flags.contains(ViaLogin)
        || flags.contains(ViaLure)
        || flags.contains(ViaLocation)
        || flags.contains(ViaLandmark)
        || flags.contains(ViaHGLogin)
}

/// Bevy resources are required to be concrete, `Sized` types, so each collaborator trait object
/// is wrapped in a thin `Resource` newtype the host application inserts once at startup. Cloning
/// is cheap: it clones the `Arc`, not the collaborator behind it.
macro_rules! collaborator_resource {
    ($name:ident, $trait:ident) => {
        #[derive(Resource, Clone)]
        pub struct $name(pub Arc<dyn $trait>);

        impl std::ops::Deref for $name {
            type Target = dyn $trait;

            fn deref(&self) -> &Self::Target {
                &*self.0
            }
        }
    };
}

collaborator_resource!(SceneHandle, Scene);
collaborator_resource!(PhysicsSceneHandle, PhysicsScene);
collaborator_resource!(ClientSinkHandle, ClientSink);
collaborator_resource!(TransferModuleHandle, TransferModule);
collaborator_resource!(GridServiceHandle, GridService);
collaborator_resource!(AttachmentModuleHandle, AttachmentModule);
collaborator_resource!(LandChannelHandle, LandChannel);
