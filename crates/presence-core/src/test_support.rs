//! In-memory doubles for the external collaborator traits, used only by the test suite.
//! Build a bare [`bevy::app::App`] with stub resources instead of a live proxy connection.

use std::sync::Mutex;

use bevy::prelude::Entity;
use glam::Vec3;
use presence_geom::Ray;

use crate::collab::{
    AttachmentModule, ClientSink, GridService, LandChannel, LandParcel, LandingType, PhysicsBodyId, PhysicsScene, RayHit, Scene, SitResponse, SitSolution,
    TransferModule, UpdateFlags,
};
use crate::presence::{landing::SpawnPoint, parcel::ParcelId, payload::AttachmentsPayload};

/// A flat-ground [`Scene`] double with a configurable region size and no ray-cast hits by
/// default.
pub struct StubScene {
    ground: f32,
    size_x: f32,
    size_y: f32,
    telehub: Option<Vec<SpawnPoint>>,
    direct_teleport_allowed: bool,
    hits: Vec<RayHit>,
}

impl StubScene {
    #[must_use]
    pub fn flat(ground: f32, size_x: f32, size_y: f32) -> Self {
        Self {
            ground,
            size_x,
            size_y,
            telehub: None,
            direct_teleport_allowed: true,
            hits: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_telehub(mut self, points: Vec<SpawnPoint>) -> Self {
        self.telehub = Some(points);
        self
    }

    #[must_use]
    pub fn with_direct_teleport_allowed(mut self, allowed: bool) -> Self {
        self.direct_teleport_allowed = allowed;
        self
    }

    #[must_use]
    pub fn with_hits(mut self, hits: Vec<RayHit>) -> Self {
        self.hits = hits;
        self
    }
}

impl Scene for StubScene {
    fn ground_height(&self, _x: f32, _z: f32) -> f32 {
        self.ground
    }

    fn ray_cast(&self, _ray: Ray, max_hits: u32) -> Vec<RayHit> {
        self.hits.iter().take(max_hits as usize).copied().collect()
    }

    fn region_size(&self) -> (f32, f32) {
        (self.size_x, self.size_y)
    }

    fn telehub_spawn_points(&self) -> Option<Vec<SpawnPoint>> {
        self.telehub.clone()
    }

    fn direct_teleport_allowed(&self) -> bool {
        self.direct_teleport_allowed
    }
}

/// A [`PhysicsScene`] double that always declines `sit_on_surface` unless configured otherwise.
#[derive(Default)]
pub struct StubPhysicsScene {
    pub sit_solution: Option<SitSolution>,
    calls: Mutex<Vec<String>>,
}

impl StubPhysicsScene {
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PhysicsScene for StubPhysicsScene {
    fn add_avatar(&self, _entity: Entity, _half_extents: Vec3, _feet_offset: f32, _flying: bool) -> PhysicsBodyId {
        self.calls.lock().unwrap().push("add_avatar".into());
        PhysicsBodyId(1)
    }

    fn remove_avatar(&self, _body: PhysicsBodyId) {
        self.calls.lock().unwrap().push("remove_avatar".into());
    }

    fn set_target_velocity(&self, _body: PhysicsBodyId, _velocity: Vec3) {
        self.calls.lock().unwrap().push("set_target_velocity".into());
    }

    fn set_momentum(&self, _body: PhysicsBodyId, _momentum: Vec3) {
        self.calls.lock().unwrap().push("set_momentum".into());
    }

    fn sit_on_surface(&self, _hit_point: Vec3) -> Option<SitSolution> {
        self.sit_solution
    }
}

/// A [`ClientSink`] double recording every call for assertion.
#[derive(Default)]
pub struct RecordingClientSink {
    calls: Mutex<Vec<String>>,
}

impl RecordingClientSink {
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ClientSink for RecordingClientSink {
    fn send_avatar_data(&self, _to: Entity, _of: Entity) {
        self.calls.lock().unwrap().push("send_avatar_data".into());
    }

    fn send_appearance(&self, _to: Entity, _of: Entity) {
        self.calls.lock().unwrap().push("send_appearance".into());
    }

    fn send_animations(&self, _to: Entity, _of: Entity) {
        self.calls.lock().unwrap().push("send_animations".into());
    }

    fn send_entity_update(&self, _to: Entity, _of: Entity, _flags: UpdateFlags) {
        self.calls.lock().unwrap().push("send_entity_update".into());
    }

    fn send_sit_response(&self, _to: Entity, _response: SitResponse) {
        self.calls.lock().unwrap().push("send_sit_response".into());
    }

    fn send_kill_object(&self, _to: Entity, _local_ids: &[Entity]) {
        self.calls.lock().unwrap().push("send_kill_object".into());
    }

    fn send_alert(&self, _to: Entity, _message: &str) {
        self.calls.lock().unwrap().push("send_alert".into());
    }

    fn send_camera_constraint(&self, _to: Entity, _plane: presence_geom::CollisionPlane) {
        self.calls.lock().unwrap().push("send_camera_constraint".into());
    }

    fn send_local_teleport(&self, _to: Entity, _position: Vec3) {
        self.calls.lock().unwrap().push("send_local_teleport".into());
    }

    fn send_take_controls(&self, _to: Entity, _controls: u32, _pass_to_agent: bool) {
        self.calls.lock().unwrap().push("send_take_controls".into());
    }

    fn send_health(&self, _to: Entity, _health: f32) {
        self.calls.lock().unwrap().push("send_health".into());
    }
}

/// A [`TransferModule`] double whose `cross_agent` outcome is configurable.
pub struct StubTransferModule {
    pub accepts_cross: bool,
}

impl TransferModule for StubTransferModule {
    fn enable_child_agents(&self, _presence: Entity, _neighbours: &[u64]) {}

    fn cross_agent(&self, _presence: Entity, _direction: Vec3) -> bool {
        self.accepts_cross
    }

    fn release_agent(&self, _callback_uri: &str) {}
}

/// A [`GridService`] double that always succeeds unless configured to fail.
pub struct StubGridService {
    pub fails: bool,
}

impl GridService for StubGridService {
    fn close_child_agent(&self, _region_handle: u64, _session_token: &str) -> anyhow::Result<()> {
        if self.fails {
            Err(anyhow::anyhow!("connection refused"))
        } else {
            Ok(())
        }
    }
}

/// An [`AttachmentModule`] double holding a fixed payload.
#[derive(Default)]
pub struct StubAttachmentModule {
    pub payload: AttachmentsPayload,
}

impl AttachmentModule for StubAttachmentModule {
    fn rez(&self, _presence: Entity, _payload: &AttachmentsPayload) {}

    fn delete_all(&self, _presence: Entity) {}

    fn copy_to_transit(&self, _presence: Entity) -> AttachmentsPayload {
        self.payload.clone()
    }
}

/// A [`LandChannel`] double with one parcel covering the whole region by default.
pub struct StubLandChannel {
    pub parcel: LandParcel,
    pub bans: Vec<ParcelId>,
}

impl Default for StubLandChannel {
    fn default() -> Self {
        Self {
            parcel: LandParcel {
                id: ParcelId(0),
                see_avatars: true,
                landing_type: LandingType::None,
                user_location: None,
                user_look_at: None,
            },
            bans: Vec::new(),
        }
    }
}

impl LandChannel for StubLandChannel {
    fn parcel_at(&self, _x: f32, _z: f32) -> LandParcel {
        self.parcel
    }

    fn ban_check(&self, _presence: Entity, parcel: ParcelId) -> bool {
        !self.bans.contains(&parcel)
    }
}
