//! Cross-region transit payload.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::presence::landing::TeleportFlags;

/// The full state snapshot carried across a region hand-off, built by
/// [`crate::presence::transit::snapshot_for_transit`] and consumed by
/// [`crate::presence::transit::restore_from_transit`] on the destination side.
///
/// Appearance baking, the throttle blob, and animation playback are all driven by collaborators
/// that are out of scope here ([`crate::collab::AttachmentModule`] rezzes attachments, but bakes
/// and throttles nothing); none of the three are carried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitPayload {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
    pub flying: bool,
    pub flags: TeleportFlags,
    pub camera: CameraPayload,
    pub draw_distance: f32,
    pub region_view_distance: f32,
    pub control_flags: u32,
    pub speed_modifier: f32,
    pub always_run: bool,
    pub access_level: u32,
    /// Non-zero iff the avatar was sat on an object at the moment of transit.
    pub parent_part_id: u32,
    pub prev_sit_offset: Vec3,
    pub scripted_controls: Vec<ScriptedControlPayload>,
    pub attachments: AttachmentsPayload,
    pub neighbours: Vec<NeighbourPayload>,
    pub session_id: Uuid,
    pub origin_region_id: Option<u64>,
}

/// Camera position plus its three orthonormal axes, mirroring [`crate::presence::Camera`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraPayload {
    pub position: Vec3,
    pub at_axis: Vec3,
    pub left_axis: Vec3,
    pub up_axis: Vec3,
}

/// One script's control registration, re-keyable on the destination side since an `Entity` only
/// has meaning within the region that minted it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptedControlPayload {
    pub item_id_bits: u64,
    pub ignore_mask: u32,
    pub event_mask: u32,
}

/// One known neighbour region, minus the bearer `session_token`: the destination region must
/// mint its own child-agent session rather than reuse the origin's.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeighbourPayload {
    pub region_handle: u64,
    pub seed_capability_endpoint: String,
    pub size_x: f32,
    pub size_y: f32,
}

/// Attachment state copied out of [`crate::collab::AttachmentModule`] before transit and rezzed
/// back in by the destination region.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AttachmentsPayload {
    pub items: Vec<AttachedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachedItem {
    pub item_id: uuid::Uuid,
    pub attach_point: u8,
    pub position: Vec3,
    pub rotation: Quat,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> TransitPayload {
        TransitPayload {
            position: Vec3::new(1.0, 2.0, 3.0),
            velocity: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            flying: true,
            flags: TeleportFlags::empty(),
            camera: CameraPayload {
                position: Vec3::new(1.0, 3.0, 3.0),
                at_axis: Vec3::X,
                left_axis: Vec3::Z,
                up_axis: Vec3::Y,
            },
            draw_distance: 128.0,
            region_view_distance: 64.0,
            control_flags: 0b1010,
            speed_modifier: 1.0,
            always_run: false,
            access_level: 0,
            parent_part_id: 0,
            prev_sit_offset: Vec3::ZERO,
            scripted_controls: vec![ScriptedControlPayload {
                item_id_bits: 42,
                ignore_mask: 0b01,
                event_mask: 0b11,
            }],
            attachments: AttachmentsPayload {
                items: vec![AttachedItem {
                    item_id: uuid::Uuid::nil(),
                    attach_point: 2,
                    position: Vec3::ZERO,
                    rotation: Quat::IDENTITY,
                }],
            },
            neighbours: vec![NeighbourPayload {
                region_handle: 7,
                seed_capability_endpoint: "http://neighbour".into(),
                size_x: 256.0,
                size_y: 256.0,
            }],
            session_id: Uuid::nil(),
            origin_region_id: Some(7),
        }
    }

    #[test]
    fn payload_round_trips_through_toml() {
        let payload = sample_payload();
        let text = toml::to_string(&payload).expect("serialize");
        let back: TransitPayload = toml::from_str(&text).expect("deserialize");
        assert_eq!(payload, back);
    }

    #[test]
    fn payload_round_trip_reproduces_every_externally_observable_field() {
        let payload = sample_payload();
        let text = toml::to_string(&payload).expect("serialize");
        let back: TransitPayload = toml::from_str(&text).expect("deserialize");

        assert_eq!(back.position, payload.position);
        assert_eq!(back.velocity, payload.velocity);
        assert_eq!(back.rotation, payload.rotation);
        assert_eq!(back.flying, payload.flying);
        assert_eq!(back.flags, payload.flags);
        assert_eq!(back.camera, payload.camera);
        assert_eq!(back.draw_distance, payload.draw_distance);
        assert_eq!(back.region_view_distance, payload.region_view_distance);
        assert_eq!(back.control_flags, payload.control_flags);
        assert_eq!(back.speed_modifier, payload.speed_modifier);
        assert_eq!(back.always_run, payload.always_run);
        assert_eq!(back.access_level, payload.access_level);
        assert_eq!(back.parent_part_id, payload.parent_part_id);
        assert_eq!(back.prev_sit_offset, payload.prev_sit_offset);
        assert_eq!(back.scripted_controls, payload.scripted_controls);
        assert_eq!(back.attachments, payload.attachments);
        assert_eq!(back.neighbours, payload.neighbours);
        assert_eq!(back.session_id, payload.session_id);
        assert_eq!(back.origin_region_id, payload.origin_region_id);
    }
}
