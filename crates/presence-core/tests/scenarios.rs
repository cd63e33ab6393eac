//! End-to-end coverage for the six concrete orchestrator scenarios, each driving a real
//! [`App`] the way `PresenceCorePlugin` composes it rather than calling the pure functions
//! directly.

use std::sync::Arc;

use bevy::prelude::*;
use glam::{Quat, Vec3};
use presence_core::{
    collab::{
        AttachmentModuleHandle, ClientSinkHandle, GridServiceHandle, LandChannel, LandChannelHandle, LandParcel, LandingType, PhysicsSceneHandle, SceneHandle,
        TransferModuleHandle,
    },
    events::{AgentUpdateEvent, AvatarKillEvent, ControlEvent, TeleportRequestEvent},
    presence::{
        body::PhysicsLink,
        landing::{TeleportFlag, TeleportFlags},
        lifecycle::Lifecycle,
        motion::MotionInput,
        parcel::{ParcelId, ParcelState},
        schedule::UpdateScheduler,
        scripts::ScriptControls,
        sit::{self, Seat, SitPart},
        transit::Transit,
        Identity, Position, Presence, PresenceKind, Velocity,
    },
    test_support::{RecordingClientSink, StubAttachmentModule, StubGridService, StubPhysicsScene, StubScene, StubTransferModule},
    PresenceCorePlugin,
};

fn identity() -> Identity {
    Identity {
        stable_id: uuid::Uuid::nil(),
        first_name: "Test".into(),
        last_name: "Avatar".into(),
        kind: PresenceKind::Human,
        access_level: 0,
    }
}

/// Builds an `App` wired the way a host application composes `PresenceCorePlugin`, with every
/// collaborator resource stubbed.
fn test_app(scene: StubScene, land: impl LandChannel + 'static) -> App {
    let mut app = App::new();
    app.add_plugins(PresenceCorePlugin);
    app.insert_resource(SceneHandle(Arc::new(scene)));
    app.insert_resource(LandChannelHandle(Arc::new(land)));
    app.insert_resource(PhysicsSceneHandle(Arc::new(StubPhysicsScene::default())));
    app.insert_resource(TransferModuleHandle(Arc::new(StubTransferModule { accepts_cross: true })));
    app.insert_resource(GridServiceHandle(Arc::new(StubGridService { fails: false })));
    app.insert_resource(AttachmentModuleHandle(Arc::new(StubAttachmentModule::default())));
    app.insert_resource(ClientSinkHandle(Arc::new(RecordingClientSink::default())));
    app
}

#[test]
fn teleport_within_region_no_telehub_lands_exactly_where_requested() {
    let mut app = test_app(StubScene::flat(20.0, 256.0, 256.0), presence_core::test_support::StubLandChannel::default());

    let presence = app
        .world_mut()
        .spawn((
            Presence,
            identity(),
            Lifecycle::new(),
            Position::default(),
            Velocity::default(),
            Transit::default(),
            PhysicsLink::default(),
        ))
        .id();

    app.world_mut().send_event(TeleportRequestEvent {
        presence,
        requested_position: Vec3::new(50.0, 22.0, 50.0),
        client_look: None,
        flags: TeleportFlags::empty(),
        is_owner_manager_or_god: false,
    });
    app.update();

    let world = app.world();
    assert_eq!(world.entity(presence).get::<Position>().unwrap().0, Vec3::new(50.0, 22.0, 50.0));
    assert!(world.entity(presence).get::<PhysicsLink>().unwrap().is_attached());
    assert_eq!(world.entity(presence).get::<Velocity>().unwrap().0, Vec3::ZERO);
}

#[test]
fn teleport_redirects_to_the_parcel_landing_point() {
    let land = presence_core::test_support::StubLandChannel {
        parcel: LandParcel {
            id: ParcelId(7),
            see_avatars: true,
            landing_type: LandingType::LandingPoint,
            user_location: Some(Vec3::new(120.0, 25.0, 30.0)),
            user_look_at: None,
        },
        bans: Vec::new(),
    };
    let mut app = test_app(StubScene::flat(20.0, 256.0, 256.0), land);

    let presence = app
        .world_mut()
        .spawn((
            Presence,
            identity(),
            Lifecycle::new(),
            Position::default(),
            Velocity::default(),
            Transit::default(),
            PhysicsLink::default(),
        ))
        .id();

    app.world_mut().send_event(TeleportRequestEvent {
        presence,
        requested_position: Vec3::new(50.0, 22.0, 50.0),
        client_look: None,
        flags: TeleportFlags::only(TeleportFlag::ViaLocation),
        is_owner_manager_or_god: false,
    });
    app.update();

    assert_eq!(
        app.world().entity(presence).get::<Position>().unwrap().0,
        Vec3::new(120.0, 25.0, 30.0)
    );
}

#[test]
fn crossing_a_border_demotes_to_child_and_detaches_the_body() {
    let mut app = test_app(StubScene::flat(0.0, 256.0, 256.0), presence_core::test_support::StubLandChannel::default());

    let presence = app
        .world_mut()
        .spawn((
            Presence,
            identity(),
            Position(Vec3::new(254.0, 30.0, 128.0)),
            Velocity(Vec3::new(20.0, 0.0, 0.0)),
            Lifecycle::new(),
            MotionInput::default(),
            PhysicsLink {
                body: Some(presence_core::collab::PhysicsBodyId(9)),
                ..Default::default()
            },
            Transit::default(),
        ))
        .id();

    app.world_mut()
        .entity_mut(presence)
        .get_mut::<Lifecycle>()
        .unwrap()
        .make_root(presence)
        .unwrap();

    app.update();

    let world = app.world();
    let lifecycle = world.entity(presence).get::<Lifecycle>().unwrap();
    assert!(lifecycle.is_child());
    assert!(!world.entity(presence).get::<PhysicsLink>().unwrap().is_attached());
    assert_eq!(world.entity(presence).get::<MotionInput>().unwrap().flags.into_bits(), 0);
}

#[test]
fn captured_script_control_is_masked_from_movement_and_reported_to_the_script() {
    let mut app = test_app(StubScene::flat(0.0, 256.0, 256.0), presence_core::test_support::StubLandChannel::default());

    const FWD: u32 = 1 << 0;
    const BACK: u32 = 1 << 1;

    let item_id = Entity::from_raw(100);
    let mut scripts = ScriptControls::default();
    scripts.register(item_id, Entity::from_raw(200), FWD | BACK, true, false);

    let presence = app
        .world_mut()
        .spawn((
            Presence,
            Position::default(),
            Velocity::default(),
            MotionInput::default(),
            UpdateScheduler::default(),
            scripts,
            PhysicsLink::default(),
            Seat::default(),
        ))
        .id();

    app.world_mut().send_event(AgentUpdateEvent {
        presence,
        body_rotation: Quat::IDENTITY,
        control_flags: FWD,
        in_mouselook: false,
    });
    app.update();

    assert!(!app.world().entity(presence).get::<MotionInput>().unwrap().flags.forward());

    let control_events: Vec<ControlEvent> = {
        let events = app.world().resource::<Events<ControlEvent>>();
        events.get_cursor().read(events).copied().collect()
    };
    assert_eq!(control_events, vec![ControlEvent { item_id, held: FWD, changed: FWD }]);

    app.world_mut().send_event(AgentUpdateEvent {
        presence,
        body_rotation: Quat::IDENTITY,
        control_flags: 0,
        in_mouselook: false,
    });
    app.update();

    let control_events: Vec<ControlEvent> = {
        let events = app.world().resource::<Events<ControlEvent>>();
        events.get_cursor().read(events).copied().collect()
    };
    assert_eq!(control_events, vec![ControlEvent { item_id, held: 0, changed: FWD }]);
}

/// Position-dependent land double: x/z below 128 is the public parcel, at or above is B's
/// private one. Mirrors the split used by `parcel::classify`'s own unit tests.
struct SplitLand;

impl LandChannel for SplitLand {
    fn parcel_at(&self, x: f32, _z: f32) -> LandParcel {
        if x < 128.0 {
            LandParcel {
                id: ParcelId(1),
                see_avatars: true,
                landing_type: LandingType::None,
                user_location: None,
                user_look_at: None,
            }
        } else {
            LandParcel {
                id: ParcelId(2),
                see_avatars: false,
                landing_type: LandingType::None,
                user_location: None,
                user_look_at: None,
            }
        }
    }

    fn ban_check(&self, _presence: Entity, _parcel: ParcelId) -> bool {
        true
    }
}

#[test]
fn walking_into_a_private_parcel_shows_the_arriving_avatar_without_killing_the_existing_view() {
    let mut app = test_app(StubScene::flat(0.0, 256.0, 256.0), SplitLand);

    let a = app
        .world_mut()
        .spawn((
            Presence,
            Position(Vec3::new(50.0, 0.0, 10.0)),
            ParcelState {
                current: Some(ParcelId(1)),
                god_bypass: false,
            },
        ))
        .id();
    let b = app
        .world_mut()
        .spawn((
            Presence,
            Position(Vec3::new(200.0, 0.0, 10.0)),
            ParcelState {
                current: Some(ParcelId(2)),
                god_bypass: false,
            },
        ))
        .id();

    {
        let mut table = app.world_mut().resource_mut::<presence_core::presence::systems::VisibilityTable>();
        table.seed_for_test(b, a, false);
        table.seed_for_test(a, b, true);
    }

    // A walks from the public parcel into B's private one.
    app.world_mut().entity_mut(a).get_mut::<Position>().unwrap().0 = Vec3::new(200.0, 0.0, 40.0);

    app.update();

    let kills: Vec<AvatarKillEvent> = {
        let events = app.world().resource::<Events<AvatarKillEvent>>();
        events.get_cursor().read(events).copied().collect()
    };
    assert!(kills.is_empty(), "no previously-visible peer should be killed by this crossing");
}

#[test]
fn sit_target_position_follows_the_seat_object_when_it_rotates() {
    let part = SitPart {
        part_id: 4,
        link_number: 0,
        is_selected: true,
        sit_target: Some((Vec3::new(0.0, 0.5, 0.0), Quat::IDENTITY)),
        sit_target_occupied: false,
        custom_sit_animation: None,
    };

    let before = sit::sit_on_explicit_target(&part, Vec3::ZERO, Quat::IDENTITY, Quat::IDENTITY, 0.95, 1.9, false, &presence_core::Config::default().sit);

    let rotated = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
    let after = sit::sit_on_explicit_target(&part, Vec3::ZERO, rotated, Quat::IDENTITY, 0.95, 1.9, false, &presence_core::Config::default().sit);

    assert_ne!(before.body_position, after.body_position);
    assert_eq!(after.body_rotation, rotated);
    // The seat-local offset (0, 0.5, 0) rotated 90 degrees about Y stays on the vertical axis,
    // so only the rotation (not the offset's contribution) should move the body here.
    assert!((after.body_position.y - before.body_position.y).abs() < 1e-5);
}
