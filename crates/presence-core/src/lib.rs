//! Avatar Presence Core.
//!
//! The core owns the full server-side lifecycle of a user's avatar inside one region: its
//! transition between child and root, its physical body, its movement/sit/teleport state
//! machines, its parcel-visibility rules, its hand-off with neighbouring regions, and the
//! retention of script-issued control takeovers. Everything it depends on beyond that (asset
//! storage, the physics engine, the wire codec, land geometry, group/friends notification,
//! script execution) is consumed through the abstract traits in [`collab`].

pub mod collab;
pub mod common;
pub mod config;
pub mod error;
pub mod events;
pub mod presence;

/// In-memory doubles for [`collab`]'s traits. Kept as a plain (non-`cfg(test)`) module so
/// `tests/` integration files can build a full [`App`] without a live proxy connection.
pub mod test_support;

use bevy::prelude::*;
use tracing::info;

pub use common::AsyncRuntime;
pub use config::Config;
pub use error::{PresenceError, PresenceResult};

/// Installs the presence core into a host [`App`]: loads [`Config`], constructs the shared
/// [`AsyncRuntime`], and composes [`presence::PresencePlugin`].
pub struct PresenceCorePlugin;

impl Plugin for PresenceCorePlugin {
    fn build(&self, app: &mut App) {
        let config = Config::load();
        info!("loaded presence-core configuration");

        app.insert_resource(config)
            .insert_resource(AsyncRuntime::new())
            .add_plugins(presence::PresencePlugin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_installs_config_and_runtime_resources() {
        let mut app = App::new();
        app.add_plugins(PresenceCorePlugin);
        assert!(app.world().contains_resource::<Config>());
        assert!(app.world().contains_resource::<AsyncRuntime>());
    }
}
