//! Startup configuration.
//!
//! Loaded once by [`crate::PresenceCorePlugin::build`] from a TOML file (default
//! `run/config.toml`, overridable with the `PRESENCE_CONFIG` environment variable). A missing
//! file falls back to [`Config::default`] with a warning rather than failing startup, since the
//! core is equally useful embedded in a host that configures everything through
//! [`PresenceCorePlugin`] directly.

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Protocol constants live here as overridable defaults rather than scattered literals.
#[derive(Resource, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub draw_distance: DrawDistanceConfig,
    pub significance: SignificanceConfig,
    pub transit: TransitConfig,
    pub landing: LandingConfig,
    pub reprioritisation: ReprioritisationConfig,
    pub neighbour_push: NeighbourPushConfig,
    pub flying_roll: FlyingRollConfig,
    pub sit: SitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            draw_distance: DrawDistanceConfig::default(),
            significance: SignificanceConfig::default(),
            transit: TransitConfig::default(),
            landing: LandingConfig::default(),
            reprioritisation: ReprioritisationConfig::default(),
            neighbour_push: NeighbourPushConfig::default(),
            flying_roll: FlyingRollConfig::default(),
            sit: SitConfig::default(),
        }
    }
}

impl Config {
    const DEFAULT_PATH: &'static str = "run/config.toml";
    const ENV_OVERRIDE: &'static str = "PRESENCE_CONFIG";

    /// Loads the config from `PRESENCE_CONFIG`, or `run/config.toml` if unset. Falls back to
    /// [`Config::default`] (with a warning) when the file cannot be read or parsed.
    pub fn load() -> Self {
        let path = std::env::var(Self::ENV_OVERRIDE).unwrap_or_else(|_| Self::DEFAULT_PATH.to_string());

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!("failed to parse config at {path}: {e}; using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!("failed to read config at {path}: {e}; using defaults");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DrawDistanceConfig {
    pub min: f32,
    pub max_draw_distance: f32,
    pub max_region_view_distance: f32,
}

impl Default for DrawDistanceConfig {
    fn default() -> Self {
        Self {
            min: 32.0,
            max_draw_distance: 512.0,
            max_region_view_distance: 512.0,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignificanceConfig {
    /// Squared-distance threshold that fires `client_movement`.
    pub move_threshold_sq: f32,
    /// Squared-distance threshold that fires `significant_client_movement`.
    pub significant_threshold_sq: f32,
    /// Rotation tolerance (quaternion dot-product complement) for terse updates.
    pub rotation_tolerance: f32,
    /// Velocity-delta tolerance for terse updates.
    pub velocity_tolerance: f32,
    /// Position-delta tolerance (large jump) for terse updates.
    pub position_tolerance: f32,
    /// Position-delta tolerance used together with the low-speed carve-out.
    pub small_position_tolerance: f32,
    /// Squared-velocity ceiling for the low-speed carve-out.
    pub low_speed_threshold_sq: f32,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            move_threshold_sq: 0.25,
            significant_threshold_sq: 16.0,
            rotation_tolerance: 0.01,
            velocity_tolerance: 0.1,
            position_tolerance: 5.0,
            small_position_tolerance: 0.05,
            low_speed_threshold_sq: 0.1,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransitConfig {
    /// Number of 200ms polls to wait for the peer region's `origin_region_id`.
    pub handshake_attempts: u32,
    pub handshake_poll_millis: u64,
    /// Grace period before the child-update gate reopens after `CompleteMovement`.
    pub child_update_gate_millis: u64,
    /// Squared-distance threshold for pushing neighbour child-agent positions.
    pub child_update_distance_sq: f32,
    pub child_update_period_millis: u64,
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            handshake_attempts: 50,
            handshake_poll_millis: 200,
            child_update_gate_millis: 10_000,
            child_update_distance_sq: 100.0,
            child_update_period_millis: 10_000,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LandingConfig {
    /// Cap on how far above ground the landing ray-cast probe starts.
    pub ray_cast_height_cap: f32,
    pub ray_cast_ground_margin: f32,
    pub max_ray_contacts: u32,
    pub min_surface_gap: f32,
}

impl Default for LandingConfig {
    fn default() -> Self {
        Self {
            ray_cast_height_cap: 600.0,
            ray_cast_ground_margin: 100.0,
            max_ray_contacts: 30,
            min_surface_gap: 50.0,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReprioritisationConfig {
    pub grace_after_arrival_millis: u64,
}

impl Default for ReprioritisationConfig {
    fn default() -> Self {
        Self {
            grace_after_arrival_millis: 15_000,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NeighbourPushConfig {
    pub min_period_millis: u64,
    pub distance_sq: f32,
}

impl Default for NeighbourPushConfig {
    fn default() -> Self {
        Self {
            min_period_millis: 10_000,
            distance_sq: 100.0,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlyingRollConfig {
    pub max_radians: f32,
    pub accumulate_per_tick: f32,
    pub relax_per_tick: f32,
}

impl Default for FlyingRollConfig {
    fn default() -> Self {
        Self {
            max_radians: 1.1,
            accumulate_per_tick: 0.06,
            relax_per_tick: 0.02,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SitConfig {
    /// Vertical adjustment applied to an explicit sit-target position.
    pub vertical_adjustment: f32,
    /// Scale factor for the legacy sit-offset formula.
    pub legacy_offset_scale: f32,
    /// Scale factor for the modern sit-offset formula, multiplied by avatar height.
    pub modern_offset_scale: f32,
    /// Maximum distance from the resolved world position allowed for a no-sit-target request
    /// to fall back to a geometric offset.
    pub max_geometric_fallback_distance: f32,
}

impl Default for SitConfig {
    fn default() -> Self {
        Self {
            vertical_adjustment: 0.4,
            legacy_offset_scale: 0.05,
            modern_offset_scale: 0.026_38,
            max_geometric_fallback_distance: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_known_protocol_constants() {
        let config = Config::default();
        assert_eq!(config.significance.move_threshold_sq, 0.25);
        assert_eq!(config.significance.significant_threshold_sq, 16.0);
        assert_eq!(config.transit.child_update_distance_sq, 100.0);
        assert_eq!(config.transit.handshake_attempts, 50);
        assert_eq!(config.flying_roll.max_radians, 1.1);
    }

    #[test]
    fn load_without_a_file_falls_back_to_defaults() {
        // SAFETY: test-only, single-threaded access to this process-global env var.
        unsafe { std::env::set_var(Config::ENV_OVERRIDE, "/nonexistent/presence-config.toml") };
        let config = Config::load();
        assert_eq!(config, Config::default());
        unsafe { std::env::remove_var(Config::ENV_OVERRIDE) };
    }
}
