use std::fmt::{Debug, Display};

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A plane equation `normal · p + offset = 0`, used by the client to clamp an avatar's camera
/// to the surface it is standing or sitting on.
///
/// The wire representation rounds the normal to 2 decimals and the support point (and
/// therefore the offset) to 1 decimal; [`CollisionPlane::from_contact`] performs that rounding so
/// every plane constructed through the normal path is already wire-exact.
#[derive(Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionPlane {
    pub normal: Vec3,
    pub offset: f32,
}

impl CollisionPlane {
    /// The default plane sent when no collider qualifies: `(0, 0, 0, 1)`.
    pub const UNCONSTRAINED: Self = Self {
        normal: Vec3::ZERO,
        offset: 1.0,
    };

    /// Builds a wire-rounded plane from a contact normal and a point on the contact surface.
    /// Negates the contact normal: the client expects the plane to point away from the surface,
    /// toward the avatar.
    #[must_use]
    pub fn from_contact(normal: Vec3, point: Vec3) -> Self {
        let normal = round_to(-normal, 2);
        let point = round_to(point, 1);
        let offset = round_to(Vec3::splat(-normal.dot(point)), 1).x;

        Self { normal, offset }
    }
}

impl Default for CollisionPlane {
    fn default() -> Self {
        Self::UNCONSTRAINED
    }
}

fn round_to(v: Vec3, decimals: i32) -> Vec3 {
    let factor = 10f32.powi(decimals);
    (v * factor).round() / factor
}

impl Debug for CollisionPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Display for CollisionPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{:.2}, {:.2}, {:.2}> · p + {:.1} = 0",
            self.normal.x, self.normal.y, self.normal.z, self.offset
        )
    }
}
