//! Error taxonomy for the presence core.
//!
//! Callbacks from external collaborators never throw into the core; they are caught at the
//! integration seam and converted into one of these kinds. The only hard failures are lifecycle
//! assertions, which are bugs rather than runtime conditions and therefore panic instead of
//! returning a [`PresenceError`].

use bevy::prelude::Entity;

use crate::presence::lifecycle::LifecycleState;

/// Errors the presence core's public operations can return.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PresenceError {
    /// A lifecycle transition was rejected because it would move the state backward. No state
    /// was mutated.
    #[error("invalid lifecycle transition for {presence:?}: {from:?} -> {to:?}")]
    InvalidTransition {
        presence: Entity,
        from: LifecycleState,
        to: LifecycleState,
    },

    /// `MakeRoot` was called on a presence that is already root. Idempotent no-op.
    #[error("{0:?} is already root")]
    AlreadyRoot(Entity),

    /// `MakeChild` was called on a presence that is already a child. Idempotent no-op.
    #[error("{0:?} is already a child")]
    AlreadyChild(Entity),

    /// The peer region never confirmed `origin_region_id` within the bounded wait. The presence
    /// stays child; the caller decides whether to retry or close.
    #[error("{0:?} timed out waiting for the peer region to confirm the hand-off")]
    PeerHandshakeTimeout(Entity),

    /// Physics reported a non-finite position for this presence.
    /// The core self-heals by restoring the last finite position (or the region centre) and
    /// re-attaching the body.
    #[error("{0:?} received a non-finite position from physics and was recentred")]
    NonFiniteState(Entity),

    /// Physics produced an out-of-bounds callback. An alert is surfaced to the client; this is
    /// not a hard kill.
    #[error("{0:?} experienced a physics fault: {reason}")]
    PhysicsFault { presence: Entity, reason: String },

    /// The peer region refused the hand-off. The presence is reflected back inside the border,
    /// its velocity zeroed, and it remains root.
    #[error("{0:?}'s border crossing was rejected by the destination region")]
    CrossRejected(Entity),

    /// The requested teleport was denied by telehub/landing policy. The client receives an
    /// alert and the teleport is abandoned.
    #[error("{0:?}'s teleport was denied by landing policy: {reason}")]
    LandingDenied { presence: Entity, reason: String },

    /// No suitable sit surface was found. The client receives an alert; no state change occurs.
    #[error("{0:?} could not find a surface to sit on")]
    SitRefused(Entity),

    /// Closing a neighbour's child-agent connection failed. Logged; the neighbour entry is
    /// still removed locally (best-effort close).
    #[error("failed to close the child-agent connection to neighbour {region_handle} for {presence:?}: {reason}")]
    NeighbourCloseFailed {
        presence: Entity,
        region_handle: u64,
        reason: String,
    },
}

pub type PresenceResult<T> = Result<T, PresenceError>;
