//! Parcel tracking and the kill/show classification on parcel crossing.

use bevy::prelude::*;

use crate::collab::LandChannel;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ParcelId(pub u32);

/// Tracks the parcel a presence currently occupies, refreshed whenever the avatar crosses a
/// parcel boundary.
#[derive(Component, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ParcelState {
    pub current: Option<ParcelId>,
    /// God/estate-manager override: always see every avatar regardless of `see_avatars`.
    pub god_bypass: bool,
}

impl Default for ParcelState {
    fn default() -> Self {
        Self {
            current: None,
            god_bypass: false,
        }
    }
}

/// The outcome of a parcel-boundary check for one observer/subject pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Subject should appear in the observer's view.
    Show,
    /// Subject should be killed (removed) from the observer's view.
    Kill,
    /// No change: subject was already in the correct state for this observer.
    Unchanged,
}

/// Classifies whether `subject` should be shown to or killed for `observer`, given each one's
/// current parcel and the observer's god/bypass status.
#[must_use]
pub fn classify(
    land: &dyn LandChannel,
    observer: &ParcelState,
    observer_position: (f32, f32),
    subject: &ParcelState,
    subject_position: (f32, f32),
    was_visible: bool,
) -> Visibility {
    if observer.god_bypass {
        return if was_visible { Visibility::Unchanged } else { Visibility::Show };
    }

    let observer_parcel = land.parcel_at(observer_position.0, observer_position.1);
    let subject_parcel = land.parcel_at(subject_position.0, subject_position.1);

    let should_see = subject_parcel.see_avatars || observer_parcel.id == subject_parcel.id;

    match (should_see, was_visible) {
        (true, false) => Visibility::Show,
        (false, true) => Visibility::Kill,
        _ => Visibility::Unchanged,
    }
}
