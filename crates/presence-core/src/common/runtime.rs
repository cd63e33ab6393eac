//! See [`AsyncRuntime`].

use std::sync::Arc;

use bevy::prelude::*;
use derive_more::{Deref, DerefMut};

/// Wrapper around [`tokio::runtime::Runtime`], used for fire-and-forget background work:
/// reprioritisation, neighbour position pushes, and neighbour-close requests.
#[derive(Resource, Deref, DerefMut, Clone)]
pub struct AsyncRuntime {
    runtime: Arc<tokio::runtime::Runtime>,
}

impl AsyncRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self {
            runtime: Arc::new(
                tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build the presence core's tokio runtime"),
            ),
        }
    }
}

impl Default for AsyncRuntime {
    fn default() -> Self {
        Self::new()
    }
}
