//! Track metadata lookup.
//!
//! The engine only needs to turn a track id into a [`TrackRef`] when it starts
//! playing something the queue names. Where metadata comes from is the
//! embedder's business.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::protocol::TrackRef;

/// Resolves track ids to metadata.
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// Looks up a track.
    ///
    /// # Arguments
    /// * `track_id` - Catalog id as carried in queue items
    ///
    /// # Returns
    /// `None` if the catalog does not know the id. The engine then plays the
    /// track with an unresolved reference (unknown duration).
    async fn resolve(&self, track_id: &str) -> Option<TrackRef>;
}

/// In-memory catalog.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    tracks: RwLock<HashMap<String, TrackRef>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracks(tracks: impl IntoIterator<Item = TrackRef>) -> Self {
        let catalog = Self::new();
        for track in tracks {
            catalog.insert(track);
        }
        catalog
    }

    pub fn insert(&self, track: TrackRef) {
        self.tracks.write().insert(track.id.clone(), track);
    }

    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }

    /// Synchronous lookup for adapters that share the catalog.
    pub fn get(&self, track_id: &str) -> Option<TrackRef> {
        self.tracks.read().get(track_id).cloned()
    }
}

#[async_trait]
impl TrackCatalog for StaticCatalog {
    async fn resolve(&self, track_id: &str) -> Option<TrackRef> {
        self.get(track_id)
    }
}
