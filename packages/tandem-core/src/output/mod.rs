//! Local output adapter.
//!
//! The sound-producing engine is a collaborator. The session engine drives it
//! through [`LocalOutput`] and hears back from it through [`OutputEvent`]s
//! delivered on an [`OutputEventSink`].

pub mod simulated;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

pub use simulated::SimulatedOutput;

/// Local output adapter failures.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("track unavailable: {0}")]
    TrackUnavailable(String),

    #[error("no track loaded")]
    NotLoaded,

    #[error("output device failed: {0}")]
    Device(String),
}

pub type OutputResult<T> = Result<T, OutputError>;

/// Callbacks from the adapter to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutputEvent {
    /// Playback position advanced.
    Progress { position: f64, fraction: f64 },
    /// A track finished loading and its duration is known.
    TrackLoaded { duration: f64 },
    /// The current track played to its end.
    TrackEnded,
}

/// Sending half handed to the adapter.
pub type OutputEventSink = mpsc::UnboundedSender<OutputEvent>;

/// Receiving half consumed by the session actor.
pub type OutputEventStream = mpsc::UnboundedReceiver<OutputEvent>;

/// Creates the channel an adapter reports through.
pub fn output_event_channel() -> (OutputEventSink, OutputEventStream) {
    mpsc::unbounded_channel()
}

/// Sound output capability.
///
/// Exclusively driven by the session engine while this device holds the
/// output role (or is applying a transfer snapshot).
#[async_trait]
pub trait LocalOutput: Send + Sync {
    /// Loads a track.
    ///
    /// # Arguments
    /// * `track_id` - Catalog id of the track
    /// * `autoplay` - Start playing as soon as the track is ready
    /// * `seek_fraction` - Optional start offset as a fraction of the duration
    async fn load_track(
        &self,
        track_id: &str,
        autoplay: bool,
        seek_fraction: Option<f64>,
    ) -> OutputResult<()>;

    /// Resumes playback of the loaded track.
    async fn play(&self) -> OutputResult<()>;

    /// Pauses playback, keeping the track loaded.
    async fn pause(&self) -> OutputResult<()>;

    /// Stops playback and releases the loaded track.
    async fn stop(&self) -> OutputResult<()>;

    /// Seeks within the loaded track.
    ///
    /// # Arguments
    /// * `position` - Target position in seconds
    async fn seek_to(&self, position: f64) -> OutputResult<()>;

    /// Sets the output volume in `[0.0, 1.0]`.
    async fn set_volume(&self, volume: f64) -> OutputResult<()>;

    async fn set_muted(&self, muted: bool) -> OutputResult<()>;
}
