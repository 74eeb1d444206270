//! Position extrapolation between state broadcasts.

use crate::protocol::PlaybackState;
use crate::utils::millis_to_secs;

/// Origin for extrapolation, taken from the last adopted snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub position: f64,
    /// Output device's wall clock when the snapshot was taken (ms).
    pub timestamp: u64,
    pub is_playing: bool,
    pub duration: Option<f64>,
}

impl Anchor {
    pub fn from_state(state: &PlaybackState) -> Self {
        Self {
            position: state.position,
            timestamp: state.timestamp,
            is_playing: state.is_playing,
            duration: state.duration(),
        }
    }
}

/// Estimated position at `now_ms`.
///
/// No correction term: accuracy is bounded by the heartbeat interval. A clock
/// behind the anchor counts as zero elapsed time, so the estimate never moves
/// backwards while the anchor is unchanged.
pub fn extrapolate(anchor: &Anchor, now_ms: u64) -> f64 {
    if !anchor.is_playing {
        return anchor.position;
    }
    let elapsed = millis_to_secs(now_ms.saturating_sub(anchor.timestamp));
    let estimated = anchor.position + elapsed;
    match anchor.duration {
        Some(duration) => estimated.min(duration),
        None => estimated,
    }
}

/// Interpolation state for a controller device.
#[derive(Debug, Default)]
pub struct PositionInterpolator {
    anchor: Option<Anchor>,
    active: bool,
}

impl PositionInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    /// Stops ticking. The anchor is kept so a paused display stays put.
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_anchor(&mut self, anchor: Anchor) {
        self.anchor = Some(anchor);
    }

    pub fn anchor(&self) -> Option<&Anchor> {
        self.anchor.as_ref()
    }

    pub fn clear(&mut self) {
        self.anchor = None;
        self.active = false;
    }

    pub fn estimate(&self, now_ms: u64) -> Option<f64> {
        self.anchor.as_ref().map(|a| extrapolate(a, now_ms))
    }
}
