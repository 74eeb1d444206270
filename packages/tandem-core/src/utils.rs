//! General utilities shared across the library.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Converts a millisecond delta into fractional seconds.
#[must_use]
pub fn millis_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Clamping
// ─────────────────────────────────────────────────────────────────────────────

/// Clamps a volume level into `[0.0, 1.0]`. NaN becomes silence.
#[must_use]
pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

/// Clamps a seek target to the playable range.
///
/// An unknown duration (`None`) only bounds the position from below.
#[must_use]
pub fn clamp_position(position: f64, duration: Option<f64>) -> f64 {
    let position = if position.is_nan() {
        0.0
    } else {
        position.max(0.0)
    };
    match duration {
        Some(d) => position.min(d),
        None => position,
    }
}
