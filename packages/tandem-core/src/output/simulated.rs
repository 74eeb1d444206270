//! Clock-driven output adapter that plays nothing.
//!
//! Tracks position against `tokio::time::Instant`, reports progress once per
//! second and signals the end of a track when its catalog duration elapses.
//! Used by the headless device binary and by paused-time tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{LocalOutput, OutputError, OutputEvent, OutputEventSink, OutputResult};
use crate::catalog::TrackCatalog;
use crate::utils::{clamp_position, clamp_volume};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Transport {
    track_id: Option<String>,
    duration: Option<f64>,
    /// Position at `started_at` (or the frozen position while paused).
    base_position: f64,
    started_at: Option<Instant>,
    volume: f64,
    muted: bool,
}

impl Transport {
    fn position(&self) -> f64 {
        let elapsed = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        clamp_position(self.base_position + elapsed, self.duration)
    }

    fn freeze(&mut self) {
        self.base_position = self.position();
        self.started_at = None;
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Simulated output device.
pub struct SimulatedOutput {
    catalog: Arc<dyn TrackCatalog>,
    events: OutputEventSink,
    transport: Mutex<Transport>,
}

impl SimulatedOutput {
    pub fn new(catalog: Arc<dyn TrackCatalog>, events: OutputEventSink) -> Self {
        Self {
            catalog,
            events,
            transport: Mutex::new(Transport {
                volume: 1.0,
                ..Default::default()
            }),
        }
    }

    /// Current position in seconds.
    pub fn position(&self) -> f64 {
        self.transport.lock().position()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.lock().is_playing()
    }

    pub fn loaded_track(&self) -> Option<String> {
        self.transport.lock().track_id.clone()
    }

    pub fn volume(&self) -> (f64, bool) {
        let transport = self.transport.lock();
        (transport.volume, transport.muted)
    }

    fn emit(&self, event: OutputEvent) {
        // The receiver only disappears when the session is shutting down.
        let _ = self.events.send(event);
    }

    /// Runs the progress ticker until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("[Output] Simulated output ticker stopped");
                    break;
                }
                _ = ticker.tick() => self.tick(),
            }
        }
    }

    fn tick(&self) {
        let mut transport = self.transport.lock();
        if !transport.is_playing() {
            return;
        }
        let position = transport.position();
        let fraction = transport
            .duration
            .map(|d| (position / d).clamp(0.0, 1.0))
            .unwrap_or(0.0);

        let ended = transport.duration.is_some_and(|d| position >= d);
        if ended {
            transport.freeze();
        }
        drop(transport);

        self.emit(OutputEvent::Progress { position, fraction });
        if ended {
            log::debug!("[Output] Track ended at {position:.1}s");
            self.emit(OutputEvent::TrackEnded);
        }
    }
}

#[async_trait]
impl LocalOutput for SimulatedOutput {
    async fn load_track(
        &self,
        track_id: &str,
        autoplay: bool,
        seek_fraction: Option<f64>,
    ) -> OutputResult<()> {
        let track = self
            .catalog
            .resolve(track_id)
            .await
            .ok_or_else(|| OutputError::TrackUnavailable(track_id.to_string()))?;
        let duration = track.known_duration();
        let start = match (seek_fraction, duration) {
            (Some(fraction), Some(d)) => clamp_position(fraction * d, Some(d)),
            _ => 0.0,
        };

        {
            let mut transport = self.transport.lock();
            transport.track_id = Some(track.id.clone());
            transport.duration = duration;
            transport.base_position = start;
            transport.started_at = autoplay.then(Instant::now);
        }

        log::info!(
            "[Output] Loaded {} (duration={:?}, autoplay={})",
            track.id,
            duration,
            autoplay
        );
        if let Some(d) = duration {
            self.emit(OutputEvent::TrackLoaded { duration: d });
        }
        Ok(())
    }

    async fn play(&self) -> OutputResult<()> {
        let mut transport = self.transport.lock();
        if transport.track_id.is_none() {
            return Err(OutputError::NotLoaded);
        }
        if !transport.is_playing() {
            transport.started_at = Some(Instant::now());
        }
        Ok(())
    }

    async fn pause(&self) -> OutputResult<()> {
        let mut transport = self.transport.lock();
        if transport.is_playing() {
            transport.freeze();
        }
        Ok(())
    }

    async fn stop(&self) -> OutputResult<()> {
        let mut transport = self.transport.lock();
        transport.track_id = None;
        transport.duration = None;
        transport.base_position = 0.0;
        transport.started_at = None;
        Ok(())
    }

    async fn seek_to(&self, position: f64) -> OutputResult<()> {
        let mut transport = self.transport.lock();
        if transport.track_id.is_none() {
            return Err(OutputError::NotLoaded);
        }
        transport.base_position = clamp_position(position, transport.duration);
        if transport.is_playing() {
            transport.started_at = Some(Instant::now());
        }
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> OutputResult<()> {
        self.transport.lock().volume = clamp_volume(volume);
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> OutputResult<()> {
        self.transport.lock().muted = muted;
        Ok(())
    }
}
