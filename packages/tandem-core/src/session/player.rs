//! Authoritative playback state while this device is the output.
//!
//! [`LocalPlayer`] owns the local output adapter on behalf of the engine. It
//! keeps the replicated [`PlaybackState`] and the queue, drives the adapter for
//! each command, and reports what kind of mutation happened so the engine can
//! schedule broadcasts.

use std::sync::Arc;

use rand::Rng;

use super::commands::PlayerCommand;
use super::interpolator::{extrapolate, Anchor};
use super::scheduler::Mutation;
use crate::catalog::TrackCatalog;
use crate::clock::Clock;
use crate::error::{TandemError, TandemResult};
use crate::output::{LocalOutput, OutputResult};
use crate::protocol::{PlaybackState, QueueItem, RepeatMode, TrackRef};
use crate::protocol_constants::PREVIOUS_RESTART_THRESHOLD_SECS;
use crate::utils::{clamp_position, clamp_volume};

pub struct LocalPlayer {
    output: Arc<dyn LocalOutput>,
    catalog: Arc<dyn TrackCatalog>,
    clock: Arc<dyn Clock>,
    /// `position` is anchored at `timestamp`.
    state: PlaybackState,
    queue: Vec<QueueItem>,
}

impl LocalPlayer {
    pub fn new(
        output: Arc<dyn LocalOutput>,
        catalog: Arc<dyn TrackCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            output,
            catalog,
            clock,
            state: PlaybackState::default(),
            queue: Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn has_track(&self) -> bool {
        self.state.has_track()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn queue(&self) -> &[QueueItem] {
        &self.queue
    }

    pub fn queue_version(&self) -> u64 {
        self.state.queue_version
    }

    /// Current position in seconds.
    pub fn position(&self) -> f64 {
        extrapolate(
            &Anchor::from_state(&self.state),
            self.clock.now_millis(),
        )
    }

    /// A complete snapshot taken now.
    pub fn snapshot(&self) -> PlaybackState {
        let mut state = self.state.clone();
        state.position = self.position();
        state.timestamp = self.clock.now_millis();
        state
    }

    /// Increments and returns the queue version. Only queue broadcasts call this.
    pub fn bump_queue_version(&mut self) -> u64 {
        self.state.queue_version += 1;
        self.state.queue_version
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    /// Applies a transport or queue command to the adapter and the state.
    ///
    /// Returns the mutation to broadcast, or `None` when nothing changed.
    ///
    /// # Errors
    ///
    /// Adapter failures and out-of-range queue indices. State is left as it
    /// was before the failing adapter call.
    pub async fn apply(&mut self, command: PlayerCommand) -> TandemResult<Option<Mutation>> {
        let mutation = match command {
            PlayerCommand::Play => self.play().await?,
            PlayerCommand::Pause => self.pause().await?,
            PlayerCommand::TogglePlayPause => {
                if self.state.is_playing {
                    self.pause().await?
                } else {
                    self.play().await?
                }
            }
            PlayerCommand::Seek { position } => self.seek(position).await?,
            PlayerCommand::Next => self.next(false).await?,
            PlayerCommand::Previous => self.previous().await?,
            PlayerCommand::SetVolume { volume } => {
                let volume = clamp_volume(volume);
                self.output.set_volume(volume).await?;
                self.state.volume = volume;
                Some(Mutation::Transport)
            }
            PlayerCommand::SetMuted { muted } => {
                self.output.set_muted(muted).await?;
                self.state.muted = muted;
                Some(Mutation::Transport)
            }
            PlayerCommand::SetShuffle { shuffle } => {
                self.state.shuffle = shuffle;
                Some(Mutation::Transport)
            }
            PlayerCommand::SetRepeat { repeat } => {
                self.state.repeat = repeat;
                Some(Mutation::Transport)
            }
            PlayerCommand::PlayTrack { track_id } => self.play_track(track_id).await?,
            PlayerCommand::LoadQueue {
                track_ids,
                start_index,
            } => self.load_queue(track_ids, start_index).await?,
            PlayerCommand::AddToQueue { track_ids } => {
                if track_ids.is_empty() {
                    None
                } else {
                    let now = self.clock.now_millis();
                    self.queue
                        .extend(track_ids.into_iter().map(|id| QueueItem::new(id, now)));
                    Some(Mutation::Queue)
                }
            }
            PlayerCommand::RemoveFromQueue { index } => self.remove_from_queue(index).await?,
            PlayerCommand::ClearQueue => {
                self.stop_and_reset().await?;
                Some(Mutation::Queue)
            }
            PlayerCommand::SkipTo { index } => {
                self.check_index(index)?;
                self.load_index(index, true).await?;
                Some(Mutation::Transport)
            }
        };
        Ok(mutation)
    }

    async fn play(&mut self) -> TandemResult<Option<Mutation>> {
        if self.state.is_playing {
            return Ok(None);
        }
        if !self.has_track() {
            if self.queue.is_empty() {
                log::debug!("[Player] Play with empty queue, nothing to do");
                return Ok(None);
            }
            let index = self.state.queue_position.min(self.queue.len() - 1);
            self.load_index(index, true).await?;
            return Ok(Some(Mutation::Transport));
        }
        self.output.play().await?;
        self.reanchor(self.state.position);
        self.state.is_playing = true;
        Ok(Some(Mutation::Transport))
    }

    async fn pause(&mut self) -> TandemResult<Option<Mutation>> {
        if !self.state.is_playing {
            return Ok(None);
        }
        self.output.pause().await?;
        let position = self.position();
        self.reanchor(position);
        self.state.is_playing = false;
        Ok(Some(Mutation::Transport))
    }

    async fn seek(&mut self, position: f64) -> TandemResult<Option<Mutation>> {
        if !self.has_track() {
            return Ok(None);
        }
        let position = clamp_position(position, self.state.duration());
        self.output.seek_to(position).await?;
        self.reanchor(position);
        Ok(Some(Mutation::Transport))
    }

    /// Moves to the next entry. `auto` is set when the previous track ended.
    async fn next(&mut self, auto: bool) -> TandemResult<Option<Mutation>> {
        let Some(index) = self.next_index(auto) else {
            return Ok(None);
        };
        let autoplay = auto || self.state.is_playing || !self.has_track();
        self.load_index(index, autoplay).await?;
        Ok(Some(Mutation::Transport))
    }

    async fn previous(&mut self) -> TandemResult<Option<Mutation>> {
        if self.has_track() && self.position() > PREVIOUS_RESTART_THRESHOLD_SECS {
            return self.seek(0.0).await;
        }
        let len = self.queue.len();
        if len == 0 {
            return Ok(None);
        }
        let current = self.state.queue_position.min(len - 1);
        let index = match (current, self.state.repeat) {
            (0, RepeatMode::All) => len - 1,
            (0, _) => return self.seek(0.0).await,
            (i, _) => i - 1,
        };
        let autoplay = self.state.is_playing || !self.has_track();
        self.load_index(index, autoplay).await?;
        Ok(Some(Mutation::Transport))
    }

    async fn play_track(&mut self, track_id: String) -> TandemResult<Option<Mutation>> {
        if let Some(index) = self.queue.iter().position(|item| item.id == track_id) {
            self.load_index(index, true).await?;
            return Ok(Some(Mutation::Transport));
        }
        let insert_at = if self.queue.is_empty() {
            0
        } else {
            (self.state.queue_position + 1).min(self.queue.len())
        };
        let item = QueueItem::new(track_id, self.clock.now_millis());
        self.queue.insert(insert_at, item);
        if let Err(e) = self.load_index(insert_at, true).await {
            self.queue.remove(insert_at);
            return Err(e);
        }
        Ok(Some(Mutation::Queue))
    }

    async fn load_queue(
        &mut self,
        track_ids: Vec<String>,
        start_index: usize,
    ) -> TandemResult<Option<Mutation>> {
        if track_ids.is_empty() {
            self.stop_and_reset().await?;
            return Ok(Some(Mutation::Queue));
        }
        let now = self.clock.now_millis();
        let previous = std::mem::replace(
            &mut self.queue,
            track_ids
                .into_iter()
                .map(|id| QueueItem::new(id, now))
                .collect(),
        );
        let index = start_index.min(self.queue.len() - 1);
        if let Err(e) = self.load_index(index, true).await {
            self.queue = previous;
            return Err(e);
        }
        Ok(Some(Mutation::Queue))
    }

    async fn remove_from_queue(&mut self, index: usize) -> TandemResult<Option<Mutation>> {
        self.check_index(index)?;
        let current = self.state.queue_position;
        self.queue.remove(index);

        if self.queue.is_empty() {
            self.stop_and_reset().await?;
        } else if index < current {
            self.state.queue_position = current - 1;
        } else if index == current && self.has_track() {
            let next = index.min(self.queue.len() - 1);
            let autoplay = self.state.is_playing;
            self.load_index(next, autoplay).await?;
        }
        Ok(Some(Mutation::Queue))
    }

    fn check_index(&self, index: usize) -> TandemResult<()> {
        if index >= self.queue.len() {
            return Err(TandemError::InvalidCommand(format!(
                "queue index {index} out of range (len {})",
                self.queue.len()
            )));
        }
        Ok(())
    }

    fn next_index(&self, auto: bool) -> Option<usize> {
        let len = self.queue.len();
        if len == 0 {
            return None;
        }
        let current = self.state.queue_position.min(len - 1);
        if !self.has_track() {
            return Some(current);
        }
        if auto && self.state.repeat == RepeatMode::One {
            return Some(current);
        }
        if self.state.shuffle && len > 1 {
            // Uniform over the other entries.
            let pick = rand::thread_rng().gen_range(0..len - 1);
            return Some(if pick >= current { pick + 1 } else { pick });
        }
        if current + 1 < len {
            Some(current + 1)
        } else if self.state.repeat == RepeatMode::All {
            Some(0)
        } else {
            None
        }
    }

    async fn resolve(&self, track_id: &str) -> TrackRef {
        match self.catalog.resolve(track_id).await {
            Some(track) => track,
            None => {
                log::warn!("[Player] Track {} not in catalog, playing unresolved", track_id);
                TrackRef::unresolved(track_id)
            }
        }
    }

    async fn load_index(&mut self, index: usize, autoplay: bool) -> TandemResult<()> {
        let track_id = self.queue[index].id.clone();
        let track = self.resolve(&track_id).await;
        self.output.load_track(&track_id, autoplay, None).await?;

        log::info!(
            "[Player] Now on #{} {} ({})",
            index,
            track.id,
            if autoplay { "playing" } else { "paused" }
        );
        self.state.current_track = Some(track);
        self.state.queue_position = index;
        self.state.is_playing = autoplay;
        self.reanchor(0.0);
        Ok(())
    }

    fn reanchor(&mut self, position: f64) {
        self.state.position = position;
        self.state.timestamp = self.clock.now_millis();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Adapter callbacks
    // ─────────────────────────────────────────────────────────────────────

    /// Progress from the adapter corrects the extrapolated position.
    pub fn on_progress(&mut self, position: f64) {
        if self.has_track() {
            let position = clamp_position(position, self.state.duration());
            self.reanchor(position);
        }
    }

    /// Fills in a duration the catalog did not know. Returns whether it changed.
    pub fn on_track_loaded(&mut self, duration: f64) -> bool {
        let Some(track) = self.state.current_track.as_mut() else {
            return false;
        };
        if duration > 0.0 && (track.duration - duration).abs() > f64::EPSILON {
            track.duration = duration;
            return true;
        }
        false
    }

    /// Advances the queue after the current track ended.
    pub async fn on_track_end(&mut self) -> TandemResult<Option<Mutation>> {
        if !self.has_track() {
            return Ok(None);
        }
        if self.state.repeat == RepeatMode::One {
            self.output.seek_to(0.0).await?;
            self.output.play().await?;
            self.state.is_playing = true;
            self.reanchor(0.0);
            return Ok(Some(Mutation::Transport));
        }
        match self.next(true).await? {
            Some(mutation) => Ok(Some(mutation)),
            None => {
                // End of queue: stay on the last entry, paused at the start.
                if let Err(e) = self.output.pause().await {
                    log::warn!("[Player] Failed to pause output at end of queue: {}", e);
                }
                if let Err(e) = self.output.seek_to(0.0).await {
                    log::warn!("[Player] Failed to rewind output at end of queue: {}", e);
                }
                self.state.is_playing = false;
                self.reanchor(0.0);
                Ok(Some(Mutation::Transport))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Role changes
    // ─────────────────────────────────────────────────────────────────────

    /// Pauses audio. Returns whether it was playing.
    pub async fn pause_output(&mut self) -> bool {
        let was_playing = self.state.is_playing;
        if was_playing {
            if let Err(e) = self.pause().await {
                log::warn!("[Player] Failed to pause output: {}", e);
                let position = self.position();
                self.reanchor(position);
                self.state.is_playing = false;
            }
        }
        was_playing
    }

    /// Resumes audio after an aborted hand-off.
    pub async fn resume_output(&mut self) {
        if let Err(e) = self.play().await {
            log::warn!("[Player] Failed to resume output: {}", e);
        }
    }

    /// Applies a received snapshot: load, seek, volume and mute, then play if
    /// the snapshot was playing. Playback only starts once the track is loaded.
    pub async fn apply_snapshot(
        &mut self,
        state: &PlaybackState,
        queue: &[QueueItem],
    ) -> OutputResult<()> {
        self.queue = queue.to_vec();
        let mut next_state = state.clone();
        next_state.is_playing = false;
        next_state.volume = clamp_volume(state.volume);

        if let Some(track) = &state.current_track {
            self.output.load_track(&track.id, false, None).await?;
            let position = clamp_position(state.position, state.duration());
            self.output.seek_to(position).await?;
            next_state.position = position;
        }
        self.output.set_volume(next_state.volume).await?;
        self.output.set_muted(state.muted).await?;
        next_state.timestamp = self.clock.now_millis();
        self.state = next_state;

        if state.is_playing && self.has_track() {
            self.output.play().await?;
            self.state.is_playing = true;
            self.reanchor(self.state.position);
        }
        Ok(())
    }

    /// Stops the adapter and forgets track and queue. Volume settings and the
    /// queue version survive so a later session keeps counting upwards.
    pub async fn stop_and_reset(&mut self) -> OutputResult<()> {
        let result = self.output.stop().await;
        self.state = PlaybackState {
            queue_version: self.state.queue_version,
            volume: self.state.volume,
            muted: self.state.muted,
            shuffle: self.state.shuffle,
            repeat: self.state.repeat,
            timestamp: self.clock.now_millis(),
            ..Default::default()
        };
        self.queue.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::test_fixtures::{sample_catalog, OutputCall, RecordingOutput};

    fn player() -> (LocalPlayer, Arc<RecordingOutput>, Arc<ManualClock>) {
        let output = Arc::new(RecordingOutput::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let player = LocalPlayer::new(output.clone(), sample_catalog(), clock.clone());
        (player, output, clock)
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn load_queue_starts_playing_at_index() {
        let (mut player, output, _) = player();
        let mutation = player
            .apply(PlayerCommand::LoadQueue {
                track_ids: ids(&["t1", "t2", "t3"]),
                start_index: 1,
            })
            .await
            .unwrap();

        assert_eq!(mutation, Some(Mutation::Queue));
        assert!(player.is_playing());
        let state = player.snapshot();
        assert_eq!(state.queue_position, 1);
        assert_eq!(state.current_track.unwrap().id, "t2");
        assert_eq!(
            output.calls(),
            vec![OutputCall::Load {
                track_id: "t2".into(),
                autoplay: true
            }]
        );
    }

    #[tokio::test]
    async fn position_follows_clock_while_playing() {
        let (mut player, _, clock) = player();
        player
            .apply(PlayerCommand::PlayTrack {
                track_id: "t1".into(),
            })
            .await
            .unwrap();
        clock.advance(12_500);
        assert_eq!(player.position(), 12.5);

        player.apply(PlayerCommand::Pause).await.unwrap();
        clock.advance(10_000);
        assert_eq!(player.position(), 12.5);
    }

    #[tokio::test]
    async fn seek_is_clamped_to_duration() {
        let (mut player, output, _) = player();
        player
            .apply(PlayerCommand::PlayTrack {
                track_id: "t1".into(),
            })
            .await
            .unwrap();
        player
            .apply(PlayerCommand::Seek { position: 9_999.0 })
            .await
            .unwrap();
        assert_eq!(player.position(), 200.0);
        assert_eq!(output.calls().last(), Some(&OutputCall::Seek(200.0)));
    }

    #[tokio::test]
    async fn previous_restarts_after_threshold() {
        let (mut player, _, clock) = player();
        player
            .apply(PlayerCommand::LoadQueue {
                track_ids: ids(&["t1", "t2"]),
                start_index: 1,
            })
            .await
            .unwrap();
        clock.advance(5_000);
        player.apply(PlayerCommand::Previous).await.unwrap();
        assert_eq!(player.snapshot().queue_position, 1);
        assert_eq!(player.position(), 0.0);

        clock.advance(1_000);
        player.apply(PlayerCommand::Previous).await.unwrap();
        assert_eq!(player.snapshot().queue_position, 0);
    }

    #[tokio::test]
    async fn track_end_respects_repeat() {
        let (mut player, _, _) = player();
        player
            .apply(PlayerCommand::LoadQueue {
                track_ids: ids(&["t1", "t2"]),
                start_index: 1,
            })
            .await
            .unwrap();

        player.on_track_end().await.unwrap();
        assert!(!player.is_playing());
        assert_eq!(player.snapshot().queue_position, 1);

        player
            .apply(PlayerCommand::SetRepeat {
                repeat: RepeatMode::All,
            })
            .await
            .unwrap();
        player.apply(PlayerCommand::Play).await.unwrap();
        player.on_track_end().await.unwrap();
        assert!(player.is_playing());
        assert_eq!(player.snapshot().queue_position, 0);
    }

    #[tokio::test]
    async fn end_of_queue_pauses_even_if_output_rejects_controls() {
        let (mut player, output, clock) = player();
        player
            .apply(PlayerCommand::LoadQueue {
                track_ids: ids(&["t1", "t2"]),
                start_index: 1,
            })
            .await
            .unwrap();
        clock.advance(30_000);
        output.fail_transport(true);
        output.clear();

        let mutation = player.on_track_end().await.unwrap();
        assert_eq!(mutation, Some(Mutation::Transport));
        assert!(!player.is_playing());
        assert_eq!(player.position(), 0.0);
        assert!(output.calls().is_empty());
    }

    #[tokio::test]
    async fn shuffle_never_repeats_current_entry() {
        let (mut player, _, _) = player();
        player
            .apply(PlayerCommand::LoadQueue {
                track_ids: ids(&["t1", "t2", "t3"]),
                start_index: 0,
            })
            .await
            .unwrap();
        player
            .apply(PlayerCommand::SetShuffle { shuffle: true })
            .await
            .unwrap();
        for _ in 0..20 {
            let before = player.snapshot().queue_position;
            player.apply(PlayerCommand::Next).await.unwrap();
            assert_ne!(player.snapshot().queue_position, before);
        }
    }

    #[tokio::test]
    async fn removing_earlier_entry_keeps_current_track() {
        let (mut player, _, _) = player();
        player
            .apply(PlayerCommand::LoadQueue {
                track_ids: ids(&["t1", "t2", "t3"]),
                start_index: 2,
            })
            .await
            .unwrap();
        player
            .apply(PlayerCommand::RemoveFromQueue { index: 0 })
            .await
            .unwrap();
        let state = player.snapshot();
        assert_eq!(state.queue_position, 1);
        assert_eq!(state.current_track.unwrap().id, "t3");

        let err = player
            .apply(PlayerCommand::RemoveFromQueue { index: 7 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_command");
    }

    #[tokio::test]
    async fn failed_load_leaves_state_untouched() {
        let (mut player, output, _) = player();
        output.fail_loads(true);
        let result = player
            .apply(PlayerCommand::LoadQueue {
                track_ids: ids(&["t1"]),
                start_index: 0,
            })
            .await;
        assert!(result.is_err());
        assert!(!player.has_track());
        assert!(player.queue().is_empty());
    }

    #[tokio::test]
    async fn apply_snapshot_loads_before_play() {
        let (mut player, output, _) = player();
        let state = PlaybackState {
            current_track: Some(crate::test_fixtures::track("t1", 200.0)),
            position: 30.0,
            is_playing: true,
            volume: 0.6,
            queue_version: 4,
            timestamp: 5,
            ..Default::default()
        };
        let queue = vec![QueueItem::new("t1", 1)];
        player.apply_snapshot(&state, &queue).await.unwrap();

        assert_eq!(
            output.calls(),
            vec![
                OutputCall::Load {
                    track_id: "t1".into(),
                    autoplay: false
                },
                OutputCall::Seek(30.0),
                OutputCall::Volume(0.6),
                OutputCall::Muted(false),
                OutputCall::Play,
            ]
        );
        assert!(player.is_playing());
        assert_eq!(player.position(), 30.0);
        assert_eq!(player.queue_version(), 4);
    }

    #[tokio::test]
    async fn stop_and_reset_keeps_queue_version() {
        let (mut player, output, _) = player();
        player
            .apply(PlayerCommand::PlayTrack {
                track_id: "t1".into(),
            })
            .await
            .unwrap();
        player.bump_queue_version();
        player.stop_and_reset().await.unwrap();
        assert!(!player.has_track());
        assert_eq!(player.queue_version(), 1);
        assert_eq!(output.calls().last(), Some(&OutputCall::Stop));
    }
}
