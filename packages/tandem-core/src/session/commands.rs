//! Transport and queue commands.
//!
//! The same [`PlayerCommand`] value is produced by local UI actions and by
//! decoding a remote `command{command, payload}` message, so the output device
//! applies a remote command exactly as it would a local one.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{TandemError, TandemResult};
use crate::protocol::RepeatMode;

/// Transport and queue controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "snake_case")]
pub enum PlayerCommand {
    Play,
    Pause,
    TogglePlayPause,
    Seek {
        position: f64,
    },
    Next,
    Previous,
    SetVolume {
        volume: f64,
    },
    SetMuted {
        muted: bool,
    },
    SetShuffle {
        shuffle: bool,
    },
    SetRepeat {
        repeat: RepeatMode,
    },
    /// Plays a track, jumping to it if it is already queued.
    PlayTrack {
        track_id: String,
    },
    /// Replaces the queue and starts playing at `start_index`.
    LoadQueue {
        track_ids: Vec<String>,
        #[serde(default)]
        start_index: usize,
    },
    AddToQueue {
        track_ids: Vec<String>,
    },
    RemoveFromQueue {
        index: usize,
    },
    ClearQueue,
    SkipTo {
        index: usize,
    },
}

impl PlayerCommand {
    /// Every command name understood on the wire.
    pub const NAMES: &'static [&'static str] = &[
        "play",
        "pause",
        "toggle_play_pause",
        "seek",
        "next",
        "previous",
        "set_volume",
        "set_muted",
        "set_shuffle",
        "set_repeat",
        "play_track",
        "load_queue",
        "add_to_queue",
        "remove_from_queue",
        "clear_queue",
        "skip_to",
    ];

    /// Decodes a remote `command` message.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::InvalidCommand`] for an unknown name or a payload
    /// that does not fit the command.
    pub fn from_remote(name: &str, payload: &Value) -> TandemResult<Self> {
        if !Self::NAMES.contains(&name) {
            return Err(TandemError::InvalidCommand(format!("unknown command '{name}'")));
        }
        let is_empty = match payload {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        let raw = if is_empty {
            json!({ "command": name })
        } else {
            json!({ "command": name, "payload": payload })
        };
        serde_json::from_value(raw)
            .map_err(|e| TandemError::InvalidCommand(format!("{name}: {e}")))
    }

    /// Encodes the command as `(name, payload)` for a remote `command` message.
    pub fn to_remote(&self) -> (String, Value) {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        let name = value
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let payload = value
            .get("payload")
            .cloned()
            .unwrap_or_else(|| json!({}));
        (name, payload)
    }

    pub fn name(&self) -> String {
        self.to_remote().0
    }

    /// Whether applying this command while idle starts playback.
    pub fn starts_playback(&self) -> bool {
        matches!(
            self,
            Self::Play
                | Self::TogglePlayPause
                | Self::PlayTrack { .. }
                | Self::LoadQueue { .. }
                | Self::SkipTo { .. }
        )
    }
}

/// Anything the embedding application asks the session to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Transport control, applied locally or routed to the output device.
    Player(PlayerCommand),
    /// Ask for the output role.
    BecomeOutput,
    /// Give up the output role.
    ReleaseOutput,
}

impl From<PlayerCommand> for SessionCommand {
    fn from(command: PlayerCommand) -> Self {
        Self::Player(command)
    }
}
