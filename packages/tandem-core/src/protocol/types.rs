//! Replicated data model shared by every device in a session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Relay-assigned device identifier, valid for one connection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device class announced in `hello`.
///
/// Older relays report `web`/`android`/`ios`/`android_tv`; those are folded
/// into the three classes on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    #[serde(alias = "web")]
    Desktop,
    #[serde(alias = "android", alias = "ios")]
    Mobile,
    #[serde(alias = "android_tv")]
    Embedded,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Embedded => "embedded",
        }
    }

    /// Class name understood by relays that only know `web`, `android` and
    /// `ios`.
    pub fn legacy_name(self) -> &'static str {
        match self {
            Self::Desktop => "web",
            Self::Mobile | Self::Embedded => "android",
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" | "web" => Ok(Self::Desktop),
            "mobile" | "android" | "ios" => Ok(Self::Mobile),
            "embedded" | "android_tv" => Ok(Self::Embedded),
            other => Err(format!(
                "unknown device type '{other}' (expected desktop, mobile or embedded)"
            )),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device in the user's session, as broadcast by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub device_type: DeviceType,
    /// Whether this device currently holds the output role.
    #[serde(rename = "is_audio_device", default)]
    pub is_output_device: bool,
    #[serde(default)]
    pub connected_at: u64,
}

/// Track metadata carried inside a playback snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRef {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist_id: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub artists_ids: Vec<String>,
    #[serde(default)]
    pub album_id: String,
    #[serde(default)]
    pub album_title: String,
    /// Track length in seconds; `0` when unknown.
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

impl TrackRef {
    /// A reference carrying only the id, for tracks the catalog cannot resolve.
    pub fn unresolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            artist_id: String::new(),
            artist_name: String::new(),
            artists_ids: Vec::new(),
            album_id: String::new(),
            album_title: String::new(),
            duration: 0.0,
            track_number: None,
            image_id: None,
        }
    }

    /// Duration in seconds, if the track has one.
    pub fn known_duration(&self) -> Option<f64> {
        (self.duration > 0.0).then_some(self.duration)
    }
}

/// Repeat mode for playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "one" => Ok(Self::One),
            "all" => Ok(Self::All),
            other => Err(format!("unknown repeat mode '{other}'")),
        }
    }
}

/// Queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    #[serde(default)]
    pub added_at: u64,
}

impl QueueItem {
    pub fn new(id: impl Into<String>, added_at: u64) -> Self {
        Self {
            id: id.into(),
            added_at,
        }
    }
}

fn default_volume() -> f64 {
    1.0
}

/// The replicated playback value, owned by the output device.
///
/// `timestamp` is the output device's wall clock at capture time and anchors
/// position extrapolation on every other device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    #[serde(default)]
    pub current_track: Option<TrackRef>,
    #[serde(default)]
    pub queue_position: usize,
    pub queue_version: u64,
    /// Playback position in seconds.
    pub position: f64,
    pub is_playing: bool,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: RepeatMode,
    pub timestamp: u64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track: None,
            queue_position: 0,
            queue_version: 0,
            position: 0.0,
            is_playing: false,
            volume: default_volume(),
            muted: false,
            shuffle: false,
            repeat: RepeatMode::Off,
            timestamp: 0,
        }
    }
}

impl PlaybackState {
    /// Duration of the current track, if known.
    pub fn duration(&self) -> Option<f64> {
        self.current_track.as_ref().and_then(TrackRef::known_duration)
    }

    pub fn has_track(&self) -> bool {
        self.current_track.is_some()
    }
}
