//! Fixed protocol constants shared with the relay and the other devices.
//!
//! Timing values here are the defaults for [`EngineConfig`](crate::EngineConfig);
//! message type names are part of the wire contract and must not change.

// ─────────────────────────────────────────────────────────────────────────────
// Timing
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between heartbeat state broadcasts from the output device (ms).
///
/// Bounds the worst-case drift of a controller's interpolated position.
pub const HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Time a transfer handshake may stay unresolved before it is aborted locally (ms).
pub const TRANSFER_TIMEOUT_MS: u64 = 10_000;

/// Interval between `hello` resends while waiting for `welcome` (ms).
pub const HELLO_RETRY_INTERVAL_MS: u64 = 2000;

/// Interval between interpolation ticks on a controller device (ms).
pub const INTERPOLATION_TICK_MS: u64 = 250;

/// Delay before reconnecting to the relay after the socket closes (ms).
pub const RECONNECT_DELAY_MS: u64 = 2000;

/// Elapsed time after which `previous` restarts the current track
/// instead of stepping back (seconds).
pub const PREVIOUS_RESTART_THRESHOLD_SECS: f64 = 3.0;

// ─────────────────────────────────────────────────────────────────────────────
// Channel Capacities
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the domain event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the local command channel feeding the session actor.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the transport event channel feeding the session actor.
pub const TRANSPORT_CHANNEL_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Wire names of every message the engine sends or understands.
pub mod msg_types {
    // Outbound
    pub const HELLO: &str = "playback.hello";
    pub const REGISTER_AUDIO_DEVICE: &str = "playback.register_audio_device";
    pub const UNREGISTER_AUDIO_DEVICE: &str = "playback.unregister_audio_device";
    pub const RECLAIM_AUDIO_DEVICE: &str = "playback.reclaim_audio_device";
    pub const STATE: &str = "playback.state";
    pub const QUEUE_UPDATE: &str = "playback.queue_update";
    pub const COMMAND: &str = "playback.command";
    pub const REQUEST_QUEUE: &str = "playback.request_queue";
    pub const TRANSFER_READY: &str = "playback.transfer_ready";
    pub const TRANSFER_COMPLETE: &str = "playback.transfer_complete";

    // Inbound
    pub const WELCOME: &str = "playback.welcome";
    pub const QUEUE_SYNC: &str = "playback.queue_sync";
    pub const DEVICE_LIST_CHANGED: &str = "playback.device_list_changed";
    pub const SESSION_ENDED: &str = "playback.session_ended";
    pub const PREPARE_TRANSFER: &str = "playback.prepare_transfer";
    pub const BECOME_AUDIO_DEVICE: &str = "playback.become_audio_device";
    pub const TRANSFER_ABORTED: &str = "playback.transfer_aborted";
    pub const REGISTER_ACK: &str = "playback.register_ack";
    pub const PLAYBACK_ERROR: &str = "playback.error";
    pub const ERROR: &str = "error";
}

/// Remote command name a controller uses to ask for the output role.
pub const REQUEST_TRANSFER_COMMAND: &str = "request_transfer";
