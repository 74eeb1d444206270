//! Wire protocol spoken between a device and the relay.

pub mod messages;
pub mod types;

use thiserror::Error;

pub use messages::{
    CommandPayload, DeviceChange, DeviceListPayload, Envelope, ErrorPayload, HelloPayload,
    Inbound, Outbound, PrepareTransferPayload, QueuePayload, RegisterAckPayload, SessionEndedPayload,
    SessionInfo, TransferAbortedPayload, TransferIdPayload, TransferSnapshotPayload,
    WelcomePayload,
};
pub use types::{Device, DeviceId, DeviceType, PlaybackState, QueueItem, RepeatMode, TrackRef};

/// Frame decoding and encoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    InvalidFrame(#[source] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed {msg_type} payload: {source}")]
    MalformedPayload {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {msg_type}: {source}")]
    Encode {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },
}
