//! Relay wire messages.
//!
//! Every frame is a JSON text frame `{"type": "playback.<name>", "payload": {...}}`.
//! Decoding goes through [`Envelope`] first so an unknown `type` and a
//! malformed payload can be told apart and dropped with the right log line.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{Device, DeviceId, DeviceType, PlaybackState, QueueItem};
use super::ProtocolError;
use crate::protocol_constants::msg_types;

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Raw frame before payload dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    fn new(msg_type: &str, payload: Value) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            payload,
        }
    }

    fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        // Payload-less frames may omit the field or send null.
        let payload = if self.payload.is_null() {
            Value::Object(Default::default())
        } else {
            self.payload.clone()
        };
        serde_json::from_value(payload).map_err(|source| ProtocolError::MalformedPayload {
            msg_type: self.msg_type.clone(),
            source,
        })
    }
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// `device_type` is a plain string so the class can be announced under its
/// legacy name to older relays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    pub device_name: String,
    pub device_type: String,
}

impl HelloPayload {
    pub fn new(device_name: impl Into<String>, device_type: DeviceType, legacy: bool) -> Self {
        let device_type = if legacy {
            device_type.legacy_name()
        } else {
            device_type.as_str()
        };
        Self {
            device_name: device_name.into(),
            device_type: device_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePayload {
    pub queue: Vec<QueueItem>,
    pub queue_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub command: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device_id: Option<DeviceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSnapshotPayload {
    pub transfer_id: String,
    pub state: PlaybackState,
    pub queue: Vec<QueueItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferIdPayload {
    pub transfer_id: String,
}

/// Session summary carried by `welcome`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    pub exists: bool,
    #[serde(default)]
    pub reclaimable: Option<bool>,
    #[serde(default)]
    pub state: Option<PlaybackState>,
    #[serde(default)]
    pub queue: Option<Vec<QueueItem>>,
    #[serde(default)]
    pub audio_device_id: Option<DeviceId>,
}

impl SessionInfo {
    pub fn is_reclaimable(&self) -> bool {
        self.reclaimable.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomePayload {
    pub device_id: DeviceId,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub session: SessionInfo,
}

/// What happened to cause a `device_list_changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceChange {
    #[serde(rename = "type")]
    pub change_type: String,
    pub device_id: DeviceId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceListPayload {
    pub devices: Vec<Device>,
    #[serde(default)]
    pub change: Option<DeviceChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEndedPayload {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareTransferPayload {
    pub transfer_id: String,
    #[serde(default)]
    pub target_device_id: Option<DeviceId>,
    #[serde(default)]
    pub target_device_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferAbortedPayload {
    pub transfer_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAckPayload {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Messages a device sends to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Hello(HelloPayload),
    RegisterAudioDevice,
    UnregisterAudioDevice,
    /// Re-register as output after a reconnect, carrying the local snapshot.
    ReclaimAudioDevice(PlaybackState),
    State(PlaybackState),
    QueueUpdate(QueuePayload),
    Command(CommandPayload),
    RequestQueue,
    TransferReady(TransferSnapshotPayload),
    TransferComplete(TransferIdPayload),
}

impl Outbound {
    /// Wire type name.
    pub fn msg_type(&self) -> &'static str {
        match self {
            Self::Hello(_) => msg_types::HELLO,
            Self::RegisterAudioDevice => msg_types::REGISTER_AUDIO_DEVICE,
            Self::UnregisterAudioDevice => msg_types::UNREGISTER_AUDIO_DEVICE,
            Self::ReclaimAudioDevice(_) => msg_types::RECLAIM_AUDIO_DEVICE,
            Self::State(_) => msg_types::STATE,
            Self::QueueUpdate(_) => msg_types::QUEUE_UPDATE,
            Self::Command(_) => msg_types::COMMAND,
            Self::RequestQueue => msg_types::REQUEST_QUEUE,
            Self::TransferReady(_) => msg_types::TRANSFER_READY,
            Self::TransferComplete(_) => msg_types::TRANSFER_COMPLETE,
        }
    }

    /// Builds the frame envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if a payload cannot be represented as
    /// JSON (non-finite floats are the only realistic cause).
    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let msg_type = self.msg_type();
        let encode = |source| ProtocolError::Encode {
            msg_type: msg_type.to_string(),
            source,
        };
        let payload = match self {
            Self::Hello(p) => serde_json::to_value(p).map_err(encode)?,
            Self::ReclaimAudioDevice(state) | Self::State(state) => {
                serde_json::to_value(state).map_err(encode)?
            }
            Self::QueueUpdate(p) => serde_json::to_value(p).map_err(encode)?,
            Self::Command(p) => serde_json::to_value(p).map_err(encode)?,
            Self::TransferReady(p) => serde_json::to_value(p).map_err(encode)?,
            Self::TransferComplete(p) => serde_json::to_value(p).map_err(encode)?,
            Self::RegisterAudioDevice | Self::UnregisterAudioDevice | Self::RequestQueue => {
                empty_payload()
            }
        };
        Ok(Envelope::new(msg_type, payload))
    }

    /// Serializes the message to a text frame.
    ///
    /// # Errors
    ///
    /// See [`Outbound::to_envelope`].
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let envelope = self.to_envelope()?;
        serde_json::to_string(&envelope).map_err(|source| ProtocolError::Encode {
            msg_type: envelope.msg_type.clone(),
            source,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Messages the relay delivers to a device.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Welcome(WelcomePayload),
    State(PlaybackState),
    QueueSync(QueuePayload),
    QueueUpdate(QueuePayload),
    DeviceListChanged(DeviceListPayload),
    SessionEnded(SessionEndedPayload),
    Command(CommandPayload),
    PrepareTransfer(PrepareTransferPayload),
    BecomeAudioDevice(TransferSnapshotPayload),
    TransferComplete(TransferIdPayload),
    TransferAborted(TransferAbortedPayload),
    RegisterAck(RegisterAckPayload),
    Error(ErrorPayload),
}

impl Inbound {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidFrame`] if the text is not a JSON envelope
    /// - [`ProtocolError::UnknownType`] for a `type` this engine does not handle
    /// - [`ProtocolError::MalformedPayload`] if required payload fields are missing
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::InvalidFrame)?;
        Self::from_envelope(&envelope)
    }

    /// Dispatches an already-parsed envelope on its `type`.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let message = match envelope.msg_type.as_str() {
            msg_types::WELCOME => Self::Welcome(envelope.decode_payload()?),
            msg_types::STATE => Self::State(envelope.decode_payload()?),
            msg_types::QUEUE_SYNC => Self::QueueSync(envelope.decode_payload()?),
            msg_types::QUEUE_UPDATE => Self::QueueUpdate(envelope.decode_payload()?),
            msg_types::DEVICE_LIST_CHANGED => Self::DeviceListChanged(envelope.decode_payload()?),
            msg_types::SESSION_ENDED => Self::SessionEnded(envelope.decode_payload()?),
            msg_types::COMMAND => Self::Command(envelope.decode_payload()?),
            msg_types::PREPARE_TRANSFER => Self::PrepareTransfer(envelope.decode_payload()?),
            msg_types::BECOME_AUDIO_DEVICE => Self::BecomeAudioDevice(envelope.decode_payload()?),
            msg_types::TRANSFER_COMPLETE => Self::TransferComplete(envelope.decode_payload()?),
            msg_types::TRANSFER_ABORTED => Self::TransferAborted(envelope.decode_payload()?),
            msg_types::REGISTER_ACK => Self::RegisterAck(envelope.decode_payload()?),
            msg_types::PLAYBACK_ERROR | msg_types::ERROR => {
                Self::Error(envelope.decode_payload()?)
            }
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(message)
    }

    /// Wire type name, for logging.
    pub fn msg_type(&self) -> &'static str {
        match self {
            Self::Welcome(_) => msg_types::WELCOME,
            Self::State(_) => msg_types::STATE,
            Self::QueueSync(_) => msg_types::QUEUE_SYNC,
            Self::QueueUpdate(_) => msg_types::QUEUE_UPDATE,
            Self::DeviceListChanged(_) => msg_types::DEVICE_LIST_CHANGED,
            Self::SessionEnded(_) => msg_types::SESSION_ENDED,
            Self::Command(_) => msg_types::COMMAND,
            Self::PrepareTransfer(_) => msg_types::PREPARE_TRANSFER,
            Self::BecomeAudioDevice(_) => msg_types::BECOME_AUDIO_DEVICE,
            Self::TransferComplete(_) => msg_types::TRANSFER_COMPLETE,
            Self::TransferAborted(_) => msg_types::TRANSFER_ABORTED,
            Self::RegisterAck(_) => msg_types::REGISTER_ACK,
            Self::Error(_) => msg_types::PLAYBACK_ERROR,
        }
    }
}
