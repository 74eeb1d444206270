//! Event system for observers of a device's session.
//!
//! This module provides:
//! - [`EventEmitter`] trait the session engine emits through
//! - [`BroadcastEventBridge`] for fan-out to any number of subscribers
//! - Event types for the session, transfer, connection and protocol domains
//!
//! Events are notices. The authoritative view of the session is the
//! [`SessionSnapshot`](crate::SessionSnapshot) published after every dispatch.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::protocol::{Device, DeviceId};
use crate::session::{SessionRole, TransferRole};

/// Events broadcast to observers.
///
/// Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Role and membership changes.
    Session(SessionEvent),

    /// Hand-off progress.
    Transfer(TransferEvent),

    /// Relay connection lifecycle.
    Connection(ConnectionEvent),

    /// Desync and relay-side problems.
    Protocol(ProtocolEvent),
}

/// Events related to this device's place in the session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// This device's role changed.
    RoleChanged {
        from: SessionRole,
        to: SessionRole,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The relay broadcast a new device list.
    DevicesChanged {
        devices: Vec<Device>,
        #[serde(rename = "outputDeviceId")]
        output_device_id: Option<DeviceId>,
        timestamp: u64,
    },
    /// The relay ended the session.
    Ended { reason: String, timestamp: u64 },
}

/// Events related to the output hand-off.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransferEvent {
    /// This device asked to become the output.
    Requested {
        #[serde(rename = "transferId")]
        transfer_id: String,
        timestamp: u64,
    },
    /// Another device asked for the output; local audio is paused.
    Preparing {
        #[serde(rename = "transferId")]
        transfer_id: String,
        #[serde(rename = "targetDeviceName")]
        target_device_name: String,
        timestamp: u64,
    },
    Completed {
        #[serde(rename = "transferId")]
        transfer_id: String,
        role: TransferRole,
        timestamp: u64,
    },
    /// Non-fatal: playback continues on the original device.
    Aborted {
        #[serde(rename = "transferId")]
        transfer_id: String,
        role: TransferRole,
        reason: String,
        timestamp: u64,
    },
}

/// Events related to the relay connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// Socket open, handshake in progress.
    Connected { timestamp: u64 },
    /// `welcome` received.
    Welcomed {
        #[serde(rename = "deviceId")]
        device_id: DeviceId,
        timestamp: u64,
    },
    /// Socket closed; shown as "reconnecting", not as a failure.
    Disconnected { timestamp: u64 },
}

/// Protocol-level notices.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProtocolEvent {
    /// The relay reported an error.
    RelayError {
        code: String,
        message: String,
        timestamp: u64,
    },
    /// A queue version mismatch triggered `request_queue`.
    QueueResyncRequested {
        #[serde(rename = "localVersion")]
        local_version: u64,
        #[serde(rename = "remoteVersion")]
        remote_version: u64,
        timestamp: u64,
    },
    /// The relay refused this device as output.
    RegistrationRejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: u64,
    },
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}

impl From<TransferEvent> for BroadcastEvent {
    fn from(event: TransferEvent) -> Self {
        BroadcastEvent::Transfer(event)
    }
}

impl From<ConnectionEvent> for BroadcastEvent {
    fn from(event: ConnectionEvent) -> Self {
        BroadcastEvent::Connection(event)
    }
}

impl From<ProtocolEvent> for BroadcastEvent {
    fn from(event: ProtocolEvent) -> Self {
        BroadcastEvent::Protocol(event)
    }
}
