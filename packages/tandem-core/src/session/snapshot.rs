use serde::Serialize;

use super::role::{ConnectionStatus, SessionRole};
use super::transfer::TransferRole;
use crate::protocol::{Device, DeviceId, PlaybackState, QueueItem};

/// Summary of an in-flight hand-off.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingTransfer {
    pub transfer_id: String,
    pub role: TransferRole,
}

/// Read-only view of one device's session, published after every dispatch.
///
/// `playback` is the local authoritative state while this device owns it and
/// the cached copy of the output device's broadcast otherwise.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionSnapshot {
    pub role: SessionRole,
    pub connection: ConnectionStatus,
    pub my_device_id: Option<DeviceId>,
    pub devices: Vec<Device>,
    pub output_device_id: Option<DeviceId>,
    pub playback: Option<PlaybackState>,
    pub queue: Vec<QueueItem>,
    /// Displayed position in seconds (interpolated on controllers).
    pub estimated_position: Option<f64>,
    pub transfer: Option<PendingTransfer>,
}

impl SessionSnapshot {
    pub fn output_device(&self) -> Option<&Device> {
        let id = self.output_device_id?;
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn is_playing(&self) -> bool {
        self.playback.as_ref().is_some_and(|p| p.is_playing)
    }
}
