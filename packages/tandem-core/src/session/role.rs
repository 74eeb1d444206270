use std::fmt;

use serde::Serialize;

/// Per-device role in the shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    /// No session, nothing loaded locally.
    #[default]
    Idle,
    /// This device produces audio and broadcasts state.
    LocalOutput,
    /// Another device produces audio; this one mirrors and interpolates.
    RemoteController,
    /// Paused mid-handoff, waiting for the target to confirm.
    TransferSourcePending,
    /// Asked for the output role, waiting for the snapshot.
    TransferTargetPending,
}

impl SessionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LocalOutput => "local_output",
            Self::RemoteController => "remote_controller",
            Self::TransferSourcePending => "transfer_source_pending",
            Self::TransferTargetPending => "transfer_target_pending",
        }
    }

    /// Whether the device displays another device's broadcast state.
    pub fn mirrors_remote(self) -> bool {
        matches!(self, Self::RemoteController | Self::TransferTargetPending)
    }

    /// Whether local state is authoritative and inbound snapshots must be ignored.
    pub fn owns_state(self) -> bool {
        matches!(self, Self::LocalOutput | Self::TransferSourcePending)
    }

    pub fn is_transferring(self) -> bool {
        matches!(
            self,
            Self::TransferSourcePending | Self::TransferTargetPending
        )
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relay connection status as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    /// Socket open, `hello` sent, no `welcome` yet.
    Handshaking,
    /// `welcome` received.
    Connected,
}
