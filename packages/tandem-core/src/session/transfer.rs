//! Hand-off handshake bookkeeping.
//!
//! Holds at most one [`TransferHandshake`]. Timing is owned by the session
//! actor; the coordinator only records what is in flight and who we are in it.

use serde::Serialize;
use uuid::Uuid;

use crate::protocol::{PlaybackState, QueueItem};

/// Our part in a hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferRole {
    /// Asked to become the output device.
    Requester,
    /// Current output device, handing off.
    Source,
    /// Applying the snapshot to become the output device.
    Target,
}

/// One in-flight hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferHandshake {
    pub transfer_id: String,
    pub role: TransferRole,
    pub created_at: u64,
    /// Source only: whether audio was playing when `prepare_transfer` paused it.
    pub resume_on_abort: bool,
    /// Source only: the snapshot sent in `transfer_ready`.
    pub snapshot: Option<(PlaybackState, Vec<QueueItem>)>,
    pub peer_name: Option<String>,
}

impl TransferHandshake {
    fn new(transfer_id: String, role: TransferRole, created_at: u64) -> Self {
        Self {
            transfer_id,
            role,
            created_at,
            resume_on_abort: false,
            snapshot: None,
            peer_name: None,
        }
    }
}

/// Single-slot transfer coordinator.
#[derive(Debug, Default)]
pub struct TransferCoordinator {
    active: Option<TransferHandshake>,
}

impl TransferCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&TransferHandshake> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|h| h.transfer_id.as_str())
    }

    pub fn role(&self) -> Option<TransferRole> {
        self.active.as_ref().map(|h| h.role)
    }

    /// Starts a request with a fresh id. Returns `None` if a hand-off is
    /// already in flight.
    pub fn begin_request(&mut self, now_ms: u64) -> Option<&TransferHandshake> {
        if self.active.is_some() {
            return None;
        }
        let id = Uuid::new_v4().to_string();
        self.active = Some(TransferHandshake::new(id, TransferRole::Requester, now_ms));
        self.active.as_ref()
    }

    /// Records the source side after pausing for `prepare_transfer`.
    pub fn begin_source(
        &mut self,
        transfer_id: &str,
        now_ms: u64,
        resume_on_abort: bool,
        snapshot: (PlaybackState, Vec<QueueItem>),
        target_name: Option<String>,
    ) -> bool {
        if self.active.is_some() {
            return false;
        }
        let mut handshake =
            TransferHandshake::new(transfer_id.to_string(), TransferRole::Source, now_ms);
        handshake.resume_on_abort = resume_on_abort;
        handshake.snapshot = Some(snapshot);
        handshake.peer_name = target_name;
        self.active = Some(handshake);
        true
    }

    /// Records the target side on `become_audio_device`.
    ///
    /// A pending request is promoted whatever id the relay chose. Any other
    /// hand-off in flight blocks it.
    pub fn begin_target(&mut self, transfer_id: &str, now_ms: u64) -> bool {
        match &self.active {
            Some(h) if h.role != TransferRole::Requester => false,
            Some(h) => {
                let created_at = h.created_at;
                self.active = Some(TransferHandshake::new(
                    transfer_id.to_string(),
                    TransferRole::Target,
                    created_at,
                ));
                true
            }
            None => {
                self.active = Some(TransferHandshake::new(
                    transfer_id.to_string(),
                    TransferRole::Target,
                    now_ms,
                ));
                true
            }
        }
    }

    /// Removes and returns the hand-off if `transfer_id` names it.
    pub fn take_if(&mut self, transfer_id: &str) -> Option<TransferHandshake> {
        if self.active_id() == Some(transfer_id) {
            self.active.take()
        } else {
            None
        }
    }

    /// Removes and returns whatever hand-off is in flight.
    pub fn take(&mut self) -> Option<TransferHandshake> {
        self.active.take()
    }

    pub fn age_ms(&self, now_ms: u64) -> Option<u64> {
        self.active
            .as_ref()
            .map(|h| now_ms.saturating_sub(h.created_at))
    }
}
