use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{TandemError, TandemResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge};
use crate::session::{PlayerCommand, SessionCommand, SessionSnapshot};

/// Cloneable handle to a running session.
///
/// Commands are queued to the session actor; reads come from the latest
/// published [`SessionSnapshot`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: BroadcastEventBridge,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<SessionCommand>,
        snapshots: watch::Receiver<SessionSnapshot>,
        events: BroadcastEventBridge,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            commands,
            snapshots,
            events,
            cancel,
        }
    }

    /// Queues a command for the session actor.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::SessionClosed`] once the actor has stopped.
    pub async fn send(&self, command: impl Into<SessionCommand>) -> TandemResult<()> {
        self.commands
            .send(command.into())
            .await
            .map_err(|_| TandemError::SessionClosed("session actor stopped".to_string()))
    }

    pub async fn play(&self) -> TandemResult<()> {
        self.send(PlayerCommand::Play).await
    }

    pub async fn pause(&self) -> TandemResult<()> {
        self.send(PlayerCommand::Pause).await
    }

    /// Asks for the output role (transfer or direct registration).
    pub async fn become_output(&self) -> TandemResult<()> {
        self.send(SessionCommand::BecomeOutput).await
    }

    pub async fn release_output(&self) -> TandemResult<()> {
        self.send(SessionCommand::ReleaseOutput).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that is notified after every dispatch.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.events.subscribe()
    }

    /// Stops the actor and the relay connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
