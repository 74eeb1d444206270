//! Relay socket task.
//!
//! Owns the WebSocket to the relay. Text frames are forwarded to the session
//! actor as [`TransportEvent::Frame`]; [`Outbound`] messages from the engine
//! are encoded and written out. On close the task reports
//! [`TransportEvent::Disconnected`], waits the reconnect delay and dials again.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::error::ErrorCode;
use crate::protocol::Outbound;

/// What the socket task reports to the session actor.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Socket open. The engine sends `hello` next.
    Connected,
    /// One text frame from the relay.
    Frame(String),
    /// Socket closed or failed.
    Disconnected,
}

/// Relay socket failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("socket error: {0}")]
    Socket(#[from] tungstenite::Error),

    #[error("session channel closed")]
    Closed,
}

/// Reconnecting relay connection.
pub struct RelayConnection {
    url: String,
    reconnect_delay: Duration,
    events: mpsc::Sender<TransportEvent>,
}

impl RelayConnection {
    pub fn new(
        url: impl Into<String>,
        reconnect_delay: Duration,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            events,
        }
    }

    /// Runs until `cancel` fires or the session actor goes away.
    pub async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        cancel: CancellationToken,
    ) {
        log::info!("[Relay] Starting connection loop for {}", self.url);
        loop {
            match self.connect_once(&mut outbound, &cancel).await {
                Ok(()) => log::info!("[Relay] Connection closed"),
                Err(TransportError::Closed) => {
                    log::info!("[Relay] Session gone, stopping");
                    break;
                }
                Err(e) => log::warn!("[Relay] {} ({})", e, e.code()),
            }

            if cancel.is_cancelled() {
                break;
            }
            log::debug!(
                "[Relay] Reconnecting in {}ms",
                self.reconnect_delay.as_millis()
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        log::info!("[Relay] Connection loop stopped");
    }

    async fn connect_once(
        &self,
        outbound: &mut mpsc::UnboundedReceiver<Outbound>,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = connect_async(self.url.as_str()) => result,
        };
        let (socket, _) = connected.map_err(|source| TransportError::Connect {
            url: self.url.clone(),
            source,
        })?;
        log::info!("[Relay] Connected to {}", self.url);

        // Anything queued while offline belongs to the previous connection.
        let mut stale = 0usize;
        while outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            log::debug!("[Relay] Discarded {} stale outbound message(s)", stale);
        }

        self.emit(TransportEvent::Connected).await?;
        let (mut sink, mut stream) = socket.split();

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break Ok(());
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.emit(TransportEvent::Frame(text)).await {
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(TransportError::Socket(e)),
                },
                message = outbound.recv() => match message {
                    Some(message) => match message.to_json() {
                        Ok(json) => {
                            if let Err(e) = sink.send(Message::Text(json)).await {
                                break Err(e.into());
                            }
                        }
                        Err(e) => log::warn!("[Relay] Dropping {}: {}", message.msg_type(), e),
                    },
                    None => break Err(TransportError::Closed),
                },
            }
        };

        // The actor may already be gone on shutdown.
        let _ = self.events.send(TransportEvent::Disconnected).await;
        result
    }

    async fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.events
            .send(event)
            .await
            .map_err(|_| TransportError::Closed)
    }
}
