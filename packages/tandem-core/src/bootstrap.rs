//! Session bootstrap and dependency wiring.
//!
//! This module is the composition root: the single place where the engine,
//! the session actor and the relay connection are instantiated and wired
//! together.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalog::TrackCatalog;
use crate::client::{RelayConnection, SessionActor, SessionHandle};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{TandemError, TandemResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::output::{LocalOutput, OutputEventStream};
use crate::protocol_constants::TRANSPORT_CHANNEL_CAPACITY;
use crate::runtime::TaskSpawner;
use crate::session::{EngineDeps, Outbox, SessionEngine};

/// Platform pieces the embedder supplies.
pub struct SessionDeps {
    /// Local sound output.
    pub output: Arc<dyn LocalOutput>,
    /// Callbacks from `output`.
    pub output_events: OutputEventStream,
    pub catalog: Arc<dyn TrackCatalog>,
    pub clock: Arc<dyn Clock>,
}

/// Container for a running session.
#[derive(Clone)]
pub struct BootstrappedSession {
    /// Handle for commands and snapshot reads.
    pub handle: SessionHandle,
    /// Event bridge for subscribers and an optional external emitter.
    pub event_bridge: BroadcastEventBridge,
    /// Cancellation token shared by the actor and the relay connection.
    pub cancel_token: CancellationToken,
}

impl BootstrappedSession {
    /// Initiates graceful shutdown of the session tasks.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();
    }
}

fn validate_relay_url(url: &str) -> TandemResult<()> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(TandemError::Configuration(format!(
            "relay url must start with ws:// or wss://, got '{}'",
            url
        )))
    }
}

/// Bootstraps a device session.
///
/// Wiring order:
///
/// 1. Event bridge and cancellation token
/// 2. Outbox (engine to connection) and transport channel (connection to actor)
/// 3. Engine with its collaborators
/// 4. Session actor and its handle
/// 5. Relay connection
///
/// # Errors
///
/// Returns [`TandemError::Configuration`] for an invalid config or relay URL.
pub fn bootstrap_session<S: TaskSpawner>(
    spawner: &S,
    relay_url: &str,
    config: EngineConfig,
    deps: SessionDeps,
) -> TandemResult<BootstrappedSession> {
    config.validate()?;
    validate_relay_url(relay_url)?;

    let event_bridge = BroadcastEventBridge::new(config.event_channel_capacity);
    let cancel_token = CancellationToken::new();

    let (outbox, outbound_rx) = Outbox::channel();
    let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);

    let reconnect_delay = config.reconnect_delay();
    log::info!(
        "[Bootstrap] Starting session for '{}' ({}) via {}",
        config.device_name,
        config.device_type,
        relay_url
    );
    let engine = SessionEngine::new(
        config,
        EngineDeps {
            output: deps.output,
            catalog: deps.catalog,
            clock: deps.clock,
            emitter: Arc::new(event_bridge.clone()) as Arc<dyn EventEmitter>,
        },
        outbox,
    );

    let (actor, handle) = SessionActor::new(
        engine,
        transport_rx,
        deps.output_events,
        event_bridge.clone(),
        cancel_token.clone(),
    );
    spawner.spawn(actor.run());

    let connection = RelayConnection::new(relay_url, reconnect_delay, transport_tx);
    spawner.spawn(connection.run(outbound_rx, cancel_token.child_token()));

    Ok(BootstrappedSession {
        handle,
        event_bridge,
        cancel_token,
    })
}
