//! Tandem Core - multi-device playback synchronization.
//!
//! Several devices logged into the same account share one playback session
//! through a relay. Exactly one device (the output device) produces audio and
//! broadcasts authoritative state; every other device mirrors that state,
//! interpolates the position between broadcasts and routes its transport
//! commands to the output device. The output role can be handed between
//! devices mid-playback.
//!
//! # Architecture
//!
//! - [`protocol`]: Wire messages and the replicated data model
//! - [`session`]: Per-device role state machine and its components
//! - [`client`]: Relay socket, session actor and [`SessionHandle`]
//! - [`output`]: Local output adapter trait and a simulated implementation
//! - [`events`]: Event system for observers
//! - [`bootstrap`]: Composition root
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`LocalOutput`](output::LocalOutput): Producing sound
//! - [`TrackCatalog`](catalog::TrackCatalog): Resolving track metadata
//! - [`Clock`](clock::Clock): Wall-clock time for snapshot timestamps

// Allow missing docs for now - public items are documented where non-obvious
#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod catalog;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod output;
pub mod protocol;
pub mod protocol_constants;
pub mod runtime;
pub mod session;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-export commonly used types at the crate root
pub use bootstrap::{bootstrap_session, BootstrappedSession, SessionDeps};
pub use catalog::{StaticCatalog, TrackCatalog};
pub use client::{RelayConnection, SessionHandle, TransportError, TransportEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{ErrorCode, TandemError, TandemResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, ConnectionEvent, EventEmitter, LoggingEventEmitter,
    NoopEventEmitter, ProtocolEvent, SessionEvent, TransferEvent,
};
pub use output::{
    output_event_channel, LocalOutput, OutputError, OutputEvent, OutputEventSink,
    OutputEventStream, SimulatedOutput,
};
pub use protocol::{
    Device, DeviceId, DeviceType, Inbound, Outbound, PlaybackState, ProtocolError, QueueItem,
    RepeatMode, TrackRef,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{
    ConnectionStatus, PendingTransfer, PlayerCommand, SessionCommand, SessionRole,
    SessionSnapshot, TransferRole,
};
pub use utils::now_millis;
