//! Runtime side of a device: the relay socket, the session actor that owns
//! the engine, and the handle embedders hold.

mod actor;
mod connection;
mod handle;

pub use actor::SessionActor;
pub use connection::{RelayConnection, TransportError, TransportEvent};
pub use handle::SessionHandle;
