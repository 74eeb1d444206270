//! Per-device session: role state machine and the components it drives.
//!
//! - [`registry`]: who is connected and who holds the output role
//! - [`player`]: authoritative playback state while this device is output
//! - [`scheduler`]: when to broadcast `state` and `queue_update`
//! - [`interpolator`]: position estimate while mirroring another device
//! - [`transfer`]: the single in-flight hand-off
//! - [`engine`]: ties them together behind one serialized entry point

pub mod commands;
pub mod engine;
pub mod interpolator;
pub mod player;
pub mod registry;
pub mod role;
pub mod scheduler;
pub mod snapshot;
pub mod transfer;

pub use commands::{PlayerCommand, SessionCommand};
pub use engine::{EngineDeps, Outbox, SessionEngine};
pub use interpolator::{extrapolate, Anchor, PositionInterpolator};
pub use player::LocalPlayer;
pub use registry::DeviceRegistry;
pub use role::{ConnectionStatus, SessionRole};
pub use scheduler::{BroadcastPlan, BroadcastScheduler, Mutation};
pub use snapshot::{PendingTransfer, SessionSnapshot};
pub use transfer::{TransferCoordinator, TransferHandshake, TransferRole};
