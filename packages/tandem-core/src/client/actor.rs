//! The session actor: one task that owns the [`SessionEngine`].
//!
//! Relay frames, local commands, adapter callbacks and timer ticks are all
//! multiplexed onto this task, so they are applied strictly one at a time.
//! After every dispatch the timers are re-armed from engine state and a fresh
//! [`SessionSnapshot`] is published on a watch channel.

use std::future::pending;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connection::TransportEvent;
use super::handle::SessionHandle;
use crate::events::BroadcastEventBridge;
use crate::output::OutputEventStream;
use crate::protocol_constants::COMMAND_CHANNEL_CAPACITY;
use crate::session::{SessionCommand, SessionEngine, SessionSnapshot};

/// Timers derived from engine state.
#[derive(Default)]
struct Timers {
    heartbeat: Option<Interval>,
    interpolation: Option<Interval>,
    hello_retry: Option<Interval>,
    /// Deadline for the in-flight hand-off, keyed by transfer id.
    transfer: Option<(String, Instant)>,
}

impl Timers {
    fn reconcile(&mut self, engine: &SessionEngine) {
        let config = engine.config();
        sync_interval(
            &mut self.heartbeat,
            engine.heartbeat_active(),
            config.heartbeat_interval(),
        );
        sync_interval(
            &mut self.interpolation,
            engine.interpolation_active(),
            config.interpolation_tick(),
        );
        sync_interval(
            &mut self.hello_retry,
            engine.hello_retry_active(),
            config.hello_retry_interval(),
        );

        match engine.active_transfer() {
            Some(handshake) => {
                let armed = self
                    .transfer
                    .as_ref()
                    .is_some_and(|(id, _)| *id == handshake.transfer_id);
                if !armed {
                    let deadline = Instant::now() + config.transfer_timeout();
                    self.transfer = Some((handshake.transfer_id.clone(), deadline));
                }
            }
            None => self.transfer = None,
        }
    }
}

/// Starts or stops a periodic timer. The first tick fires one period after
/// arming.
fn sync_interval(slot: &mut Option<Interval>, active: bool, period: Duration) {
    match (active, slot.is_some()) {
        (true, false) => {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *slot = Some(timer);
        }
        (false, true) => *slot = None,
        _ => {}
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending().await,
    }
}

async fn expire(deadline: &Option<(String, Instant)>) -> String {
    match deadline {
        Some((transfer_id, at)) => {
            sleep_until(*at).await;
            transfer_id.clone()
        }
        None => pending().await,
    }
}

pub struct SessionActor {
    engine: SessionEngine,
    transport: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    output_events: OutputEventStream,
    snapshots: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
}

impl SessionActor {
    /// Builds the actor and the handle that talks to it.
    pub fn new(
        engine: SessionEngine,
        transport: mpsc::Receiver<TransportEvent>,
        output_events: OutputEventStream,
        events: BroadcastEventBridge,
        cancel: CancellationToken,
    ) -> (Self, SessionHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshots, snapshot_rx) = watch::channel(engine.snapshot());
        let handle = SessionHandle::new(command_tx, snapshot_rx, events, cancel.clone());
        let actor = Self {
            engine,
            transport,
            commands,
            output_events,
            snapshots,
            cancel,
        };
        (actor, handle)
    }

    /// Processes inputs until cancelled or every handle is dropped.
    pub async fn run(self) {
        let Self {
            mut engine,
            mut transport,
            mut commands,
            mut output_events,
            snapshots,
            cancel,
        } = self;
        let mut timers = Timers::default();
        log::info!("[Session] Actor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = transport.recv() => match event {
                    Some(event) => engine.on_transport_event(event).await,
                    None => {
                        log::info!("[Session] Transport task ended");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => engine.on_command(command).await,
                    None => {
                        log::info!("[Session] All handles dropped");
                        break;
                    }
                },
                Some(event) = output_events.recv() => engine.on_output_event(event).await,
                _ = tick(&mut timers.heartbeat) => engine.on_heartbeat(),
                // Republishing is enough: the snapshot re-estimates the position.
                _ = tick(&mut timers.interpolation) => {}
                _ = tick(&mut timers.hello_retry) => engine.on_hello_retry(),
                transfer_id = expire(&timers.transfer) => {
                    engine.on_transfer_timeout(&transfer_id).await;
                }
            }

            timers.reconcile(&engine);
            snapshots.send_replace(engine.snapshot());
        }

        cancel.cancel();
        log::info!("[Session] Actor stopped (role {})", engine.role());
    }
}
