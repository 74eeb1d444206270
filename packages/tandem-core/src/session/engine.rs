//! Per-device session state machine.
//!
//! [`SessionEngine`] is driven by exactly one task (the session actor). Every
//! input (relay frame, local command, adapter event, timer) is one `async`
//! method call, so no state here is ever shared or locked. Outbound messages
//! go to an [`Outbox`] that the relay connection drains.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use super::commands::{PlayerCommand, SessionCommand};
use super::interpolator::{Anchor, PositionInterpolator};
use super::player::LocalPlayer;
use super::registry::DeviceRegistry;
use super::role::{ConnectionStatus, SessionRole};
use super::scheduler::{BroadcastPlan, BroadcastScheduler, Mutation};
use super::snapshot::{PendingTransfer, SessionSnapshot};
use super::transfer::{TransferCoordinator, TransferHandshake, TransferRole};
use crate::catalog::TrackCatalog;
use crate::client::TransportEvent;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::ErrorCode;
use crate::events::{
    ConnectionEvent, EventEmitter, ProtocolEvent, SessionEvent, TransferEvent,
};
use crate::output::{LocalOutput, OutputEvent};
use crate::protocol::{
    CommandPayload, DeviceId, DeviceListPayload, ErrorPayload, HelloPayload, Inbound, Outbound,
    PlaybackState, PrepareTransferPayload, ProtocolError, QueueItem, QueuePayload,
    RegisterAckPayload, TransferIdPayload, TransferSnapshotPayload, WelcomePayload,
};
use crate::protocol_constants::REQUEST_TRANSFER_COMMAND;

/// Collaborators the engine drives.
#[derive(Clone)]
pub struct EngineDeps {
    pub output: Arc<dyn LocalOutput>,
    pub catalog: Arc<dyn TrackCatalog>,
    pub clock: Arc<dyn Clock>,
    pub emitter: Arc<dyn EventEmitter>,
}

/// Sending half towards the relay connection.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Creates an outbox and the receiver the connection reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, message: Outbound) {
        log::debug!("[Engine] -> {}", message.msg_type());
        if self.tx.send(message).is_err() {
            log::debug!("[Engine] Outbound channel closed, dropping message");
        }
    }
}

/// One device's protocol engine.
pub struct SessionEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    emitter: Arc<dyn EventEmitter>,
    outbox: Outbox,

    connection: ConnectionStatus,
    role: SessionRole,
    registry: DeviceRegistry,
    scheduler: BroadcastScheduler,
    interpolator: PositionInterpolator,
    transfers: TransferCoordinator,
    player: LocalPlayer,

    /// Cached copy of the output device's broadcasts.
    remote_state: Option<PlaybackState>,
    remote_queue: Vec<QueueItem>,
    remote_queue_version: u64,
    /// Version a `request_queue` is outstanding for.
    resync_requested: Option<u64>,
    /// Registered (or transfer completed) but not yet listed by the relay.
    registration_pending: bool,
}

impl SessionEngine {
    pub fn new(config: EngineConfig, deps: EngineDeps, outbox: Outbox) -> Self {
        let player = LocalPlayer::new(deps.output, deps.catalog, deps.clock.clone());
        Self {
            config,
            clock: deps.clock,
            emitter: deps.emitter,
            outbox,
            connection: ConnectionStatus::Disconnected,
            role: SessionRole::Idle,
            registry: DeviceRegistry::new(),
            scheduler: BroadcastScheduler::new(),
            interpolator: PositionInterpolator::new(),
            transfers: TransferCoordinator::new(),
            player,
            remote_state: None,
            remote_queue: Vec::new(),
            remote_queue_version: 0,
            resync_requested: None,
            registration_pending: false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn player(&self) -> &LocalPlayer {
        &self.player
    }

    pub fn remote_state(&self) -> Option<&PlaybackState> {
        self.remote_state.as_ref()
    }

    pub fn remote_queue(&self) -> &[QueueItem] {
        &self.remote_queue
    }

    pub fn active_transfer(&self) -> Option<&TransferHandshake> {
        self.transfers.active()
    }

    pub fn is_registration_pending(&self) -> bool {
        self.registration_pending
    }

    /// Whether the heartbeat timer should run.
    pub fn heartbeat_active(&self) -> bool {
        self.role == SessionRole::LocalOutput && self.scheduler.is_active()
    }

    /// Whether the interpolation timer should run.
    pub fn interpolation_active(&self) -> bool {
        self.role.mirrors_remote() && self.interpolator.is_active()
    }

    /// Whether `hello` should be re-sent periodically.
    pub fn hello_retry_active(&self) -> bool {
        self.connection == ConnectionStatus::Handshaking
    }

    /// Displayed position in seconds.
    pub fn estimated_position(&self) -> Option<f64> {
        if self.shows_local_state() {
            return Some(self.player.position());
        }
        self.interpolator
            .estimate(self.clock.now_millis())
            .or_else(|| self.remote_state.as_ref().map(|s| s.position))
    }

    fn shows_local_state(&self) -> bool {
        self.role.owns_state() || (self.role == SessionRole::Idle && self.player.has_track())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (playback, queue) = if self.shows_local_state() {
            (Some(self.player.snapshot()), self.player.queue().to_vec())
        } else {
            (self.remote_state.clone(), self.remote_queue.clone())
        };
        SessionSnapshot {
            role: self.role,
            connection: self.connection,
            my_device_id: self.registry.my_id(),
            devices: self.registry.devices().to_vec(),
            output_device_id: self.registry.output_device_id(),
            playback,
            queue,
            estimated_position: self.estimated_position(),
            transfer: self.transfers.active().map(|h| PendingTransfer {
                transfer_id: h.transfer_id.clone(),
                role: h.role,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────

    pub async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                if self.connection != ConnectionStatus::Disconnected {
                    self.on_disconnected().await;
                }
                log::info!("[Engine] Connected to relay, sending hello");
                self.connection = ConnectionStatus::Handshaking;
                self.send_hello();
                self.emitter.emit_connection(ConnectionEvent::Connected {
                    timestamp: self.now(),
                });
            }
            TransportEvent::Frame(text) => self.on_frame(&text).await,
            TransportEvent::Disconnected => self.on_disconnected().await,
        }
    }

    /// Decodes and dispatches one relay frame. Undecodable frames are dropped.
    pub async fn on_frame(&mut self, text: &str) {
        match Inbound::decode(text) {
            Ok(message) => self.on_inbound(message).await,
            Err(ProtocolError::UnknownType(msg_type)) => {
                log::debug!("[Engine] Dropping unknown message type {}", msg_type);
            }
            Err(e) => {
                log::warn!("[Engine] Dropping frame ({}): {}", e.code(), e);
            }
        }
    }

    /// Resends `hello` until `welcome` arrives.
    pub fn on_hello_retry(&mut self) {
        if self.connection == ConnectionStatus::Handshaking {
            log::debug!("[Engine] No welcome yet, resending hello");
            self.send_hello();
        }
    }

    fn send_hello(&self) {
        self.send(Outbound::Hello(HelloPayload::new(
            self.config.device_name.clone(),
            self.config.device_type,
            self.config.legacy_device_types,
        )));
    }

    async fn on_disconnected(&mut self) {
        if self.connection == ConnectionStatus::Disconnected {
            return;
        }
        log::warn!("[Engine] Relay connection lost (role was {})", self.role);
        self.connection = ConnectionStatus::Disconnected;
        self.scheduler.stop();
        self.interpolator.clear();

        if let Some(handshake) = self.transfers.take() {
            self.emit_aborted(&handshake, "disconnected");
        }
        if self.player.has_track() {
            self.player.pause_output().await;
            log::info!("[Engine] Local playback paused, snapshot kept for reclaim");
        }

        self.clear_remote_cache();
        self.registry.clear();
        self.registration_pending = false;
        self.set_role(SessionRole::Idle);
        self.emitter.emit_connection(ConnectionEvent::Disconnected {
            timestamp: self.now(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound messages
    // ─────────────────────────────────────────────────────────────────────

    pub async fn on_inbound(&mut self, message: Inbound) {
        match (self.connection, &message) {
            (ConnectionStatus::Disconnected, _) => {
                log::debug!("[Engine] Not connected, dropping {}", message.msg_type());
                return;
            }
            (ConnectionStatus::Handshaking, m) if !matches!(m, Inbound::Welcome(_)) => {
                log::debug!("[Engine] Awaiting welcome, dropping {}", message.msg_type());
                return;
            }
            _ => {}
        }

        log::debug!("[Engine] <- {} (role {})", message.msg_type(), self.role);
        match message {
            Inbound::Welcome(payload) => self.on_welcome(payload).await,
            Inbound::State(state) => self.on_remote_state(state),
            Inbound::QueueSync(payload) | Inbound::QueueUpdate(payload) => {
                self.on_remote_queue(payload)
            }
            Inbound::DeviceListChanged(payload) => self.on_device_list(payload).await,
            Inbound::SessionEnded(payload) => {
                log::info!("[Engine] Session ended by relay: {}", payload.reason);
                self.end_session(payload.reason).await;
            }
            Inbound::Command(payload) => self.on_remote_command(payload).await,
            Inbound::PrepareTransfer(payload) => self.on_prepare_transfer(payload).await,
            Inbound::BecomeAudioDevice(payload) => self.on_become_output(payload).await,
            Inbound::TransferComplete(payload) => self.on_transfer_complete(payload).await,
            Inbound::TransferAborted(payload) => {
                match self.transfers.take_if(&payload.transfer_id) {
                    Some(handshake) => self.abort_handshake(handshake, &payload.reason).await,
                    None => log::debug!(
                        "[Engine] Abort for unknown transfer {}, ignoring",
                        payload.transfer_id
                    ),
                }
            }
            Inbound::RegisterAck(payload) => self.on_register_ack(payload).await,
            Inbound::Error(payload) => self.on_relay_error(payload),
        }
    }

    async fn on_welcome(&mut self, welcome: WelcomePayload) {
        let previous_output = self.registry.output_device_id();
        let first = self.connection != ConnectionStatus::Connected;
        self.registry.assign_identity(welcome.device_id);
        self.registry.apply_device_list(welcome.devices);
        self.connection = ConnectionStatus::Connected;
        self.emit_devices_changed();

        if !first {
            log::debug!("[Engine] Repeated welcome, refreshing device list only");
            self.follow_registry(previous_output).await;
            return;
        }

        log::info!(
            "[Engine] Welcomed as device {} ({} devices, session exists: {})",
            welcome.device_id,
            self.registry.devices().len(),
            welcome.session.exists
        );
        self.emitter.emit_connection(ConnectionEvent::Welcomed {
            device_id: welcome.device_id,
            timestamp: self.now(),
        });

        let session = welcome.session;
        if session.is_reclaimable() && self.player.has_track() {
            log::info!("[Engine] Session is reclaimable, re-registering as output");
            self.send(Outbound::ReclaimAudioDevice(self.player.snapshot()));
            self.registration_pending = true;
            self.enter_local_output();
            return;
        }

        let has_queue = session.queue.is_some();
        if let Some(state) = session.state {
            // The version only describes the queue it arrived with.
            if has_queue {
                self.remote_queue_version = state.queue_version;
            }
            self.interpolator.set_anchor(Anchor::from_state(&state));
            self.remote_state = Some(state);
        }
        if let Some(queue) = session.queue {
            self.remote_queue = queue;
        }
        self.follow_registry(previous_output).await;

        if self.role.mirrors_remote() {
            if let Some(version) = self.remote_state.as_ref().map(|s| s.queue_version) {
                self.check_queue_version(version);
            }
        }
    }

    fn on_remote_state(&mut self, state: PlaybackState) {
        if self.role.owns_state() {
            // Echo of our own broadcast or a stale one from a previous output.
            log::debug!("[Engine] Ignoring state while {}", self.role);
            return;
        }
        if self.role.mirrors_remote() {
            self.check_queue_version(state.queue_version);
        }
        self.interpolator.set_anchor(Anchor::from_state(&state));
        self.remote_state = Some(state);
    }

    fn check_queue_version(&mut self, remote_version: u64) {
        if remote_version == self.remote_queue_version
            || self.resync_requested == Some(remote_version)
        {
            return;
        }
        log::info!(
            "[Engine] Queue version {} differs from local {}, requesting resync",
            remote_version,
            self.remote_queue_version
        );
        self.resync_requested = Some(remote_version);
        self.send(Outbound::RequestQueue);
        self.emitter
            .emit_protocol(ProtocolEvent::QueueResyncRequested {
                local_version: self.remote_queue_version,
                remote_version,
                timestamp: self.now(),
            });
    }

    /// `queue_sync` and `queue_update` carry no request id, so both are
    /// applied unconditionally.
    fn on_remote_queue(&mut self, payload: QueuePayload) {
        if self.role.owns_state() {
            log::debug!("[Engine] Ignoring queue snapshot while {}", self.role);
            return;
        }
        self.remote_queue = payload.queue;
        self.remote_queue_version = payload.queue_version;
        self.resync_requested = None;
    }

    async fn on_device_list(&mut self, payload: DeviceListPayload) {
        let previous_output = self.registry.output_device_id();
        if let Some(change) = &payload.change {
            log::debug!(
                "[Engine] Device list changed: {} device {}",
                change.change_type,
                change.device_id
            );
        }
        self.registry.apply_device_list(payload.devices);
        self.emit_devices_changed();
        self.follow_registry(previous_output).await;
    }

    /// Aligns the role with the relay's view of who the output device is.
    async fn follow_registry(&mut self, previous_output: Option<DeviceId>) {
        let me = self.registry.my_id();
        match self.registry.output_device_id() {
            Some(output) if Some(output) == me => {
                self.registration_pending = false;
                if matches!(self.role, SessionRole::Idle | SessionRole::RemoteController) {
                    log::info!("[Engine] Relay lists this device as output, taking over");
                    self.adopt_cache_for_output().await;
                    self.enter_local_output();
                }
            }
            Some(output) => {
                self.registration_pending = false;
                match self.role {
                    SessionRole::TransferSourcePending => {
                        if let Some(handshake) = self.transfers.take() {
                            log::info!(
                                "[Engine] Device {} listed as output, transfer {} done",
                                output,
                                handshake.transfer_id
                            );
                            self.complete_source(handshake).await;
                        }
                    }
                    SessionRole::LocalOutput => {
                        log::warn!("[Engine] Device {} took the output role, stepping down", output);
                        self.scheduler.stop();
                        self.release_local_audio().await;
                        self.enter_remote_controller();
                    }
                    SessionRole::Idle => {
                        self.release_local_audio().await;
                        self.enter_remote_controller();
                    }
                    SessionRole::RemoteController => {
                        if previous_output != Some(output) {
                            log::info!("[Engine] Output moved to device {}", output);
                            self.interpolator.start();
                        }
                    }
                    SessionRole::TransferTargetPending => {}
                }
            }
            None => match self.role {
                SessionRole::LocalOutput if self.registration_pending => {
                    log::debug!("[Engine] Registration pending, not yet listed as output");
                }
                SessionRole::LocalOutput => {
                    log::warn!("[Engine] No output device listed, going idle");
                    self.scheduler.stop();
                    self.player.pause_output().await;
                    self.set_role(SessionRole::Idle);
                }
                SessionRole::RemoteController => {
                    log::info!("[Engine] No output device listed, going idle");
                    self.interpolator.clear();
                    self.clear_remote_cache();
                    self.set_role(SessionRole::Idle);
                }
                SessionRole::TransferSourcePending | SessionRole::TransferTargetPending => {
                    log::debug!("[Engine] No output listed mid-transfer, waiting for handshake");
                }
                SessionRole::Idle => {}
            },
        }
    }

    /// Gives the local adapter something to play when the relay names this
    /// device output without a hand-off: the cached remote snapshot, paused.
    async fn adopt_cache_for_output(&mut self) {
        if self.player.has_track() {
            return;
        }
        let Some(mut state) = self.remote_state.clone() else {
            return;
        };
        state.position = self.estimated_position().unwrap_or(state.position);
        state.is_playing = false;
        let queue = self.remote_queue.clone();
        if let Err(e) = self.player.apply_snapshot(&state, &queue).await {
            log::warn!("[Engine] Could not load cached snapshot: {}", e);
        }
    }

    async fn end_session(&mut self, reason: String) {
        self.scheduler.stop();
        self.interpolator.clear();
        if let Some(handshake) = self.transfers.take() {
            self.emit_aborted(&handshake, "session_ended");
        }
        self.release_local_audio().await;
        self.clear_remote_cache();
        self.registration_pending = false;
        self.set_role(SessionRole::Idle);
        self.emitter.emit_session(SessionEvent::Ended {
            reason,
            timestamp: self.now(),
        });
    }

    async fn on_remote_command(&mut self, payload: CommandPayload) {
        if payload.command == REQUEST_TRANSFER_COMMAND {
            log::debug!("[Engine] request_transfer is for the relay, ignoring");
            return;
        }
        if self.role != SessionRole::LocalOutput {
            log::debug!(
                "[Engine] Ignoring remote command {} while {}",
                payload.command,
                self.role
            );
            return;
        }
        match PlayerCommand::from_remote(&payload.command, &payload.payload) {
            Ok(command) => {
                log::info!("[Engine] Remote command: {}", payload.command);
                self.apply_as_output(command).await;
            }
            Err(e) => log::warn!("[Engine] Dropping remote command: {}", e),
        }
    }

    async fn on_register_ack(&mut self, ack: RegisterAckPayload) {
        if ack.success {
            log::debug!("[Engine] Output registration acknowledged");
            return;
        }
        log::warn!(
            "[Engine] Relay rejected output registration: {}",
            ack.error.as_deref().unwrap_or("no reason given")
        );
        self.registration_pending = false;
        self.emitter
            .emit_protocol(ProtocolEvent::RegistrationRejected {
                error: ack.error,
                timestamp: self.now(),
            });
        if self.role == SessionRole::LocalOutput {
            self.scheduler.stop();
            self.player.pause_output().await;
            if self.other_output().is_some() {
                self.release_local_audio().await;
            }
            self.fall_back_to_registry();
        }
    }

    fn on_relay_error(&mut self, error: ErrorPayload) {
        log::warn!("[Engine] Relay error {}: {}", error.code, error.message);
        self.emitter.emit_protocol(ProtocolEvent::RelayError {
            code: error.code,
            message: error.message,
            timestamp: self.now(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transfer handshake
    // ─────────────────────────────────────────────────────────────────────

    async fn on_prepare_transfer(&mut self, payload: PrepareTransferPayload) {
        if self.role != SessionRole::LocalOutput {
            log::warn!(
                "[Engine] prepare_transfer {} while {}, ignoring",
                payload.transfer_id,
                self.role
            );
            return;
        }
        if let Some(active) = self.transfers.active_id() {
            log::warn!(
                "[Engine] prepare_transfer {} while transfer {} in flight, ignoring",
                payload.transfer_id,
                active
            );
            return;
        }

        // Snapshot first so it carries the pre-pause is_playing value.
        let state = self.player.snapshot();
        let queue = self.player.queue().to_vec();
        let was_playing = self.player.pause_output().await;
        self.scheduler.stop();

        log::info!(
            "[Engine] Handing output to {} (transfer {}, at {:.1}s, playing={})",
            payload.target_device_name,
            payload.transfer_id,
            state.position,
            was_playing
        );
        self.transfers.begin_source(
            &payload.transfer_id,
            self.now(),
            was_playing,
            (state.clone(), queue.clone()),
            Some(payload.target_device_name.clone()),
        );
        self.set_role(SessionRole::TransferSourcePending);
        self.send(Outbound::TransferReady(TransferSnapshotPayload {
            transfer_id: payload.transfer_id.clone(),
            state,
            queue,
        }));
        self.emitter.emit_transfer(TransferEvent::Preparing {
            transfer_id: payload.transfer_id,
            target_device_name: payload.target_device_name,
            timestamp: self.now(),
        });
    }

    async fn on_become_output(&mut self, payload: TransferSnapshotPayload) {
        if self.role.owns_state() {
            log::warn!(
                "[Engine] become_audio_device {} while {}, ignoring",
                payload.transfer_id,
                self.role
            );
            return;
        }
        if !self.transfers.begin_target(&payload.transfer_id, self.now()) {
            log::warn!(
                "[Engine] become_audio_device {} conflicts with transfer in flight",
                payload.transfer_id
            );
            return;
        }
        self.interpolator.stop();
        self.set_role(SessionRole::TransferTargetPending);
        log::info!(
            "[Engine] Applying snapshot for transfer {} ({:.1}s, playing={})",
            payload.transfer_id,
            payload.state.position,
            payload.state.is_playing
        );

        let timeout = self.config.transfer_timeout();
        let applied = tokio::time::timeout(
            timeout,
            self.player.apply_snapshot(&payload.state, &payload.queue),
        )
        .await;
        let failure = match applied {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("output not ready after {}ms", timeout.as_millis())),
        };

        let Some(handshake) = self.transfers.take() else {
            return;
        };
        match failure {
            None => {
                self.send(Outbound::TransferComplete(TransferIdPayload {
                    transfer_id: handshake.transfer_id.clone(),
                }));
                self.registration_pending = true;
                self.enter_local_output();
                log::info!("[Engine] Transfer {} complete, now output", handshake.transfer_id);
                self.emitter.emit_transfer(TransferEvent::Completed {
                    transfer_id: handshake.transfer_id,
                    role: TransferRole::Target,
                    timestamp: self.now(),
                });
            }
            Some(reason) => {
                log::warn!(
                    "[Engine] Could not apply transfer {}: {}",
                    handshake.transfer_id,
                    reason
                );
                self.release_local_audio().await;
                self.fall_back_to_registry();
                self.emit_aborted(&handshake, &reason);
            }
        }
    }

    async fn on_transfer_complete(&mut self, payload: TransferIdPayload) {
        if self.transfers.role() != Some(TransferRole::Source) {
            log::debug!(
                "[Engine] transfer_complete {} but not a source, ignoring",
                payload.transfer_id
            );
            return;
        }
        match self.transfers.take_if(&payload.transfer_id) {
            Some(handshake) => self.complete_source(handshake).await,
            None => log::debug!(
                "[Engine] transfer_complete for unknown transfer {}",
                payload.transfer_id
            ),
        }
    }

    /// Source side of a finished hand-off: release audio, mirror the target.
    async fn complete_source(&mut self, handshake: TransferHandshake) {
        if let Err(e) = self.player.stop_and_reset().await {
            log::warn!("[Engine] Failed to stop output after transfer: {}", e);
        }
        if let Some((state, queue)) = handshake.snapshot.clone() {
            self.remote_queue_version = state.queue_version;
            self.remote_queue = queue;
            self.interpolator.set_anchor(Anchor::from_state(&state));
            self.remote_state = Some(state);
        }
        self.enter_remote_controller();
        log::info!(
            "[Engine] Transfer {} complete, now controller",
            handshake.transfer_id
        );
        self.emitter.emit_transfer(TransferEvent::Completed {
            transfer_id: handshake.transfer_id,
            role: TransferRole::Source,
            timestamp: self.now(),
        });
    }

    /// Local deadline for an unresolved hand-off. Treated like a received abort.
    pub async fn on_transfer_timeout(&mut self, transfer_id: &str) {
        if let Some(handshake) = self.transfers.take_if(transfer_id) {
            log::warn!(
                "[Engine] Transfer {} unresolved after {}ms",
                transfer_id,
                self.config.transfer_timeout_ms
            );
            self.abort_handshake(handshake, "timeout").await;
        }
    }

    async fn abort_handshake(&mut self, handshake: TransferHandshake, reason: &str) {
        log::warn!(
            "[Engine] Transfer {} aborted as {:?}: {}",
            handshake.transfer_id,
            handshake.role,
            reason
        );
        match handshake.role {
            TransferRole::Source => {
                if handshake.resume_on_abort {
                    self.player.resume_output().await;
                }
                self.enter_local_output();
            }
            TransferRole::Target => {
                self.release_local_audio().await;
                self.fall_back_to_registry();
            }
            TransferRole::Requester => self.fall_back_to_registry(),
        }
        self.emit_aborted(&handshake, reason);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Local commands
    // ─────────────────────────────────────────────────────────────────────

    pub async fn on_command(&mut self, command: SessionCommand) {
        if self.connection != ConnectionStatus::Connected {
            log::info!("[Engine] Not connected, dropping {:?}", command);
            return;
        }
        match command {
            SessionCommand::Player(command) => self.on_player_command(command).await,
            SessionCommand::BecomeOutput => self.request_output(),
            SessionCommand::ReleaseOutput => self.release_output().await,
        }
    }

    async fn on_player_command(&mut self, command: PlayerCommand) {
        match self.role {
            SessionRole::LocalOutput => self.apply_as_output(command).await,
            SessionRole::RemoteController => {
                let (name, payload) = command.to_remote();
                log::debug!("[Engine] Routing {} to output device", name);
                self.send(Outbound::Command(CommandPayload {
                    command: name,
                    payload,
                    target_device_id: self.registry.output_device_id(),
                }));
            }
            SessionRole::Idle => match self.player.apply(command).await {
                Ok(_) if self.player.is_playing() => {
                    log::info!("[Engine] Playback started with no session, registering as output");
                    self.register_as_output();
                }
                Ok(_) => {}
                Err(e) => log::warn!("[Engine] Command failed: {}", e),
            },
            SessionRole::TransferSourcePending | SessionRole::TransferTargetPending => {
                log::info!("[Engine] Hand-off in progress, dropping {}", command.name());
            }
        }
    }

    async fn apply_as_output(&mut self, command: PlayerCommand) {
        let name = command.name();
        match self.player.apply(command).await {
            Ok(Some(mutation)) => self.publish(mutation),
            Ok(None) => log::debug!("[Engine] {} changed nothing", name),
            Err(e) => log::warn!("[Engine] Command {} failed: {}", name, e),
        }
    }

    fn request_output(&mut self) {
        match self.role {
            SessionRole::LocalOutput => log::debug!("[Engine] Already the output device"),
            SessionRole::TransferSourcePending | SessionRole::TransferTargetPending => {
                log::info!("[Engine] Hand-off already in progress");
            }
            SessionRole::Idle | SessionRole::RemoteController => {
                let Some(output) = self.other_output() else {
                    if !self.player.has_track() && self.player.queue().is_empty() {
                        log::info!("[Engine] No active output and nothing loaded, not registering");
                        return;
                    }
                    log::info!("[Engine] No active output, registering directly");
                    self.register_as_output();
                    return;
                };
                let now = self.now();
                let Some(handshake) = self.transfers.begin_request(now) else {
                    log::info!("[Engine] Transfer already in flight");
                    return;
                };
                let transfer_id = handshake.transfer_id.clone();
                log::info!(
                    "[Engine] Requesting output role from device {} (transfer {})",
                    output,
                    transfer_id
                );
                self.send(Outbound::Command(CommandPayload {
                    command: REQUEST_TRANSFER_COMMAND.to_string(),
                    payload: json!({ "transfer_id": transfer_id }),
                    target_device_id: Some(output),
                }));
                self.set_role(SessionRole::TransferTargetPending);
                self.emitter.emit_transfer(TransferEvent::Requested {
                    transfer_id,
                    timestamp: now,
                });
            }
        }
    }

    async fn release_output(&mut self) {
        if self.role != SessionRole::LocalOutput {
            log::debug!("[Engine] Not the output device, nothing to release");
            return;
        }
        log::info!("[Engine] Releasing output role");
        self.send(Outbound::UnregisterAudioDevice);
        self.scheduler.stop();
        self.release_local_audio().await;
        self.registration_pending = false;
        self.set_role(SessionRole::Idle);
    }

    fn register_as_output(&mut self) {
        self.send(Outbound::RegisterAudioDevice);
        self.registration_pending = true;
        self.enter_local_output();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Adapter events and timers
    // ─────────────────────────────────────────────────────────────────────

    pub async fn on_output_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Progress { position, .. } => self.player.on_progress(position),
            OutputEvent::TrackLoaded { duration } => {
                if self.player.on_track_loaded(duration) && self.role == SessionRole::LocalOutput
                {
                    self.publish(Mutation::Transport);
                }
            }
            OutputEvent::TrackEnded => {
                if self.role != SessionRole::LocalOutput {
                    return;
                }
                match self.player.on_track_end().await {
                    Ok(Some(mutation)) => self.publish(mutation),
                    Ok(None) => {}
                    Err(e) => log::warn!("[Engine] Failed to advance after track end: {}", e),
                }
            }
        }
    }

    /// Heartbeat tick: re-broadcast state while playing.
    pub fn on_heartbeat(&mut self) {
        if self.role != SessionRole::LocalOutput {
            return;
        }
        let plan = self.scheduler.on_tick(self.player.is_playing());
        self.broadcast(plan);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Role transitions
    // ─────────────────────────────────────────────────────────────────────

    fn enter_local_output(&mut self) {
        self.interpolator.clear();
        self.clear_remote_cache();
        self.set_role(SessionRole::LocalOutput);
        let plan = self.scheduler.start();
        self.broadcast(plan);
    }

    fn enter_remote_controller(&mut self) {
        self.set_role(SessionRole::RemoteController);
        self.interpolator.start();
    }

    /// Role after a failed or abandoned attempt at the output role.
    fn fall_back_to_registry(&mut self) {
        if self.other_output().is_some() {
            self.enter_remote_controller();
        } else {
            self.interpolator.clear();
            self.set_role(SessionRole::Idle);
        }
    }

    async fn release_local_audio(&mut self) {
        if !self.player.has_track() && self.player.queue().is_empty() {
            return;
        }
        if let Err(e) = self.player.stop_and_reset().await {
            log::warn!("[Engine] Failed to stop local output: {}", e);
        }
    }

    fn other_output(&self) -> Option<DeviceId> {
        self.registry
            .output_device_id()
            .filter(|id| Some(*id) != self.registry.my_id())
    }

    fn set_role(&mut self, role: SessionRole) {
        if self.role == role {
            return;
        }
        log::info!("[Engine] Role {} -> {}", self.role, role);
        let from = std::mem::replace(&mut self.role, role);
        self.emitter.emit_session(SessionEvent::RoleChanged {
            from,
            to: role,
            timestamp: self.now(),
        });
    }

    fn clear_remote_cache(&mut self) {
        self.remote_state = None;
        self.remote_queue.clear();
        self.remote_queue_version = 0;
        self.resync_requested = None;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Broadcasting
    // ─────────────────────────────────────────────────────────────────────

    fn publish(&mut self, mutation: Mutation) {
        let plan = self.scheduler.notify(mutation);
        self.broadcast(plan);
    }

    fn broadcast(&mut self, plan: BroadcastPlan) {
        if plan.queue {
            let queue_version = self.player.bump_queue_version();
            self.send(Outbound::QueueUpdate(QueuePayload {
                queue: self.player.queue().to_vec(),
                queue_version,
            }));
        }
        if plan.state {
            self.send(Outbound::State(self.player.snapshot()));
        }
    }

    fn send(&self, message: Outbound) {
        if self.connection == ConnectionStatus::Disconnected {
            log::debug!("[Engine] Offline, not sending {}", message.msg_type());
            return;
        }
        self.outbox.send(message);
    }

    fn emit_devices_changed(&self) {
        self.emitter.emit_session(SessionEvent::DevicesChanged {
            devices: self.registry.devices().to_vec(),
            output_device_id: self.registry.output_device_id(),
            timestamp: self.now(),
        });
    }

    fn emit_aborted(&self, handshake: &TransferHandshake, reason: &str) {
        self.emitter.emit_transfer(TransferEvent::Aborted {
            transfer_id: handshake.transfer_id.clone(),
            role: handshake.role,
            reason: reason.to_string(),
            timestamp: self.now(),
        });
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DeviceType, SessionEndedPayload, SessionInfo, TransferAbortedPayload};
    use crate::test_fixtures::{device, track, welcome, EngineHarness, OutputCall, T0};

    /// `A` (device 1) playing `t1` as the registered output.
    async fn playing_output() -> EngineHarness {
        let mut a = EngineHarness::new("A");
        a.connect(welcome(1, vec![device(1, "A", false, T0)])).await;
        a.engine
            .on_command(
                PlayerCommand::PlayTrack {
                    track_id: "t1".into(),
                }
                .into(),
            )
            .await;
        a.deliver_devices(vec![device(1, "A", true, T0), device(2, "B", false, T0 + 1)])
            .await;
        a.drain();
        a.output.clear();
        a
    }

    /// `B` (device 2) mirroring device 1.
    async fn controller() -> EngineHarness {
        let mut b = EngineHarness::new("B");
        b.connect(welcome(
            2,
            vec![device(1, "A", true, T0), device(2, "B", false, T0 + 1)],
        ))
        .await;
        b
    }

    fn remote_state(position: f64, queue_version: u64, timestamp: u64) -> PlaybackState {
        PlaybackState {
            current_track: Some(track("t1", 200.0)),
            position,
            is_playing: true,
            queue_version,
            timestamp,
            ..Default::default()
        }
    }

    fn sent_transfer_id(sent: &[Outbound]) -> String {
        sent.iter()
            .find_map(|m| match m {
                Outbound::Command(c) if c.command == REQUEST_TRANSFER_COMMAND => c
                    .payload
                    .get("transfer_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                _ => None,
            })
            .expect("request_transfer sent")
    }

    fn transfer_ready(sent: &[Outbound]) -> TransferSnapshotPayload {
        sent.iter()
            .find_map(|m| match m {
                Outbound::TransferReady(p) => Some(p.clone()),
                _ => None,
            })
            .expect("transfer_ready sent")
    }

    #[tokio::test]
    async fn legacy_relay_gets_old_device_class() {
        let mut h = EngineHarness::with_config(EngineConfig {
            device_name: "Phone".to_string(),
            device_type: DeviceType::Mobile,
            legacy_device_types: true,
            ..Default::default()
        });
        h.engine.on_transport_event(TransportEvent::Connected).await;
        match h.drain().as_slice() {
            [Outbound::Hello(hello)] => assert_eq!(hello.device_type, "android"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn hello_then_welcome_sets_identity() {
        let mut h = EngineHarness::new("Kitchen");
        h.engine.on_transport_event(TransportEvent::Connected).await;
        assert_eq!(h.engine.connection(), ConnectionStatus::Handshaking);
        assert!(h.engine.hello_retry_active());
        match h.drain().as_slice() {
            [Outbound::Hello(hello)] => {
                assert_eq!(hello.device_name, "Kitchen");
                assert_eq!(hello.device_type, "desktop");
            }
            other => panic!("unexpected {other:?}"),
        }

        h.deliver(Inbound::Welcome(welcome(3, vec![device(3, "Kitchen", false, T0)])))
            .await;
        assert_eq!(h.engine.connection(), ConnectionStatus::Connected);
        assert_eq!(h.engine.registry().my_id(), Some(DeviceId(3)));
        assert_eq!(h.engine.role(), SessionRole::Idle);
        assert!(!h.engine.hello_retry_active());
    }

    #[tokio::test]
    async fn frames_before_welcome_are_dropped() {
        let mut h = EngineHarness::new("B");
        h.engine.on_transport_event(TransportEvent::Connected).await;
        h.engine
            .on_frame(r#"{"type":"playback.state","payload":{"queue_version":1,"position":3.0,"is_playing":true,"timestamp":1}}"#)
            .await;
        assert!(h.engine.remote_state().is_none());

        h.engine.on_hello_retry();
        assert_eq!(h.drain_types(), vec!["playback.hello", "playback.hello"]);
    }

    #[tokio::test]
    async fn garbage_frames_are_ignored() {
        let mut b = controller().await;
        b.engine.on_frame("not json").await;
        b.engine.on_frame(r#"{"type":"playback.mystery","payload":{}}"#).await;
        b.engine.on_frame(r#"{"type":"playback.state","payload":{"position":"x"}}"#).await;
        assert_eq!(b.engine.role(), SessionRole::RemoteController);
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn become_output_with_nothing_loaded_stays_idle() {
        let mut a = EngineHarness::new("A");
        a.connect(welcome(1, vec![device(1, "A", false, T0)])).await;
        a.engine.on_command(SessionCommand::BecomeOutput).await;

        assert_eq!(a.engine.role(), SessionRole::Idle);
        assert!(!a.engine.is_registration_pending());
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn become_output_with_loaded_queue_registers_directly() {
        let mut a = EngineHarness::new("A");
        a.connect(welcome(1, vec![device(1, "A", false, T0)])).await;
        a.engine
            .player
            .apply(PlayerCommand::AddToQueue {
                track_ids: vec!["t1".into(), "t2".into()],
            })
            .await
            .unwrap();
        assert_eq!(a.engine.role(), SessionRole::Idle);

        a.engine.on_command(SessionCommand::BecomeOutput).await;

        assert_eq!(a.engine.role(), SessionRole::LocalOutput);
        assert!(a.drain_types().contains(&"playback.register_audio_device"));
    }

    #[tokio::test]
    async fn idle_play_registers_as_output() {
        let mut a = EngineHarness::new("A");
        a.connect(welcome(1, vec![device(1, "A", false, T0)])).await;
        a.engine
            .on_command(
                PlayerCommand::PlayTrack {
                    track_id: "t1".into(),
                }
                .into(),
            )
            .await;

        assert_eq!(a.engine.role(), SessionRole::LocalOutput);
        assert!(a.engine.is_registration_pending());
        assert_eq!(
            a.drain_types(),
            vec![
                "playback.register_audio_device",
                "playback.queue_update",
                "playback.state"
            ]
        );

        // Not listed yet: tolerated while the registration is pending.
        a.deliver_devices(vec![device(1, "A", false, T0)]).await;
        assert_eq!(a.engine.role(), SessionRole::LocalOutput);

        a.deliver_devices(vec![device(1, "A", true, T0)]).await;
        assert!(!a.engine.is_registration_pending());
        assert!(a.engine.heartbeat_active());
    }

    #[tokio::test]
    async fn welcome_with_active_output_becomes_controller() {
        let mut b = EngineHarness::new("B");
        let mut payload = welcome(2, vec![device(1, "A", true, T0), device(2, "B", false, T0)]);
        payload.session = SessionInfo {
            exists: true,
            state: Some(remote_state(10.0, 3, T0)),
            queue: Some(vec![QueueItem::new("t1", T0)]),
            audio_device_id: Some(DeviceId(1)),
            ..Default::default()
        };
        b.connect(payload).await;

        assert_eq!(b.engine.role(), SessionRole::RemoteController);
        assert!(b.engine.interpolation_active());
        assert_eq!(b.engine.remote_queue().len(), 1);

        b.clock.advance(2_000);
        let snapshot = b.engine.snapshot();
        assert_eq!(snapshot.estimated_position, Some(12.0));
        assert_eq!(snapshot.output_device_id, Some(DeviceId(1)));
        assert!(snapshot.is_playing());
    }

    #[tokio::test]
    async fn controller_requests_queue_once_per_version() {
        let mut b = EngineHarness::new("B");
        let mut payload = welcome(2, vec![device(1, "A", true, T0), device(2, "B", false, T0)]);
        payload.session = SessionInfo {
            exists: true,
            state: Some(remote_state(0.0, 5, T0)),
            queue: Some(Vec::new()),
            ..Default::default()
        };
        b.connect(payload).await;

        b.deliver(Inbound::State(remote_state(1.0, 7, T0 + 1_000))).await;
        assert_eq!(b.drain(), vec![Outbound::RequestQueue]);

        // Same version again while the resync is outstanding.
        b.deliver(Inbound::State(remote_state(2.0, 7, T0 + 2_000))).await;
        assert!(b.drain().is_empty());

        b.deliver(Inbound::QueueSync(QueuePayload {
            queue: vec![QueueItem::new("t1", T0), QueueItem::new("t2", T0)],
            queue_version: 7,
        }))
        .await;
        b.deliver(Inbound::State(remote_state(3.0, 7, T0 + 3_000))).await;
        assert!(b.drain().is_empty());
        assert_eq!(b.engine.remote_queue().len(), 2);

        let resyncs = b
            .emitter
            .protocol_events()
            .into_iter()
            .filter(|e| matches!(e, ProtocolEvent::QueueResyncRequested { .. }))
            .count();
        assert_eq!(resyncs, 1);
    }

    #[tokio::test]
    async fn welcome_state_without_queue_requests_queue() {
        let mut b = EngineHarness::new("B");
        let mut payload = welcome(2, vec![device(1, "A", true, T0), device(2, "B", false, T0)]);
        payload.session = SessionInfo {
            exists: true,
            state: Some(remote_state(10.0, 5, T0)),
            queue: None,
            audio_device_id: Some(DeviceId(1)),
            ..Default::default()
        };
        b.engine.on_transport_event(TransportEvent::Connected).await;
        b.drain();
        b.engine.on_inbound(Inbound::Welcome(payload)).await;

        assert_eq!(b.engine.role(), SessionRole::RemoteController);
        assert_eq!(b.drain(), vec![Outbound::RequestQueue]);
        assert!(b.engine.remote_queue().is_empty());

        // Heartbeats at the same version do not repeat the request.
        for i in 1..=3 {
            b.deliver(Inbound::State(remote_state(10.0 + i as f64, 5, T0 + i * 1_000)))
                .await;
        }
        assert!(b.drain().is_empty());

        b.deliver(Inbound::QueueSync(QueuePayload {
            queue: vec![QueueItem::new("t1", T0)],
            queue_version: 5,
        }))
        .await;
        assert_eq!(b.engine.remote_queue().len(), 1);
        b.deliver(Inbound::State(remote_state(15.0, 5, T0 + 5_000))).await;
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn repeated_state_leaves_controller_unchanged() {
        let mut b = controller().await;
        let state = remote_state(42.0, 0, T0);
        b.deliver(Inbound::State(state.clone())).await;
        let first = b.engine.snapshot();
        b.deliver(Inbound::State(state)).await;
        assert_eq!(b.engine.snapshot(), first);
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn output_ignores_foreign_state() {
        let mut a = playing_output().await;
        a.deliver(Inbound::State(remote_state(99.0, 50, T0))).await;
        assert_eq!(a.engine.player().queue_version(), 1);
        assert!(a.engine.player().position() < 1.0);
    }

    #[tokio::test]
    async fn heartbeat_only_repeats_state_while_playing() {
        let mut a = playing_output().await;
        a.engine.on_heartbeat();
        assert_eq!(a.drain_types(), vec!["playback.state"]);

        a.engine
            .on_command(PlayerCommand::Pause.into())
            .await;
        assert_eq!(a.drain_types(), vec!["playback.state"]);

        a.engine.on_heartbeat();
        a.engine.on_heartbeat();
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn controller_routes_commands_to_output() {
        let mut b = controller().await;
        b.engine
            .on_command(PlayerCommand::Seek { position: 42.0 }.into())
            .await;
        match b.drain().as_slice() {
            [Outbound::Command(c)] => {
                assert_eq!(c.command, "seek");
                assert_eq!(c.payload, json!({"position": 42.0}));
                assert_eq!(c.target_device_id, Some(DeviceId(1)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(b.output.calls().is_empty());
    }

    #[tokio::test]
    async fn output_applies_remote_commands() {
        let mut a = playing_output().await;
        a.engine
            .on_frame(r#"{"type":"playback.command","payload":{"command":"seek","payload":{"position":42.0}}}"#)
            .await;
        assert_eq!(a.output.calls(), vec![OutputCall::Seek(42.0)]);
        match a.drain().as_slice() {
            [Outbound::State(state)] => assert_eq!(state.position, 42.0),
            other => panic!("unexpected {other:?}"),
        }

        a.deliver(Inbound::Command(CommandPayload {
            command: "warp".into(),
            payload: json!({}),
            target_device_id: None,
        }))
        .await;
        a.deliver(Inbound::Command(CommandPayload {
            command: REQUEST_TRANSFER_COMMAND.into(),
            payload: json!({"transfer_id": "x"}),
            target_device_id: None,
        }))
        .await;
        assert!(a.drain().is_empty());
        assert_eq!(a.engine.role(), SessionRole::LocalOutput);
    }

    #[tokio::test]
    async fn commands_are_dropped_while_offline() {
        let mut h = EngineHarness::new("A");
        h.engine.on_command(PlayerCommand::Play.into()).await;
        assert!(h.drain().is_empty());
        assert!(h.output.calls().is_empty());
    }

    #[tokio::test]
    async fn full_handoff_moves_output_between_devices() {
        let mut a = playing_output().await;
        let mut b = controller().await;
        a.clock.advance(30_000);
        b.clock.advance(30_000);

        b.engine.on_command(SessionCommand::BecomeOutput).await;
        assert_eq!(b.engine.role(), SessionRole::TransferTargetPending);
        let requested = b.drain();
        let transfer_id = sent_transfer_id(&requested);

        a.deliver(Inbound::PrepareTransfer(PrepareTransferPayload {
            transfer_id: transfer_id.clone(),
            target_device_id: Some(DeviceId(2)),
            target_device_name: "B".into(),
        }))
        .await;
        assert_eq!(a.engine.role(), SessionRole::TransferSourcePending);
        assert_eq!(a.output.calls(), vec![OutputCall::Pause]);
        assert!(!a.engine.heartbeat_active());
        let ready = transfer_ready(&a.drain());
        assert_eq!(ready.transfer_id, transfer_id);
        assert_eq!(ready.state.position, 30.0);
        assert!(ready.state.is_playing);

        // Source is silent before the target starts.
        a.engine.on_heartbeat();
        assert!(a.drain().is_empty());

        b.deliver(Inbound::BecomeAudioDevice(ready)).await;
        assert_eq!(b.engine.role(), SessionRole::LocalOutput);
        assert_eq!(
            b.output.calls(),
            vec![
                OutputCall::Load {
                    track_id: "t1".into(),
                    autoplay: false
                },
                OutputCall::Seek(30.0),
                OutputCall::Volume(1.0),
                OutputCall::Muted(false),
                OutputCall::Play,
            ]
        );
        let sent = b.drain();
        assert_eq!(
            sent[0],
            Outbound::TransferComplete(TransferIdPayload {
                transfer_id: transfer_id.clone()
            })
        );
        let versions: Vec<u64> = sent
            .iter()
            .filter_map(|m| match m {
                Outbound::QueueUpdate(q) => Some(q.queue_version),
                _ => None,
            })
            .collect();
        assert_eq!(versions, vec![2]);

        a.deliver(Inbound::TransferComplete(TransferIdPayload {
            transfer_id: transfer_id.clone(),
        }))
        .await;
        assert_eq!(a.engine.role(), SessionRole::RemoteController);
        assert_eq!(a.output.calls().last(), Some(&OutputCall::Stop));
        assert!(!a.engine.player().has_track());

        let devices = vec![device(1, "A", false, T0), device(2, "B", true, T0 + 1)];
        a.deliver_devices(devices.clone()).await;
        b.deliver_devices(devices).await;
        assert_eq!(a.engine.role(), SessionRole::RemoteController);
        assert_eq!(b.engine.role(), SessionRole::LocalOutput);
        assert!(a.engine.active_transfer().is_none());
        assert!(b.engine.active_transfer().is_none());

        let completed = |h: &EngineHarness| {
            h.emitter
                .transfer_events()
                .into_iter()
                .any(|e| matches!(e, TransferEvent::Completed { .. }))
        };
        assert!(completed(&a));
        assert!(completed(&b));
    }

    #[tokio::test]
    async fn requester_timeout_falls_back_to_controller() {
        let mut b = controller().await;
        b.engine.on_command(SessionCommand::BecomeOutput).await;
        let transfer_id = sent_transfer_id(&b.drain());

        b.engine.on_transfer_timeout("someone-else").await;
        assert_eq!(b.engine.role(), SessionRole::TransferTargetPending);

        b.engine.on_transfer_timeout(&transfer_id).await;
        assert_eq!(b.engine.role(), SessionRole::RemoteController);
        assert!(b.engine.active_transfer().is_none());
        assert!(b.emitter.transfer_events().iter().any(|e| matches!(
            e,
            TransferEvent::Aborted { reason, role: TransferRole::Requester, .. } if reason == "timeout"
        )));
    }

    #[tokio::test]
    async fn source_timeout_resumes_playback() {
        let mut a = playing_output().await;
        a.deliver(Inbound::PrepareTransfer(PrepareTransferPayload {
            transfer_id: "xfer-1".into(),
            target_device_id: Some(DeviceId(2)),
            target_device_name: "B".into(),
        }))
        .await;
        a.drain();

        a.engine.on_transfer_timeout("xfer-1").await;
        assert_eq!(a.engine.role(), SessionRole::LocalOutput);
        assert!(a.engine.player().is_playing());
        assert_eq!(a.output.calls(), vec![OutputCall::Pause, OutputCall::Play]);
        assert_eq!(
            a.drain_types(),
            vec!["playback.queue_update", "playback.state"]
        );
    }

    #[tokio::test]
    async fn relay_abort_keeps_paused_source_paused() {
        let mut a = playing_output().await;
        a.engine.on_command(PlayerCommand::Pause.into()).await;
        a.deliver(Inbound::PrepareTransfer(PrepareTransferPayload {
            transfer_id: "xfer-2".into(),
            target_device_id: None,
            target_device_name: "B".into(),
        }))
        .await;
        a.deliver(Inbound::TransferAborted(TransferAbortedPayload {
            transfer_id: "xfer-2".into(),
            reason: "target_disconnected".into(),
        }))
        .await;
        assert_eq!(a.engine.role(), SessionRole::LocalOutput);
        assert!(!a.engine.player().is_playing());
        assert!(!a.output.calls().contains(&OutputCall::Play));
    }

    #[tokio::test]
    async fn failed_snapshot_apply_aborts_target() {
        let mut b = controller().await;
        b.output.fail_loads(true);
        b.deliver(Inbound::BecomeAudioDevice(TransferSnapshotPayload {
            transfer_id: "xfer-3".into(),
            state: remote_state(5.0, 1, T0),
            queue: vec![QueueItem::new("t1", T0)],
        }))
        .await;

        assert_eq!(b.engine.role(), SessionRole::RemoteController);
        assert!(!b
            .drain()
            .iter()
            .any(|m| matches!(m, Outbound::TransferComplete(_))));
        assert!(b
            .emitter
            .transfer_events()
            .iter()
            .any(|e| matches!(e, TransferEvent::Aborted { role: TransferRole::Target, .. })));
    }

    #[tokio::test]
    async fn second_prepare_is_ignored_mid_handoff() {
        let mut a = playing_output().await;
        for id in ["first", "second"] {
            a.deliver(Inbound::PrepareTransfer(PrepareTransferPayload {
                transfer_id: id.into(),
                target_device_id: None,
                target_device_name: "B".into(),
            }))
            .await;
        }
        assert_eq!(a.engine.active_transfer().map(|h| h.transfer_id.as_str()), Some("first"));
        assert_eq!(a.drain_types(), vec!["playback.transfer_ready"]);
    }

    #[tokio::test]
    async fn reconnect_reclaims_output_paused() {
        let mut a = playing_output().await;
        a.clock.advance(20_000);

        a.engine.on_transport_event(TransportEvent::Disconnected).await;
        assert_eq!(a.engine.role(), SessionRole::Idle);
        assert_eq!(a.engine.connection(), ConnectionStatus::Disconnected);
        assert!(a.engine.player().has_track());
        assert!(!a.engine.player().is_playing());
        assert_eq!(a.output.calls(), vec![OutputCall::Pause]);

        a.engine.on_transport_event(TransportEvent::Connected).await;
        let mut payload = welcome(7, vec![device(7, "A", false, T0 + 30_000)]);
        payload.session = SessionInfo {
            exists: true,
            reclaimable: Some(true),
            ..Default::default()
        };
        a.deliver(Inbound::Welcome(payload)).await;

        let sent = a.drain();
        let types: Vec<_> = sent.iter().map(Outbound::msg_type).collect();
        assert_eq!(
            types,
            vec![
                "playback.hello",
                "playback.reclaim_audio_device",
                "playback.queue_update",
                "playback.state"
            ]
        );
        match &sent[1] {
            Outbound::ReclaimAudioDevice(state) => {
                assert!(!state.is_playing);
                assert_eq!(state.position, 20.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(a.engine.role(), SessionRole::LocalOutput);
        assert!(!a.engine.player().is_playing());
        assert_eq!(a.engine.registry().my_id(), Some(DeviceId(7)));
    }

    #[tokio::test]
    async fn output_steps_down_when_relay_names_another() {
        let mut a = playing_output().await;
        a.deliver_devices(vec![device(1, "A", false, T0), device(2, "B", true, T0 + 1)])
            .await;
        assert_eq!(a.engine.role(), SessionRole::RemoteController);
        assert!(!a.engine.heartbeat_active());
        assert_eq!(a.output.calls(), vec![OutputCall::Stop]);
    }

    #[tokio::test]
    async fn controller_goes_idle_when_output_leaves() {
        let mut b = controller().await;
        b.deliver(Inbound::State(remote_state(3.0, 0, T0))).await;
        b.deliver_devices(vec![device(2, "B", false, T0 + 1)]).await;
        assert_eq!(b.engine.role(), SessionRole::Idle);
        assert!(b.engine.snapshot().playback.is_none());
    }

    #[tokio::test]
    async fn controller_takes_over_when_listed_as_output() {
        let mut b = controller().await;
        b.deliver(Inbound::State(remote_state(50.0, 0, T0))).await;
        b.deliver_devices(vec![device(2, "B", true, T0 + 1)]).await;
        assert_eq!(b.engine.role(), SessionRole::LocalOutput);
        assert!(b.engine.player().has_track());
        assert!(!b.engine.player().is_playing());
        assert!(!b.output.calls().contains(&OutputCall::Play));
    }

    #[tokio::test]
    async fn rejected_registration_demotes_to_idle() {
        let mut a = EngineHarness::new("A");
        a.connect(welcome(1, vec![device(1, "A", false, T0)])).await;
        a.engine
            .on_command(
                PlayerCommand::PlayTrack {
                    track_id: "t2".into(),
                }
                .into(),
            )
            .await;
        a.deliver(Inbound::RegisterAck(RegisterAckPayload {
            success: false,
            error: Some("audio device already registered".into()),
        }))
        .await;
        assert_eq!(a.engine.role(), SessionRole::Idle);
        assert!(!a.engine.player().is_playing());
        assert!(!a.engine.is_registration_pending());
    }

    #[tokio::test]
    async fn session_end_releases_everything() {
        let mut a = playing_output().await;
        a.deliver(Inbound::SessionEnded(SessionEndedPayload {
            reason: "all_devices_left".into(),
        }))
        .await;
        assert_eq!(a.engine.role(), SessionRole::Idle);
        assert!(!a.engine.player().has_track());
        assert!(!a.engine.heartbeat_active());
        assert_eq!(a.output.calls(), vec![OutputCall::Stop]);
    }

    #[tokio::test]
    async fn release_output_unregisters() {
        let mut a = playing_output().await;
        a.engine.on_command(SessionCommand::ReleaseOutput).await;
        assert_eq!(a.engine.role(), SessionRole::Idle);
        assert_eq!(a.drain_types(), vec!["playback.unregister_audio_device"]);
    }

    #[tokio::test]
    async fn track_end_advances_and_broadcasts() {
        let mut a = EngineHarness::new("A");
        a.connect(welcome(1, vec![device(1, "A", false, T0)])).await;
        a.engine
            .on_command(
                PlayerCommand::LoadQueue {
                    track_ids: vec!["t1".into(), "t2".into()],
                    start_index: 0,
                }
                .into(),
            )
            .await;
        a.drain();

        a.engine.on_output_event(OutputEvent::TrackEnded).await;
        let state = a.engine.player().snapshot();
        assert_eq!(state.current_track.map(|t| t.id), Some("t2".to_string()));
        assert!(a.drain_types().contains(&"playback.state"));
    }

    #[tokio::test]
    async fn relay_error_is_surfaced() {
        let mut b = controller().await;
        b.engine
            .on_frame(r#"{"type":"error","payload":{"code":"not_audio_device","message":"nope"}}"#)
            .await;
        assert!(b
            .emitter
            .protocol_events()
            .iter()
            .any(|e| matches!(e, ProtocolEvent::RelayError { code, .. } if code == "not_audio_device")));
    }
}
