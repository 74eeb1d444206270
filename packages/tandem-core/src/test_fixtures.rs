//! Shared fakes for unit tests across the session modules.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::catalog::{StaticCatalog, TrackCatalog};
use crate::client::TransportEvent;
use crate::clock::ManualClock;
use crate::config::EngineConfig;
use crate::events::{
    BroadcastEvent, ConnectionEvent, EventEmitter, ProtocolEvent, SessionEvent, TransferEvent,
};
use crate::output::{LocalOutput, OutputError, OutputResult};
use crate::protocol::{
    Device, DeviceId, DeviceListPayload, DeviceType, Inbound, Outbound, SessionInfo, TrackRef,
    WelcomePayload,
};
use crate::session::{EngineDeps, Outbox, SessionEngine};

/// Start of every test clock (2024-01-01T00:00:00Z).
pub const T0: u64 = 1_704_067_200_000;

pub fn track(id: &str, duration: f64) -> TrackRef {
    TrackRef {
        title: format!("Track {id}"),
        artist_name: "Test Artist".to_string(),
        duration,
        ..TrackRef::unresolved(id)
    }
}

/// Catalog with `t1` (200s), `t2` (180s) and `t3` (240s).
pub fn sample_catalog() -> Arc<dyn TrackCatalog> {
    Arc::new(StaticCatalog::with_tracks([
        track("t1", 200.0),
        track("t2", 180.0),
        track("t3", 240.0),
    ]))
}

pub fn device(id: u64, name: &str, is_output: bool, connected_at: u64) -> Device {
    Device {
        id: DeviceId(id),
        name: name.to_string(),
        device_type: DeviceType::Desktop,
        is_output_device: is_output,
        connected_at,
    }
}

pub fn welcome(device_id: u64, devices: Vec<Device>) -> WelcomePayload {
    WelcomePayload {
        device_id: DeviceId(device_id),
        devices,
        session: SessionInfo::default(),
    }
}

/// One call made on [`RecordingOutput`].
#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Load { track_id: String, autoplay: bool },
    Play,
    Pause,
    Stop,
    Seek(f64),
    Volume(f64),
    Muted(bool),
}

/// Output adapter that records every call.
#[derive(Default)]
pub struct RecordingOutput {
    calls: Mutex<Vec<OutputCall>>,
    fail_loads: Mutex<bool>,
    fail_transport: Mutex<bool>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Makes every subsequent `load_track` fail.
    pub fn fail_loads(&self, fail: bool) {
        *self.fail_loads.lock() = fail;
    }

    /// Makes every subsequent `pause` and `seek_to` fail.
    pub fn fail_transport(&self, fail: bool) {
        *self.fail_transport.lock() = fail;
    }

    fn transport_failure(&self) -> OutputResult<()> {
        if *self.fail_transport.lock() {
            return Err(OutputError::Device("sink unplugged".to_string()));
        }
        Ok(())
    }

    fn record(&self, call: OutputCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl LocalOutput for RecordingOutput {
    async fn load_track(
        &self,
        track_id: &str,
        autoplay: bool,
        _seek_fraction: Option<f64>,
    ) -> OutputResult<()> {
        if *self.fail_loads.lock() {
            return Err(OutputError::TrackUnavailable(track_id.to_string()));
        }
        self.record(OutputCall::Load {
            track_id: track_id.to_string(),
            autoplay,
        });
        Ok(())
    }

    async fn play(&self) -> OutputResult<()> {
        self.record(OutputCall::Play);
        Ok(())
    }

    async fn pause(&self) -> OutputResult<()> {
        self.transport_failure()?;
        self.record(OutputCall::Pause);
        Ok(())
    }

    async fn stop(&self) -> OutputResult<()> {
        self.record(OutputCall::Stop);
        Ok(())
    }

    async fn seek_to(&self, position: f64) -> OutputResult<()> {
        self.transport_failure()?;
        self.record(OutputCall::Seek(position));
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> OutputResult<()> {
        self.record(OutputCall::Volume(volume));
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> OutputResult<()> {
        self.record(OutputCall::Muted(muted));
        Ok(())
    }
}

/// Emitter that keeps every event.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<BroadcastEvent>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<BroadcastEvent> {
        self.events.lock().clone()
    }

    pub fn transfer_events(&self) -> Vec<TransferEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BroadcastEvent::Transfer(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn protocol_events(&self) -> Vec<ProtocolEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BroadcastEvent::Protocol(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_session(&self, event: SessionEvent) {
        self.events.lock().push(event.into());
    }

    fn emit_transfer(&self, event: TransferEvent) {
        self.events.lock().push(event.into());
    }

    fn emit_connection(&self, event: ConnectionEvent) {
        self.events.lock().push(event.into());
    }

    fn emit_protocol(&self, event: ProtocolEvent) {
        self.events.lock().push(event.into());
    }
}

/// A [`SessionEngine`] wired to recording fakes and a manual clock.
pub struct EngineHarness {
    pub engine: SessionEngine,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub clock: Arc<ManualClock>,
    pub output: Arc<RecordingOutput>,
    pub emitter: Arc<RecordingEmitter>,
}

impl EngineHarness {
    pub fn new(name: &str) -> Self {
        Self::with_config(EngineConfig {
            device_name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let output = Arc::new(RecordingOutput::new());
        let emitter = Arc::new(RecordingEmitter::default());
        let (outbox, outbound) = Outbox::channel();
        let deps = EngineDeps {
            output: output.clone(),
            catalog: sample_catalog(),
            clock: clock.clone(),
            emitter: emitter.clone(),
        };
        Self {
            engine: SessionEngine::new(config, deps, outbox),
            outbound,
            clock,
            output,
            emitter,
        }
    }

    /// Opens the socket and completes the handshake. Drains the outbox.
    pub async fn connect(&mut self, welcome: WelcomePayload) {
        self.engine.on_transport_event(TransportEvent::Connected).await;
        self.engine.on_inbound(Inbound::Welcome(welcome)).await;
        self.drain();
    }

    pub async fn deliver(&mut self, message: Inbound) {
        self.engine.on_inbound(message).await;
    }

    pub async fn deliver_devices(&mut self, devices: Vec<Device>) {
        self.deliver(Inbound::DeviceListChanged(DeviceListPayload {
            devices,
            change: None,
        }))
        .await;
    }

    /// Everything sent since the last drain.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut sent = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            sent.push(message);
        }
        sent
    }

    pub fn drain_types(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(Outbound::msg_type).collect()
    }
}
