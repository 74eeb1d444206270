//! Event emitter abstraction for decoupling the engine from delivery.
//!
//! The engine depends on the [`EventEmitter`] trait rather than concrete
//! broadcast channels, enabling testing and alternative delivery.

use super::{ConnectionEvent, ProtocolEvent, SessionEvent, TransferEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct MyObserver {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyObserver {
///     fn on_welcome(&self, device_id: DeviceId) {
///         self.emitter.emit_connection(ConnectionEvent::Welcomed { ... });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a role or membership event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a hand-off event.
    fn emit_transfer(&self, event: TransferEvent);

    /// Emits a relay connection event.
    fn emit_connection(&self, event: ConnectionEvent);

    /// Emits a protocol notice.
    fn emit_protocol(&self, event: ProtocolEvent);
}

/// No-op emitter for embedders that only read snapshots.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {
        // No-op
    }

    fn emit_transfer(&self, _event: TransferEvent) {
        // No-op
    }

    fn emit_connection(&self, _event: ConnectionEvent) {
        // No-op
    }

    fn emit_protocol(&self, _event: ProtocolEvent) {
        // No-op
    }
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }

    fn emit_transfer(&self, event: TransferEvent) {
        tracing::debug!(?event, "transfer_event");
    }

    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }

    fn emit_protocol(&self, event: ProtocolEvent) {
        tracing::debug!(?event, "protocol_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        session_count: AtomicUsize,
        transfer_count: AtomicUsize,
    }

    impl CountingEventEmitter {
        fn new() -> Self {
            Self {
                session_count: AtomicUsize::new(0),
                transfer_count: AtomicUsize::new(0),
            }
        }
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_session(&self, _event: SessionEvent) {
            self.session_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_transfer(&self, _event: TransferEvent) {
            self.transfer_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_connection(&self, _event: ConnectionEvent) {}
        fn emit_protocol(&self, _event: ProtocolEvent) {}
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter::new());

        emitter.emit_session(SessionEvent::Ended {
            reason: "test".to_string(),
            timestamp: 0,
        });
        emitter.emit_session(SessionEvent::Ended {
            reason: "again".to_string(),
            timestamp: 0,
        });
        emitter.emit_transfer(TransferEvent::Requested {
            transfer_id: "t".to_string(),
            timestamp: 0,
        });

        assert_eq!(emitter.session_count.load(Ordering::SeqCst), 2);
        assert_eq!(emitter.transfer_count.load(Ordering::SeqCst), 1);
    }
}
