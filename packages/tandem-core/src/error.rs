//! Centralized error types for the Tandem core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps every error to a machine-readable code for logs and events
//!
//! None of these errors is fatal to a session. The engine logs and drops
//! anything it cannot apply; the worst reachable outcome is "no output device
//! currently selected".

use serde::Serialize;
use thiserror::Error;

use crate::client::TransportError;
use crate::output::OutputError;
use crate::protocol::ProtocolError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "invalid_frame",
            Self::UnknownType(_) => "unknown_message_type",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::Encode { .. } => "encode_failed",
        }
    }
}

impl ErrorCode for OutputError {
    fn code(&self) -> &'static str {
        match self {
            Self::TrackUnavailable(_) => "track_unavailable",
            Self::NotLoaded => "track_not_loaded",
            Self::Device(_) => "output_device_failed",
        }
    }
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect_failed",
            Self::Socket(_) => "socket_error",
            Self::Closed => "session_closed",
        }
    }
}

/// Application-wide error type for Tandem.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum TandemError {
    /// A relay frame could not be decoded or encoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The local output adapter rejected an operation.
    #[error("Output error: {0}")]
    Output(String),

    /// The relay connection failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A command name or payload was not understood.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Configuration values are out of range or missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The session actor is gone (shut down or panicked).
    #[error("Session closed: {0}")]
    SessionClosed(String),
}

impl TandemError {
    /// Returns a machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol_error",
            Self::Output(_) => "output_error",
            Self::Transport(_) => "transport_error",
            Self::InvalidCommand(_) => "invalid_command",
            Self::Configuration(_) => "configuration_error",
            Self::SessionClosed(_) => "session_closed",
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type TandemResult<T> = Result<T, TandemError>;

impl From<ProtocolError> for TandemError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<OutputError> for TandemError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

impl From<TransportError> for TandemError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}
