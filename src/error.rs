//! # Error Types
//!
//! Error handling for the protocol engine.
//!
//! Every failure that can end a session is a [`ProtocolError`]. Errors fall
//! into a small number of classes that decide how the session is torn down:
//!
//! - **Protocol**: unknown packet id, malformed payload, packet invalid for the
//!   current state. The client is kicked with a generic reason.
//! - **Auth**: name collision, verifier rejection, protocol version mismatch.
//!   The client is kicked with the specific reason.
//! - **Transport**: socket read/write failures. The session is closed silently.
//! - **Compression**: world streaming failures. Kicked with an error-coded reason.
//!
//! Capability mismatches are never errors; the packet registry resolves them.
//!
//! ## Example Usage
//! ```rust
//! use voxel_protocol::error::{ErrorClass, ProtocolError};
//!
//! let err = ProtocolError::UnknownPacket(0xFE);
//! assert_eq!(err.class(), ErrorClass::Protocol);
//! assert!(err.kick_reason().is_some());
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Reason strings sent to clients and static error messages.
/// Borrowed statics keep the kick path allocation-free for common cases.
pub mod constants {
    /// Registry lock errors
    pub const ERR_REGISTRY_WRITE_LOCK: &str = "Failed to acquire write lock on packet registry";
    pub const ERR_REGISTRY_READ_LOCK: &str = "Failed to acquire read lock on packet registry";

    /// Kick reasons
    pub const KICK_NO_REASON: &str = "Kicked without reason";
    pub const KICK_NAME_IN_USE: &str = "This name is already in use";
    pub const KICK_AUTH_FAILED: &str = "Authorization failed";
    pub const KICK_SERVER_FULL: &str = "Server is full";
    pub const KICK_TOO_MANY_CONNECTIONS: &str = "Too many connections from your IP";
    pub const KICK_SERVER_STOPPED: &str = "Server stopped";
    pub const KICK_INTERNAL: &str = "Internal server error";
    pub const KICK_UNKNOWN_BLOCK: &str = "Unknown block id";

    /// Chat replies
    pub const MSG_UNKNOWN_COMMAND: &str = "Unknown command.";
}

/// How a failure terminates the affected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Protocol,
    Auth,
    Transport,
    Compression,
    /// Setup and misuse errors that never reach a client.
    Internal,
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unknown packet id 0x{0:02X}")]
    UnknownPacket(u8),

    #[error("Malformed payload for packet 0x{0:02X}")]
    MalformedPayload(u8),

    #[error("Frame payload truncated: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("Invalid protocol version: expected {expected}, got {actual}")]
    UnsupportedVersion { expected: u8, actual: u8 },

    #[error("{0}")]
    AuthError(String),

    #[error("Compression error: {0}")]
    CompressionFailure(String),

    #[error("World error: {0}")]
    WorldError(String),

    #[error("Packet 0x{0:02X} is already registered")]
    DuplicatePacket(u8),

    #[error("Invalid packet registration: {0}")]
    InvalidRegistration(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Classify this error for session teardown.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProtocolError::Io(_) | ProtocolError::TransportError(_) | ProtocolError::ConnectionClosed => {
                ErrorClass::Transport
            }
            ProtocolError::UnknownPacket(_)
            | ProtocolError::MalformedPayload(_)
            | ProtocolError::Truncated { .. } => ErrorClass::Protocol,
            ProtocolError::UnsupportedVersion { .. } | ProtocolError::AuthError(_) => ErrorClass::Auth,
            ProtocolError::CompressionFailure(_) | ProtocolError::WorldError(_) => {
                ErrorClass::Compression
            }
            ProtocolError::DuplicatePacket(_)
            | ProtocolError::InvalidRegistration(_)
            | ProtocolError::ConfigError(_)
            | ProtocolError::Custom(_) => ErrorClass::Internal,
        }
    }

    /// The reason sent in a kick frame, or `None` when the session should be
    /// closed without one.
    pub fn kick_reason(&self) -> Option<String> {
        match self.class() {
            ErrorClass::Transport => None,
            ErrorClass::Protocol => Some(match self {
                ProtocolError::UnknownPacket(id) => format!("Unknown packet id: 0x{id:02X}"),
                ProtocolError::MalformedPayload(id) => {
                    format!("Packet reading error: unexpected packet 0x{id:02X}")
                }
                _ => String::from("Packet reading error"),
            }),
            ErrorClass::Auth | ErrorClass::Compression => Some(self.to_string()),
            ErrorClass::Internal => Some(constants::KICK_INTERNAL.to_string()),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
