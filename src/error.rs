//! Error types for netmux
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using NetError
pub type Result<T> = std::result::Result<T, NetError>;

/// Unified error type for netmux operations
#[derive(Debug, Error)]
pub enum NetError {
    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("name already in use: {0}")]
    NameConflict(String),

    #[error("no record named: {0}")]
    NotFound(String),

    #[error("already closed: {0}")]
    AlreadyClosed(String),

    // -------------------------------------------------------------------------
    // Transport Setup Errors
    // -------------------------------------------------------------------------
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Steady-State Errors
    // -------------------------------------------------------------------------
    #[error("connection is closed: {0}")]
    NotConnected(String),

    #[error("declared frame length {declared} exceeds maximum {max}")]
    FrameTooLarge { declared: usize, max: usize },

    // -------------------------------------------------------------------------
    // Address Errors
    // -------------------------------------------------------------------------
    #[error("invalid address: {0}")]
    Addr(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
