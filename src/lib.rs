//! # netmux
//!
//! A poll-driven connection and message multiplexing layer above raw
//! sockets:
//! - Named registries of servers and client connections
//! - Non-blocking accept of TCP connections and receipt of UDP datagrams
//! - Reassembly of length-framed application messages out of a TCP byte
//!   stream that may deliver partial or coalesced packets
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Caller tick                           │
//! │              (e.g. a render/update loop)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ poll()
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Dispatcher                              │
//! │     accept → read → frame → datagram, never blocking         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Servers   │          │ Connections │
//!   │ name → rec  │          │ name → rec  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Framer    │
//!                           │ [len][data] │
//!                           └─────────────┘
//! ```
//!
//! The dispatcher populates state; queries read it. That separation keeps
//! the caller in control of when blocking-sensitive work happens, which is
//! what makes single-threaded cooperative use possible.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod addr;
pub mod framing;
pub mod message;
pub mod registry;
pub mod dispatcher;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{NetError, Result};
pub use config::Config;
pub use dispatcher::PollStats;
pub use message::{Message, MessageOrigin};
pub use registry::{ConnectionInfo, ConnectionRef, ConnectionState, Network, Protocol, ServerInfo};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of netmux
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
