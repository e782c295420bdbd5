//! Server records
//!
//! One record per listening socket. A TCP server owns the names of the
//! connections it accepted (the registry owns the records themselves); a
//! UDP server owns a FIFO of recently received datagrams.

use std::collections::VecDeque;
use std::net::{TcpListener, UdpSocket};

use crate::error::{NetError, Result};
use crate::message::Message;
use crate::registry::Protocol;

/// The listening transport handle owned by a server record
#[derive(Debug)]
pub(crate) enum ListenSocket {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

/// State for one listening socket
#[derive(Debug)]
pub(crate) struct ServerRecord {
    /// Registry key
    pub(crate) name: String,

    pub(crate) protocol: Protocol,

    /// Exclusively owned listen socket; dropped on close
    pub(crate) socket: Option<ListenSocket>,

    pub(crate) port: u16,

    /// Registry keys of accepted TCP connections, in accept order
    ///
    /// Non-owning back-references: the connection registry is the sole
    /// owner of the records.
    pub(crate) connections: Vec<String>,

    /// Connections accepted since the caller last checked; reset on read
    pub(crate) new_connections: usize,

    /// Datagrams received on a UDP listen socket, in arrival order
    pub(crate) inbound: VecDeque<Message>,
}

impl ServerRecord {
    /// Bind a listening socket on the given port
    ///
    /// A bind failure propagates without constructing a record, so the
    /// registry never holds a partially set up entry.
    pub(crate) fn bind(name: String, port: u16, protocol: Protocol) -> Result<Self> {
        // Port 0 asks the transport for an ephemeral port; the record keeps
        // the port actually bound either way
        let (socket, port) = match protocol {
            Protocol::Tcp => {
                let listener =
                    TcpListener::bind(("0.0.0.0", port)).map_err(|source| NetError::Bind { port, source })?;
                listener.set_nonblocking(true)?;
                let port = listener.local_addr()?.port();
                (ListenSocket::Tcp(listener), port)
            }
            Protocol::Udp => {
                let socket =
                    UdpSocket::bind(("0.0.0.0", port)).map_err(|source| NetError::Bind { port, source })?;
                socket.set_nonblocking(true)?;
                let port = socket.local_addr()?.port();
                (ListenSocket::Udp(socket), port)
            }
        };

        tracing::debug!(server = %name, port, ?protocol, "server listening");

        Ok(Self {
            name,
            protocol,
            socket: Some(socket),
            port,
            connections: Vec::new(),
            new_connections: 0,
            inbound: VecDeque::new(),
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Release the listen socket
    pub(crate) fn mark_closed(&mut self) {
        self.socket = None;
        tracing::debug!(server = %self.name, "server closed");
    }
}
