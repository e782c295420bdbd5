//! Registry Module
//!
//! Named registries of servers and client connections, wrapped in the
//! [`Network`] context object. All public operations refer to records by
//! stable string names rather than raw socket handles; the registry is the
//! sole owner of every record and every transport handle.
//!
//! ## Responsibilities
//! - Enforce name uniqueness among open records
//! - Create and tear down servers and connections
//! - Resolve name-or-index references to concrete records
//! - Expose the poll-populated queues and counters to the caller

mod connection;
mod server;

use std::collections::BTreeMap;

pub use connection::ConnectionState;

pub(crate) use connection::{ip_as_dec, ConnectionRecord, ConnectionSocket};
pub(crate) use server::{ListenSocket, ServerRecord};

use crate::addr::name_for_connection;
use crate::config::Config;
use crate::error::{NetError, Result};
use crate::message::Message;

/// Transport protocol of a server or connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Reference to a connection: by registry name, or by position within the
/// accept order of a named server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRef {
    Named(String),
    Indexed { server: String, index: usize },
}

impl From<&str> for ConnectionRef {
    fn from(name: &str) -> Self {
        ConnectionRef::Named(name.to_string())
    }
}

impl From<String> for ConnectionRef {
    fn from(name: String) -> Self {
        ConnectionRef::Named(name)
    }
}

impl From<(&str, usize)> for ConnectionRef {
    fn from((server, index): (&str, usize)) -> Self {
        ConnectionRef::Indexed {
            server: server.to_string(),
            index,
        }
    }
}

/// Read-only snapshot of a server record
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,
    pub connection_count: usize,
}

/// Read-only snapshot of a connection record
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub name: String,
    pub protocol: Protocol,
    pub state: ConnectionState,
    pub remote_ip: u32,
    pub remote_port: u16,
    pub fault: Option<String>,
}

/// The process-wide networking context
///
/// Owns both name-keyed registries and the configuration. One instance per
/// logical thread of control; all mutation goes through `&mut self`, so the
/// poll cycle and the open/close operations are the only writers.
///
/// `BTreeMap` keeps registry iteration deterministic, which fixes the order
/// in which one poll cycle visits sockets.
#[derive(Debug, Default)]
pub struct Network {
    pub(crate) servers: BTreeMap<String, ServerRecord>,
    pub(crate) connections: BTreeMap<String, ConnectionRecord>,
    pub(crate) config: Config,
}

impl Network {
    /// Create a context with default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a context with the given configuration
    pub fn with_config(config: Config) -> Self {
        Self {
            servers: BTreeMap::new(),
            connections: BTreeMap::new(),
            config,
        }
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Server Lifecycle
    // =========================================================================

    /// Create a named listening server on the given port
    ///
    /// Fails with [`NetError::NameConflict`] if an open server already owns
    /// the name and with [`NetError::Bind`] if the port cannot be bound; a
    /// bind failure never inserts a partial entry. Reusing the name of a
    /// previously closed server replaces the old entry.
    pub fn create_server(&mut self, name: &str, port: u16, protocol: Protocol) -> Result<()> {
        if self.servers.get(name).is_some_and(|s| s.is_open()) {
            return Err(NetError::NameConflict(name.to_string()));
        }

        let record = ServerRecord::bind(name.to_string(), port, protocol)?;
        self.servers.insert(name.to_string(), record);
        Ok(())
    }

    /// Close a named server
    ///
    /// Closes every accepted connection first (their records stay queryable
    /// as closed until explicitly removed), then releases the listen socket
    /// and removes the server entry. Closing an unknown or already closed
    /// name reports [`NetError::AlreadyClosed`], which is non-fatal.
    pub fn close_server(&mut self, name: &str) -> Result<()> {
        let mut record = self
            .servers
            .remove(name)
            .ok_or_else(|| NetError::AlreadyClosed(name.to_string()))?;

        for conn_name in &record.connections {
            if let Some(conn) = self.connections.get_mut(conn_name) {
                if conn.is_open() {
                    conn.mark_closed(None);
                }
            }
        }
        record.mark_closed();
        Ok(())
    }

    /// Close every server, releasing all listen sockets
    pub fn close_all_servers(&mut self) {
        let names: Vec<String> = self.servers.keys().cloned().collect();
        for name in names {
            let _ = self.close_server(&name);
        }
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    /// Open a client connection to `host:port`
    ///
    /// With `name: None` the registry key defaults to `"<host>:<port>"`.
    /// Fails with [`NetError::NameConflict`] if an open connection already
    /// owns the name and with [`NetError::Connect`] on transport failure.
    /// Returns the registry name of the new connection.
    pub fn open_connection(
        &mut self,
        name: Option<&str>,
        host: &str,
        port: u16,
        protocol: Protocol,
    ) -> Result<String> {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| name_for_connection(host, port));

        if self.connections.get(&name).is_some_and(|c| c.is_open()) {
            return Err(NetError::NameConflict(name));
        }

        let (socket, remote_ip, remote_port) =
            ConnectionSocket::dial(host, port, protocol, &self.config)?;
        let record = ConnectionRecord::outbound(
            name.clone(),
            host,
            protocol,
            socket,
            remote_ip,
            remote_port,
            &self.config,
        );

        tracing::debug!(connection = %name, %host, port, ?protocol, "connection opened");
        self.connections.insert(name.clone(), record);
        Ok(name)
    }

    /// Close a connection and remove its registry entry
    ///
    /// Unknown names report [`NetError::AlreadyClosed`], non-fatal.
    pub fn close_connection(&mut self, conn: impl Into<ConnectionRef>) -> Result<()> {
        let name = match conn.into() {
            // Closing an unknown name is idempotent, not a lookup failure
            ConnectionRef::Named(name) => name,
            indexed => self.resolve(&indexed)?,
        };
        let mut record = self
            .connections
            .remove(&name)
            .ok_or_else(|| NetError::AlreadyClosed(name.clone()))?;
        record.mark_closed(None);

        // Drop stale back-references so index lookups stay dense
        for server in self.servers.values_mut() {
            server.connections.retain(|n| n != &name);
        }
        Ok(())
    }

    /// Close every connection, releasing all sockets
    pub fn close_all_connections(&mut self) {
        for record in self.connections.values_mut() {
            if record.is_open() {
                record.mark_closed(None);
            }
        }
        self.connections.clear();
        for server in self.servers.values_mut() {
            server.connections.clear();
        }
    }

    /// Re-establish a connection using its stored host, port and protocol
    ///
    /// The name is preserved; buffered partial bytes and unread messages
    /// are discarded. Only valid transition out of `Closed`.
    pub fn reconnect(&mut self, conn: impl Into<ConnectionRef>) -> Result<()> {
        let name = self.resolve(&conn.into())?;
        let config = self.config.clone();
        self.connection_mut(&name)?.reconnect(&config)
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send one application message over a connection
    ///
    /// TCP messages are length-prefix framed on the wire; UDP messages go
    /// out as single datagrams. Fails with [`NetError::NotConnected`] on a
    /// closed record. A mid-session transport failure closes the record
    /// before the error is returned.
    pub fn send_message(&mut self, conn: impl Into<ConnectionRef>, payload: &[u8]) -> Result<()> {
        let name = self.resolve(&conn.into())?;
        let config = self.config.clone();
        let record = self.connection_mut(&name)?;

        match record.send(payload, &config) {
            Err(NetError::Io(e)) => {
                record.mark_closed(Some(e.to_string()));
                Err(NetError::Io(e))
            }
            other => other,
        }
    }

    // =========================================================================
    // Server Queries
    // =========================================================================

    /// Look up a server by name
    pub fn server_named(&self, name: &str) -> Result<ServerInfo> {
        let record = self
            .servers
            .get(name)
            .ok_or_else(|| NetError::NotFound(name.to_string()))?;
        Ok(ServerInfo {
            name: record.name.clone(),
            protocol: record.protocol,
            port: record.port,
            connection_count: record.connections.len(),
        })
    }

    /// Whether the named server accepted new connections since last asked
    ///
    /// Reading resets the server's new-connection counter.
    pub fn server_has_new_connection(&mut self, name: &str) -> Result<bool> {
        let record = self
            .servers
            .get_mut(name)
            .ok_or_else(|| NetError::NotFound(name.to_string()))?;
        let fresh = record.new_connections > 0;
        record.new_connections = 0;
        Ok(fresh)
    }

    /// Whether any server accepted new connections since last checked
    ///
    /// Does not reset any per-server counter.
    pub fn has_new_connections(&self) -> bool {
        self.servers.values().any(|s| s.new_connections > 0)
    }

    /// Number of connections accepted by the named server
    pub fn connection_count(&self, server: &str) -> Result<usize> {
        Ok(self.server_record(server)?.connections.len())
    }

    /// Registry name of the server's `index`-th accepted connection
    pub fn connection_name_at(&self, server: &str, index: usize) -> Result<String> {
        let record = self.server_record(server)?;
        record
            .connections
            .get(index)
            .cloned()
            .ok_or_else(|| NetError::NotFound(format!("{server}[{index}]")))
    }

    /// Registry name of the server's most recently accepted connection
    pub fn last_connection(&self, server: &str) -> Result<String> {
        let record = self.server_record(server)?;
        record
            .connections
            .last()
            .cloned()
            .ok_or_else(|| NetError::NotFound(format!("{server} has no connections")))
    }

    /// Names of all open servers
    pub fn server_names(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    // =========================================================================
    // Connection Queries
    // =========================================================================

    /// Look up a connection by name or server index
    pub fn connection_named(&self, conn: impl Into<ConnectionRef>) -> Result<ConnectionInfo> {
        let name = self.resolve(&conn.into())?;
        let record = self.connection_record(&name)?;
        Ok(ConnectionInfo {
            name: record.name.clone(),
            protocol: record.protocol,
            state: record.state,
            remote_ip: record.remote_ip,
            remote_port: record.remote_port,
            fault: record.fault.clone(),
        })
    }

    /// Remote IPv4 address of a connection, as a 32-bit integer
    pub fn connection_ip(&self, conn: impl Into<ConnectionRef>) -> Result<u32> {
        let name = self.resolve(&conn.into())?;
        Ok(self.connection_record(&name)?.remote_ip)
    }

    /// Remote port of a connection
    pub fn connection_port(&self, conn: impl Into<ConnectionRef>) -> Result<u16> {
        let name = self.resolve(&conn.into())?;
        Ok(self.connection_record(&name)?.remote_port)
    }

    /// Whether a connection is currently open
    pub fn is_connection_open(&self, conn: impl Into<ConnectionRef>) -> Result<bool> {
        let name = self.resolve(&conn.into())?;
        Ok(self.connection_record(&name)?.is_open())
    }

    /// Lifecycle state of a connection
    pub fn connection_state(&self, conn: impl Into<ConnectionRef>) -> Result<ConnectionState> {
        let name = self.resolve(&conn.into())?;
        Ok(self.connection_record(&name)?.state)
    }

    /// The recorded steady-state failure of a connection, if any
    ///
    /// Faults are recorded by the poll cycle and kept until the record is
    /// explicitly closed, so no failure is silently dropped.
    pub fn connection_fault(&self, conn: impl Into<ConnectionRef>) -> Result<Option<String>> {
        let name = self.resolve(&conn.into())?;
        Ok(self.connection_record(&name)?.fault.clone())
    }

    /// Names of all registered connections, open or closed
    pub fn connection_names(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    // =========================================================================
    // Message Retrieval
    // =========================================================================

    /// Whether a connection has reassembled messages waiting
    pub fn has_messages(&self, conn: impl Into<ConnectionRef>) -> Result<bool> {
        let name = self.resolve(&conn.into())?;
        Ok(!self.connection_record(&name)?.inbound.is_empty())
    }

    /// Number of messages waiting on a connection
    pub fn message_count(&self, conn: impl Into<ConnectionRef>) -> Result<usize> {
        let name = self.resolve(&conn.into())?;
        Ok(self.connection_record(&name)?.inbound.len())
    }

    /// Pop the oldest message from a connection's queue
    pub fn read_message(&mut self, conn: impl Into<ConnectionRef>) -> Result<Option<Message>> {
        let name = self.resolve(&conn.into())?;
        Ok(self.connection_mut(&name)?.inbound.pop_front())
    }

    /// Discard all unread messages on a connection
    pub fn clear_messages(&mut self, conn: impl Into<ConnectionRef>) -> Result<()> {
        let name = self.resolve(&conn.into())?;
        self.connection_mut(&name)?.inbound.clear();
        Ok(())
    }

    /// Whether a server has messages waiting
    ///
    /// For UDP servers this checks the datagram queue; for TCP servers it
    /// checks every accepted connection.
    pub fn server_has_messages(&self, name: &str) -> Result<bool> {
        let record = self.server_record(name)?;
        match record.protocol {
            Protocol::Udp => Ok(!record.inbound.is_empty()),
            Protocol::Tcp => Ok(record.connections.iter().any(|n| {
                self.connections
                    .get(n)
                    .is_some_and(|c| !c.inbound.is_empty())
            })),
        }
    }

    /// Pop the oldest message available on a server
    ///
    /// UDP servers pop from the datagram queue; TCP servers scan accepted
    /// connections in accept order and pop the first message found.
    pub fn read_server_message(&mut self, name: &str) -> Result<Option<Message>> {
        let record = self
            .servers
            .get_mut(name)
            .ok_or_else(|| NetError::NotFound(name.to_string()))?;

        match record.protocol {
            Protocol::Udp => Ok(record.inbound.pop_front()),
            Protocol::Tcp => {
                let conn_names = record.connections.clone();
                for conn_name in conn_names {
                    if let Some(conn) = self.connections.get_mut(&conn_name) {
                        if let Some(message) = conn.inbound.pop_front() {
                            return Ok(Some(message));
                        }
                    }
                }
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Internal Lookup Helpers
    // =========================================================================

    /// Resolve a name-or-index reference to a concrete registry key
    fn resolve(&self, conn: &ConnectionRef) -> Result<String> {
        match conn {
            ConnectionRef::Named(name) => {
                if self.connections.contains_key(name) {
                    Ok(name.clone())
                } else {
                    Err(NetError::NotFound(name.clone()))
                }
            }
            ConnectionRef::Indexed { server, index } => self.connection_name_at(server, *index),
        }
    }

    fn server_record(&self, name: &str) -> Result<&ServerRecord> {
        self.servers
            .get(name)
            .ok_or_else(|| NetError::NotFound(name.to_string()))
    }

    fn connection_record(&self, name: &str) -> Result<&ConnectionRecord> {
        self.connections
            .get(name)
            .ok_or_else(|| NetError::NotFound(name.to_string()))
    }

    fn connection_mut(&mut self, name: &str) -> Result<&mut ConnectionRecord> {
        self.connections
            .get_mut(name)
            .ok_or_else(|| NetError::NotFound(name.to_string()))
    }
}
