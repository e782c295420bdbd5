//! Dispatcher
//!
//! One cooperative poll cycle over every open socket. The caller invokes
//! [`Network::poll`] once per tick (for example inside a render/update
//! loop); the cycle never blocks, processes whatever I/O is ready and
//! returns. Queries on the registry read the state a cycle populated and
//! never perform I/O themselves.
//!
//! ## Cycle Order
//! 1. TCP servers: accept ready connections
//! 2. Open TCP connections: read available bytes, run the framer
//! 3. UDP servers, then UDP connections: receive ready datagrams
//!
//! Registries iterate in name order, so the visit order within one cycle
//! is deterministic.

use std::io::{ErrorKind, Read};

use bytes::Bytes;

use crate::addr::name_for_connection;
use crate::message::Message;
use crate::registry::{ip_as_dec, ConnectionRecord, ConnectionSocket, ListenSocket, Network};

/// Largest payload a UDP datagram can carry
///
/// Receives always use a buffer this size so no inbound datagram is ever
/// truncated, independent of the advisory send size in the config.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Chunks drained from one TCP connection per cycle before moving on
///
/// Keeps one tick bounded against a firehose peer; whatever remains in the
/// socket buffer is picked up next cycle.
const MAX_CHUNKS_PER_CYCLE: usize = 16;

/// Counters for one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// TCP connections accepted this cycle
    pub connections_accepted: usize,

    /// Messages (framed TCP and UDP datagrams) received this cycle
    pub messages_received: usize,

    /// Connections that transitioned to closed this cycle
    pub connections_closed: usize,
}

impl Network {
    /// Run one poll cycle
    ///
    /// Steady-state failures never propagate out of the cycle: a failed
    /// connection is marked closed with its fault recorded, and the caller
    /// observes it on the next query. New-connection counters and message
    /// queues populated here are all visible before the cycle returns.
    pub fn poll(&mut self) -> PollStats {
        let mut stats = PollStats::default();

        self.sweep_accepts(&mut stats);
        self.sweep_tcp_reads(&mut stats);
        self.sweep_datagrams(&mut stats);

        if stats != PollStats::default() {
            tracing::trace!(
                accepted = stats.connections_accepted,
                messages = stats.messages_received,
                closed = stats.connections_closed,
                "poll cycle"
            );
        }
        stats
    }

    /// Accept every ready connection on every open TCP server
    fn sweep_accepts(&mut self, stats: &mut PollStats) {
        let Self {
            servers,
            connections,
            config,
        } = self;

        for server in servers.values_mut() {
            let Some(ListenSocket::Tcp(listener)) = &server.socket else {
                continue;
            };

            loop {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        let base = name_for_connection(&peer.ip().to_string(), peer.port());
                        let mut name = base.clone();
                        let mut suffix = 2;
                        // Only open records block a name; closed ones are replaced
                        while connections.get(&name).is_some_and(|c| c.is_open()) {
                            name = format!("{base}#{suffix}");
                            suffix += 1;
                        }

                        match ConnectionRecord::accepted(name.clone(), stream, peer, config) {
                            Ok(record) => {
                                tracing::debug!(server = %server.name, connection = %name, "accepted connection");
                                connections.insert(name.clone(), record);
                                server.connections.push(name);
                                server.new_connections += 1;
                                stats.connections_accepted += 1;
                            }
                            Err(e) => {
                                tracing::warn!(server = %server.name, error = %e, "failed to set up accepted connection");
                            }
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!(server = %server.name, error = %e, "accept failed");
                        break;
                    }
                }
            }
        }
    }

    /// Drain available bytes from every open TCP connection and reassemble
    fn sweep_tcp_reads(&mut self, stats: &mut PollStats) {
        let chunk_size = self.config.recv_chunk_size;
        let mut chunk = vec![0u8; chunk_size];

        for record in self.connections.values_mut() {
            if !record.is_open() {
                continue;
            }
            let Some(ConnectionSocket::Tcp(stream)) = record.socket.as_mut() else {
                continue;
            };

            // Drain the socket first, then frame: the framer sees one
            // contiguous chunk per cycle regardless of packet boundaries.
            let mut received = Vec::new();
            let mut closing: Option<Option<String>> = None;
            loop {
                if received.len() >= chunk_size * MAX_CHUNKS_PER_CYCLE {
                    break;
                }
                match stream.read(&mut chunk) {
                    // Orderly close: no more reads this cycle or any later one
                    Ok(0) => {
                        closing = Some(None);
                        break;
                    }
                    Ok(n) => received.extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        closing = Some(Some(e.to_string()));
                        break;
                    }
                }
            }

            if !received.is_empty() {
                match record.framer.push(&received) {
                    Ok(payloads) => {
                        for payload in payloads {
                            record
                                .inbound
                                .push_back(Message::from_connection(&record.name, payload));
                            stats.messages_received += 1;
                        }
                    }
                    // Malformed framing is unrecoverable mid-stream: force
                    // close this connection, others are unaffected
                    Err(e) => {
                        record.framer.clear();
                        closing = Some(Some(e.to_string()));
                    }
                }
            }

            if let Some(fault) = closing {
                record.mark_closed(fault);
                stats.connections_closed += 1;
            }
        }
    }

    /// Receive ready datagrams on UDP servers and UDP connections
    ///
    /// Datagrams bypass the framer entirely: the transport delivers whole
    /// messages or nothing.
    fn sweep_datagrams(&mut self, stats: &mut PollStats) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        for server in self.servers.values_mut() {
            let Some(ListenSocket::Udp(socket)) = &server.socket else {
                continue;
            };

            loop {
                match socket.recv_from(&mut buf) {
                    Ok((n, sender)) => {
                        server.inbound.push_back(Message::from_datagram(
                            ip_as_dec(&sender),
                            sender.port(),
                            Bytes::copy_from_slice(&buf[..n]),
                        ));
                        stats.messages_received += 1;
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!(server = %server.name, error = %e, "datagram receive failed");
                        break;
                    }
                }
            }
        }

        for record in self.connections.values_mut() {
            if !record.is_open() {
                continue;
            }
            let Some(ConnectionSocket::Udp(socket)) = record.socket.as_ref() else {
                continue;
            };

            let mut closing = None;
            loop {
                match socket.recv(&mut buf) {
                    Ok(n) => {
                        record.inbound.push_back(Message::from_datagram(
                            record.remote_ip,
                            record.remote_port,
                            Bytes::copy_from_slice(&buf[..n]),
                        ));
                        stats.messages_received += 1;
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        closing = Some(Some(e.to_string()));
                        break;
                    }
                }
            }

            if let Some(fault) = closing {
                record.mark_closed(fault);
                stats.connections_closed += 1;
            }
        }
    }
}
