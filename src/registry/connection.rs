//! Connection records
//!
//! One record per TCP peer connection (client-side or server-accepted) or
//! point-to-point UDP pairing. The record exclusively owns its socket, the
//! partial-message carry-over and the FIFO of reassembled inbound messages.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{NetError, Result};
use crate::framing::{encode_frame, Framer};
use crate::message::Message;
use crate::registry::Protocol;

/// Lifecycle state of a connection
///
/// Valid transitions: `Connecting → Open`, `Open → Closed` (error, EOF or
/// explicit close) and `Closed → Connecting` via explicit reconnect only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// The transport handle owned by a connection record
#[derive(Debug)]
pub(crate) enum ConnectionSocket {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl ConnectionSocket {
    /// Establish a new outbound socket for the given endpoint
    ///
    /// TCP dials with a bounded timeout, then switches the stream to
    /// non-blocking so the poll cycle can never stall on it. A UDP
    /// "connection" is a bound local socket `connect`ed to the remote
    /// address, so the transport filters inbound datagrams by peer.
    ///
    /// Returns the socket plus the resolved remote IPv4 address and port.
    pub(crate) fn dial(
        host: &str,
        port: u16,
        protocol: Protocol,
        config: &Config,
    ) -> Result<(ConnectionSocket, u32, u16)> {
        let endpoint = format!("{host}:{port}");
        let addr = resolve(host, port).map_err(|source| NetError::Connect {
            addr: endpoint.clone(),
            source,
        })?;

        match protocol {
            Protocol::Tcp => {
                let stream =
                    TcpStream::connect_timeout(&addr, Duration::from_millis(config.connect_timeout_ms))
                        .map_err(|source| NetError::Connect {
                            addr: endpoint.clone(),
                            source,
                        })?;
                stream.set_nodelay(true)?;
                stream.set_nonblocking(true)?;
                Ok((ConnectionSocket::Tcp(stream), ip_as_dec(&addr), addr.port()))
            }
            Protocol::Udp => {
                let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(|source| NetError::Connect {
                    addr: endpoint.clone(),
                    source,
                })?;
                socket.connect(addr).map_err(|source| NetError::Connect {
                    addr: endpoint,
                    source,
                })?;
                socket.set_nonblocking(true)?;
                Ok((ConnectionSocket::Udp(socket), ip_as_dec(&addr), addr.port()))
            }
        }
    }
}

/// Resolve `host:port`, preferring an IPv4 address
fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            io::Error::new(ErrorKind::AddrNotAvailable, format!("{host} resolved to no addresses"))
        })
}

/// The peer IPv4 address as a 32-bit integer (zero for IPv6 peers)
pub(crate) fn ip_as_dec(addr: &SocketAddr) -> u32 {
    match addr.ip() {
        IpAddr::V4(v4) => u32::from(v4),
        IpAddr::V6(_) => 0,
    }
}

/// State for one peer connection
#[derive(Debug)]
pub(crate) struct ConnectionRecord {
    /// Registry key
    pub(crate) name: String,

    pub(crate) protocol: Protocol,

    /// Exclusively owned transport handle; dropped on close
    pub(crate) socket: Option<ConnectionSocket>,

    /// Remote host string as originally given, kept for reconnect
    pub(crate) remote_host: String,

    pub(crate) remote_ip: u32,
    pub(crate) remote_port: u16,

    pub(crate) state: ConnectionState,

    /// Partial-message carry-over; mutated only by the framer
    pub(crate) framer: Framer,

    /// Fully reassembled messages awaiting consumption, in arrival order
    pub(crate) inbound: VecDeque<Message>,

    /// Last steady-state failure, surfaced on query rather than thrown
    pub(crate) fault: Option<String>,
}

impl ConnectionRecord {
    /// Record for an outbound connection established by `dial`
    pub(crate) fn outbound(
        name: String,
        host: &str,
        protocol: Protocol,
        socket: ConnectionSocket,
        remote_ip: u32,
        remote_port: u16,
        config: &Config,
    ) -> Self {
        Self {
            name,
            protocol,
            socket: Some(socket),
            remote_host: host.to_string(),
            remote_ip,
            remote_port,
            state: ConnectionState::Open,
            framer: Framer::new(config.max_message_size),
            inbound: VecDeque::new(),
            fault: None,
        }
    }

    /// Record for a server-accepted TCP stream
    pub(crate) fn accepted(
        name: String,
        stream: TcpStream,
        peer: SocketAddr,
        config: &Config,
    ) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        Ok(Self {
            name,
            protocol: Protocol::Tcp,
            socket: Some(ConnectionSocket::Tcp(stream)),
            remote_host: peer.ip().to_string(),
            remote_ip: ip_as_dec(&peer),
            remote_port: peer.port(),
            state: ConnectionState::Open,
            framer: Framer::new(config.max_message_size),
            inbound: VecDeque::new(),
            fault: None,
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Send one application message to the peer
    ///
    /// TCP payloads are length-prefix framed; a UDP payload goes out as a
    /// single datagram with no framing. A TCP peer that stays unwritable
    /// past `send_timeout_ms` fails the send with a timed-out I/O error.
    pub(crate) fn send(&mut self, payload: &[u8], config: &Config) -> Result<()> {
        if !self.is_open() {
            return Err(NetError::NotConnected(self.name.clone()));
        }

        match self.socket.as_mut() {
            Some(ConnectionSocket::Tcp(stream)) => {
                let frame = encode_frame(payload, config.max_message_size)?;
                let timeout = Duration::from_millis(config.send_timeout_ms);
                write_all_nonblocking(stream, &frame, timeout)
            }
            Some(ConnectionSocket::Udp(socket)) => {
                if payload.len() > config.udp_datagram_size {
                    tracing::debug!(
                        connection = %self.name,
                        size = payload.len(),
                        advisory = config.udp_datagram_size,
                        "datagram exceeds advisory send size"
                    );
                }
                socket.send(payload)?;
                Ok(())
            }
            None => Err(NetError::NotConnected(self.name.clone())),
        }
    }

    /// Transition to `Closed`, releasing the socket
    ///
    /// A fault string marks a steady-state failure; it stays on the record
    /// so the caller can observe what happened on the next query.
    pub(crate) fn mark_closed(&mut self, fault: Option<String>) {
        if let Some(ConnectionSocket::Tcp(stream)) = &self.socket {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.socket = None;
        self.state = ConnectionState::Closed;

        match &fault {
            Some(reason) => tracing::warn!(connection = %self.name, %reason, "connection failed"),
            None => tracing::debug!(connection = %self.name, "connection closed"),
        }
        if fault.is_some() {
            self.fault = fault;
        }
    }

    /// Re-establish the stored endpoint under the same name
    ///
    /// Buffered partial bytes and unread inbound messages are discarded:
    /// the peer's framing state is no longer valid after a reconnect.
    pub(crate) fn reconnect(&mut self, config: &Config) -> Result<()> {
        if self.is_open() {
            self.mark_closed(None);
        }
        self.state = ConnectionState::Connecting;
        self.framer.clear();
        self.inbound.clear();
        self.fault = None;

        match ConnectionSocket::dial(&self.remote_host, self.remote_port, self.protocol, config) {
            Ok((socket, remote_ip, remote_port)) => {
                self.socket = Some(socket);
                self.remote_ip = remote_ip;
                self.remote_port = remote_port;
                self.state = ConnectionState::Open;
                tracing::debug!(connection = %self.name, "reconnected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }
}

/// Write a full buffer to a non-blocking stream, bounded by a deadline
///
/// Retries on `WouldBlock` until the timeout expires. A connected peer
/// that never reads keeps the socket unwritable through flow control
/// without ever raising a hard error, so an unbounded retry would stall
/// the caller; past the deadline the send fails with `TimedOut` and the
/// caller closes the record.
fn write_all_nonblocking(stream: &mut TcpStream, mut buf: &[u8], timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => {
                return Err(NetError::Io(io::Error::new(
                    ErrorKind::WriteZero,
                    "peer stopped accepting bytes",
                )))
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(NetError::Io(io::Error::new(
                        ErrorKind::TimedOut,
                        "send timed out; peer not accepting bytes",
                    )));
                }
                std::thread::yield_now();
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
