//! Message definitions
//!
//! A fully reassembled application message awaiting consumption.

use bytes::Bytes;

use crate::registry::Protocol;

/// Where a message came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Received on a framed TCP connection; carries its registry name
    Tcp { connection: String },

    /// Received as a UDP datagram; carries the sender address
    Udp { sender_ip: u32, sender_port: u16 },
}

/// One complete inbound message
#[derive(Debug, Clone)]
pub struct Message {
    payload: Bytes,
    origin: MessageOrigin,
}

impl Message {
    pub(crate) fn from_connection(connection: &str, payload: Bytes) -> Self {
        Self {
            payload,
            origin: MessageOrigin::Tcp {
                connection: connection.to_string(),
            },
        }
    }

    pub(crate) fn from_datagram(sender_ip: u32, sender_port: u16, payload: Bytes) -> Self {
        Self {
            payload,
            origin: MessageOrigin::Udp {
                sender_ip,
                sender_port,
            },
        }
    }

    /// The message payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload interpreted as UTF-8, lossily
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Consume the message and take ownership of the payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// The originating connection's registry name (TCP only)
    pub fn connection_name(&self) -> Option<&str> {
        match &self.origin {
            MessageOrigin::Tcp { connection } => Some(connection),
            MessageOrigin::Udp { .. } => None,
        }
    }

    /// The sender's IPv4 address as an integer (UDP only)
    pub fn sender_ip(&self) -> Option<u32> {
        match self.origin {
            MessageOrigin::Udp { sender_ip, .. } => Some(sender_ip),
            MessageOrigin::Tcp { .. } => None,
        }
    }

    /// The sender's port (UDP only)
    pub fn sender_port(&self) -> Option<u16> {
        match self.origin {
            MessageOrigin::Udp { sender_port, .. } => Some(sender_port),
            MessageOrigin::Tcp { .. } => None,
        }
    }

    /// The protocol the message arrived over
    pub fn protocol(&self) -> Protocol {
        match self.origin {
            MessageOrigin::Tcp { .. } => Protocol::Tcp,
            MessageOrigin::Udp { .. } => Protocol::Udp,
        }
    }

    /// The full origin descriptor
    pub fn origin(&self) -> &MessageOrigin {
        &self.origin
    }
}
