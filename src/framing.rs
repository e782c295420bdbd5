//! Message framing
//!
//! Reassembles length-prefixed application messages out of a TCP byte
//! stream that may deliver partial or coalesced packets.
//!
//! ## Wire Format
//! ```text
//! ┌──────────────┬─────────────────────────────┐
//! │ Len (4, BE)  │         Payload             │
//! └──────────────┴─────────────────────────────┘
//! ```
//!
//! The 4-byte big-endian prefix encodes the payload size and does not
//! include itself. A length of zero is a valid empty message. UDP traffic
//! never passes through here: a datagram is already a whole message.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{NetError, Result};

/// Length prefix size in bytes
pub const HEADER_SIZE: usize = 4;

/// Incremental reassembler for one TCP connection
///
/// Owns the partial-message carry-over. After every [`push`](Framer::push)
/// the internal buffer holds strictly less than one complete frame.
#[derive(Debug)]
pub struct Framer {
    /// Bytes received but not yet forming a complete message
    buffer: BytesMut,

    /// Frames declaring a payload larger than this are a protocol violation
    max_message_size: usize,
}

impl Framer {
    /// Create a framer with the given payload size cap
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            max_message_size,
        }
    }

    /// Append a received chunk, then drain every complete frame
    ///
    /// Returns the payloads of all frames completed by this chunk, in wire
    /// order. Bytes belonging to a trailing partial header or partial
    /// payload are retained for the next call.
    ///
    /// A declared length above the configured maximum fails with
    /// [`NetError::FrameTooLarge`]; the stream is unrecoverable past that
    /// point and the caller must close the connection.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(len) = self.check()? {
            self.buffer.advance(HEADER_SIZE);
            messages.push(self.buffer.split_to(len).freeze());
        }
        Ok(messages)
    }

    /// Check whether the buffer holds at least one complete frame
    ///
    /// Returns the declared payload length if so, `None` if more bytes are
    /// needed, or an error on an oversized declaration.
    fn check(&mut self) -> Result<Option<usize>> {
        if self.buffer.remaining() < HEADER_SIZE {
            return Ok(None);
        }

        let declared = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;

        if declared > self.max_message_size {
            return Err(NetError::FrameTooLarge {
                declared,
                max: self.max_message_size,
            });
        }

        if self.buffer.remaining() < HEADER_SIZE + declared {
            // Partial payload: pre-size the buffer for the rest of the frame
            self.buffer.reserve(HEADER_SIZE + declared - self.buffer.remaining());
            return Ok(None);
        }

        Ok(Some(declared))
    }

    /// Number of buffered bytes not yet forming a complete message
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard all buffered partial data
    ///
    /// Used on reconnect: the peer's framing state is no longer valid.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Encode one payload as a length-prefixed frame
///
/// Rejects payloads above `max_message_size` before anything hits the wire,
/// so a well-behaved sender can never trip the peer's protocol check.
pub fn encode_frame(payload: &[u8], max_message_size: usize) -> Result<Bytes> {
    if payload.len() > max_message_size {
        return Err(NetError::FrameTooLarge {
            declared: payload.len(),
            max: max_message_size,
        });
    }
    // The prefix is 4 bytes; a cap above u32::MAX must not let it wrap
    let len = u32::try_from(payload.len()).map_err(|_| NetError::FrameTooLarge {
        declared: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}
