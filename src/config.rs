//! Configuration for netmux
//!
//! Centralized configuration with sensible defaults.

/// Main configuration for a [`Network`](crate::Network) instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Framing Configuration
    // -------------------------------------------------------------------------
    /// Max payload size of a single framed message (in bytes)
    ///
    /// A frame whose declared length exceeds this closes the offending
    /// connection with a protocol violation.
    pub max_message_size: usize,

    // -------------------------------------------------------------------------
    // Transport Configuration
    // -------------------------------------------------------------------------
    /// Advisory per-datagram send size for UDP (in bytes)
    ///
    /// Outbound datagrams above this are logged at debug level but still
    /// sent. Receives always use a maximum-size datagram buffer, so this
    /// never truncates inbound data. Matches the conventional 1 KiB
    /// game-packet budget.
    pub udp_datagram_size: usize,

    /// Per-read chunk size for TCP receives during a poll cycle (in bytes)
    pub recv_chunk_size: usize,

    /// Client connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Send timeout for a framed TCP message (milliseconds)
    ///
    /// A peer that stays unwritable past this deadline fails the send with
    /// a timed-out I/O error and the connection is closed.
    pub send_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_size: 4 * 1024 * 1024, // 4 MiB
            udp_datagram_size: 1024,
            recv_chunk_size: 4096,
            connect_timeout_ms: 5000,
            send_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the maximum framed message payload size (in bytes)
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the advisory UDP send size (in bytes)
    pub fn udp_datagram_size(mut self, size: usize) -> Self {
        self.config.udp_datagram_size = size;
        self
    }

    /// Set the per-read TCP chunk size (in bytes)
    pub fn recv_chunk_size(mut self, size: usize) -> Self {
        self.config.recv_chunk_size = size;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the framed send timeout (in milliseconds)
    pub fn send_timeout_ms(mut self, ms: u64) -> Self {
        self.config.send_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
