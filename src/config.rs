//! # Download Configuration
//!
//! Timeouts and pipelining limits used by the peer workers.

use std::time::Duration;

/// Port reported to trackers.
pub const DEFAULT_PORT: u16 = 6881;

#[derive(Debug, Clone)]
pub struct Config {
    /// Time allowed to open the TCP connection
    pub dial_timeout: Duration,
    /// Time allowed for the whole handshake write + read round trip
    pub handshake_timeout: Duration,
    /// Time allowed for the peer's first BITFIELD message
    pub bitfield_timeout: Duration,
    /// Time allowed for one piece download attempt
    pub piece_timeout: Duration,
    /// Maximum number of unanswered block requests per peer
    pub max_backlog: u32,
    /// Largest number of bytes a single request can ask for
    pub max_block_size: u32,
    /// Pause after putting back a piece the peer does not have
    pub skip_backoff: Duration,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
    /// Port announced to trackers
    pub listen_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dial_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(3),
            bitfield_timeout: Duration::from_secs(5),
            piece_timeout: Duration::from_secs(30),
            max_backlog: 5,
            max_block_size: 16384,
            skip_backoff: Duration::from_millis(10),
            show_progress: true,
            listen_port: DEFAULT_PORT,
        }
    }
}
