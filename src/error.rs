//! # Peer Errors
//!
//! Failures that can happen while talking to a single peer. Every variant is
//! local to one connection: the download engine never aborts because of one of
//! these, it only decides whether the connection is still usable.

use std::io;

use thiserror::Error;

/// Errors raised by the peer wire protocol layer.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Connection failure, short read, write failure or timeout.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Malformed frame or unexpected message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer answered the handshake with another torrent's info hash.
    #[error("expected info hash {expected} but got {received}")]
    HandshakeMismatch { expected: String, received: String },

    /// The assembled piece does not hash to the expected value.
    #[error("piece #{index} failed integrity check")]
    Integrity { index: u32 },
}

impl PeerError {
    pub fn protocol<S: Into<String>>(reason: S) -> Self {
        PeerError::Protocol(reason.into())
    }

    pub fn handshake_mismatch(expected: &[u8], received: &[u8]) -> Self {
        PeerError::HandshakeMismatch {
            expected: to_hex(expected),
            received: to_hex(received),
        }
    }

    /// Whether the connection must be abandoned after this error.
    ///
    /// Only an integrity failure leaves the connection in a usable state.
    pub fn drops_connection(&self) -> bool {
        !matches!(self, PeerError::Integrity { .. })
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_integrity_keeps_connection() {
        let io_err = PeerError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(io_err.drops_connection());
        assert!(PeerError::protocol("expected bitfield").drops_connection());
        assert!(PeerError::handshake_mismatch(&[1; 20], &[2; 20]).drops_connection());
        assert!(!PeerError::Integrity { index: 3 }.drops_connection());
    }

    #[test]
    fn mismatch_renders_hex() {
        let err = PeerError::handshake_mismatch(&[0xab, 0x01], &[0x00, 0xff]);
        assert_eq!(err.to_string(), "expected info hash ab01 but got 00ff");
    }
}
