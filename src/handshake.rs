//! # BitTorrent Handshake
//!
//! The first frame exchanged on every connection. It identifies the protocol
//! and the swarm (via the info hash) before any message is sent.
//!
//! ```text
//! <pstrlen><pstr><reserved><info_hash><peer_id>
//! ```
//!
//! - **pstrlen**: 1 byte, length of the protocol string (19 for the standard one)
//! - **pstr**: protocol identifier, usually "BitTorrent protocol"
//! - **reserved**: 8 bytes, always zero here (no extensions are negotiated)
//! - **info_hash**: 20 bytes
//! - **peer_id**: 20 bytes

use std::io::Read;

use crate::error::{PeerError, PeerResult};

pub const PROTOCOL_ID: &[u8] = b"BitTorrent protocol";

const RESERVED_LEN: usize = 8;
const HASH_LEN: usize = 20;

/// A handshake frame, sent or received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier bytes
    pub pstr: Vec<u8>,
    /// SHA-1 hash of the torrent's info dictionary
    pub info_hash: [u8; 20],
    /// Identifier of the sending peer
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Creates a handshake with the standard protocol string.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Handshake {
            pstr: PROTOCOL_ID.to_vec(),
            info_hash,
            peer_id,
        }
    }

    /// Creates a handshake with a non-standard protocol string.
    ///
    /// The string must fit the single length byte and cannot be empty, since a
    /// zero length is rejected on the receiving side.
    pub fn with_protocol(pstr: &[u8], info_hash: [u8; 20], peer_id: [u8; 20]) -> PeerResult<Self> {
        if pstr.is_empty() || pstr.len() > u8::MAX as usize {
            return Err(PeerError::protocol(format!(
                "protocol string length {} out of range",
                pstr.len()
            )));
        }

        Ok(Handshake {
            pstr: pstr.to_vec(),
            info_hash,
            peer_id,
        })
    }

    /// Serializes the handshake. Total size is `49 + pstr.len()` bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut serialized = Vec::with_capacity(49 + self.pstr.len());

        serialized.push(self.pstr.len() as u8);
        serialized.extend_from_slice(&self.pstr);
        serialized.extend_from_slice(&[0; RESERVED_LEN]);
        serialized.extend_from_slice(&self.info_hash);
        serialized.extend_from_slice(&self.peer_id);

        serialized
    }

    /// Reads a handshake from a stream.
    ///
    /// Fails with a protocol error when the length byte is zero, and with an
    /// I/O error when the stream ends before the full frame was read.
    pub fn read<R: Read>(reader: &mut R) -> PeerResult<Handshake> {
        let mut len_buf = [0; 1];
        reader.read_exact(&mut len_buf)?;

        let pstrlen = len_buf[0] as usize;
        if pstrlen == 0 {
            return Err(PeerError::protocol("pstrlen cannot be 0"));
        }

        let mut buf = vec![0; pstrlen + RESERVED_LEN + 2 * HASH_LEN];
        reader.read_exact(&mut buf)?;

        let hash_start = pstrlen + RESERVED_LEN;
        let mut info_hash = [0; HASH_LEN];
        info_hash.copy_from_slice(&buf[hash_start..hash_start + HASH_LEN]);
        let mut peer_id = [0; HASH_LEN];
        peer_id.copy_from_slice(&buf[hash_start + HASH_LEN..]);

        Ok(Handshake {
            pstr: buf[..pstrlen].to_vec(),
            info_hash,
            peer_id,
        })
    }
}
