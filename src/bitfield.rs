//! # Piece Bitfield
//!
//! Compact record of the pieces a remote peer advertises.
//!
//! ```text
//! Byte 0: [piece 0, 1, 2, 3, 4, 5, 6, 7]   (MSB first)
//! Byte 1: [piece 8, 9, ...]
//! ```
//!
//! Peers may send a bitfield shorter than the piece count, so every lookup or
//! update past the end is silently ignored.

/// Pieces a peer is known to have.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Bitfield(Vec<u8>);

impl Bitfield {
    pub fn new() -> Self {
        Default::default()
    }

    /// Checks if the peer has a piece. Out of range indices report `false`.
    pub fn has_piece(&self, index: u32) -> bool {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        match self.0.get(byte_index) {
            Some(byte) => (*byte >> (7 - offset)) & 1 != 0,
            None => false,
        }
    }

    /// Marks a piece as available. Out of range indices are a no-op.
    pub fn set_piece(&mut self, index: u32) {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        if let Some(byte) = self.0.get_mut(byte_index) {
            *byte |= 1 << (7 - offset);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bitfield {
    fn from(bytes: Vec<u8>) -> Self {
        Bitfield(bytes)
    }
}
