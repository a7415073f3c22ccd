//! # BitTorrent Peer Wire Messages
//!
//! Every message after the handshake is a length-prefixed frame:
//!
//! ```text
//! <length prefix><message ID><payload>
//! ```
//!
//! - **Length Prefix**: 4 bytes (big-endian u32), length of message ID + payload
//! - **Message ID**: 1 byte
//! - **Payload**: `length - 1` bytes
//!
//! | ID | Name | Payload |
//! |----|------|---------|
//! | 0 | CHOKE | none |
//! | 1 | UNCHOKE | none |
//! | 2 | INTERESTED | none |
//! | 3 | NOT INTERESTED | none |
//! | 4 | HAVE | piece index |
//! | 5 | BITFIELD | bitfield bytes |
//! | 6 | REQUEST | index, begin, length |
//! | 7 | PIECE | index, begin, block |
//! | 8 | CANCEL | index, begin, length |
//!
//! A frame with length 0 is a keep-alive: no ID, no payload. It is surfaced as
//! `None` by [`read_message`].

use std::fmt;
use std::io::Read;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

use crate::error::{PeerError, PeerResult};

/// One-byte message type. Unknown IDs are carried through untouched so that
/// callers can ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u8);

impl MessageId {
    pub const CHOKE: MessageId = MessageId(0);
    pub const UNCHOKE: MessageId = MessageId(1);
    pub const INTERESTED: MessageId = MessageId(2);
    pub const NOT_INTERESTED: MessageId = MessageId(3);
    pub const HAVE: MessageId = MessageId(4);
    pub const BITFIELD: MessageId = MessageId(5);
    pub const REQUEST: MessageId = MessageId(6);
    pub const PIECE: MessageId = MessageId(7);
    pub const CANCEL: MessageId = MessageId(8);
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            MessageId::CHOKE => "CHOKE",
            MessageId::UNCHOKE => "UNCHOKE",
            MessageId::INTERESTED => "INTERESTED",
            MessageId::NOT_INTERESTED => "NOT_INTERESTED",
            MessageId::HAVE => "HAVE",
            MessageId::BITFIELD => "BITFIELD",
            MessageId::REQUEST => "REQUEST",
            MessageId::PIECE => "PIECE",
            MessageId::CANCEL => "CANCEL",
            MessageId(other) => return write!(f, "UNKNOWN({})", other),
        };
        f.write_str(name)
    }
}

/// Serialized keep-alive frame.
pub const KEEP_ALIVE: [u8; 4] = [0; 4];

/// Largest frame accepted from a peer. Leaves room for a 16KB block and for
/// bitfields of torrents with millions of pieces.
pub const MAX_MESSAGE_LEN: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type identifier
    pub id: MessageId,
    /// Message payload data
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a message without payload.
    pub fn new(id: MessageId) -> Self {
        Message {
            id,
            payload: vec![],
        }
    }

    pub fn new_with_payload(id: MessageId, payload: Vec<u8>) -> Self {
        Message { id, payload }
    }

    /// Serialize message into a length-prefixed frame.
    pub fn serialize(&self) -> Vec<u8> {
        let length = 1 + self.payload.len();
        let mut serialized = vec![0; 4 + length];

        BigEndian::write_u32(&mut serialized[0..4], length as u32);
        serialized[4] = self.id.0;
        serialized[5..].copy_from_slice(&self.payload);

        serialized
    }
}

/// Build a REQUEST message for a block.
pub fn format_request(index: u32, begin: u32, length: u32) -> Message {
    let mut payload = vec![0; 12];
    BigEndian::write_u32(&mut payload[0..4], index);
    BigEndian::write_u32(&mut payload[4..8], begin);
    BigEndian::write_u32(&mut payload[8..12], length);
    Message::new_with_payload(MessageId::REQUEST, payload)
}

/// Build a HAVE message for a piece.
pub fn format_have(index: u32) -> Message {
    let mut payload = vec![0; 4];
    BigEndian::write_u32(&mut payload, index);
    Message::new_with_payload(MessageId::HAVE, payload)
}

/// Extract the piece index of a HAVE message.
pub fn parse_have(message: &Message) -> PeerResult<u32> {
    if message.id != MessageId::HAVE {
        return Err(PeerError::protocol(format!(
            "expected HAVE (ID {}), got ID {}",
            MessageId::HAVE.0,
            message.id.0
        )));
    }
    if message.payload.len() != 4 {
        return Err(PeerError::protocol(format!(
            "expected HAVE payload length 4, got {}",
            message.payload.len()
        )));
    }

    Ok(BigEndian::read_u32(&message.payload))
}

/// Copy the block of a PIECE message into `buf`.
///
/// The block lands at its `begin` offset. A block running past the end of
/// `buf` is truncated. Returns the number of bytes copied.
pub fn parse_piece(index: u32, buf: &mut [u8], message: &Message) -> PeerResult<usize> {
    if message.id != MessageId::PIECE {
        return Err(PeerError::protocol(format!(
            "expected PIECE (ID {}), got ID {}",
            MessageId::PIECE.0,
            message.id.0
        )));
    }
    if message.payload.len() < 8 {
        return Err(PeerError::protocol(format!(
            "PIECE payload too short: {} < 8",
            message.payload.len()
        )));
    }

    let parsed_index = BigEndian::read_u32(&message.payload[0..4]);
    if parsed_index != index {
        return Err(PeerError::protocol(format!(
            "expected piece #{}, got #{}",
            index, parsed_index
        )));
    }

    let begin = BigEndian::read_u32(&message.payload[4..8]) as usize;
    if begin >= buf.len() {
        return Err(PeerError::protocol(format!(
            "begin offset {} beyond piece length {}",
            begin,
            buf.len()
        )));
    }

    let block = &message.payload[8..];
    let copied = block.len().min(buf.len() - begin);
    buf[begin..begin + copied].copy_from_slice(&block[..copied]);

    Ok(copied)
}

/// Read one frame from a stream. Returns `None` for a keep-alive.
pub fn read_message<R: Read>(reader: &mut R) -> PeerResult<Option<Message>> {
    let length = reader.read_u32::<BigEndian>()? as usize;

    if length == 0 {
        return Ok(None);
    }
    if length > MAX_MESSAGE_LEN {
        return Err(PeerError::protocol(format!(
            "message length {} exceeds limit {}",
            length, MAX_MESSAGE_LEN
        )));
    }

    let mut buf = vec![0; length];
    reader.read_exact(&mut buf)?;

    let id = MessageId(buf[0]);
    let payload = buf.split_off(1);

    Ok(Some(Message::new_with_payload(id, payload)))
}
