//! # Piece Download
//!
//! Pieces are the verification unit of a torrent. They are requested from a
//! peer in smaller blocks (at most 16KB), several at a time, and reassembled
//! before their SHA-1 hash is checked.
//!
//! ## Download State
//!
//! `PieceProgress` lives for exactly one attempt of one piece on one peer and
//! counts:
//! - bytes requested vs bytes downloaded
//! - requests sent but not answered yet (the backlog)

use std::time::Instant;

use sha1::{Digest, Sha1};

use crate::client::Client;
use crate::config::Config;
use crate::error::{PeerError, PeerResult};
use crate::message::*;

/// A piece waiting to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Expected SHA-1 hash of the piece
    pub hash: [u8; 20],
    /// Total length of the piece in bytes
    pub length: u32,
}

/// A downloaded piece that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; 20], length: u32) -> PieceWork {
        PieceWork {
            index,
            hash,
            length,
        }
    }

    /// Checks the downloaded data against the expected hash.
    pub fn check_integrity(&self, data: &[u8]) -> PeerResult<()> {
        let hash = Sha1::digest(data);
        if hash.as_slice() != self.hash {
            return Err(PeerError::Integrity { index: self.index });
        }
        Ok(())
    }
}

impl PieceResult {
    pub fn new(index: u32, data: Vec<u8>) -> PieceResult {
        PieceResult { index, data }
    }
}

/// State of one download attempt.
struct PieceProgress<'a> {
    index: u32,
    client: &'a mut Client,
    buf: Vec<u8>,
    downloaded: u32,
    requested: u32,
    backlog: u32,
}

impl PieceProgress<'_> {
    /// Waits for the next message and applies it to the attempt.
    fn read_message(&mut self) -> PeerResult<()> {
        let message = match self.client.read()? {
            Some(message) => message,
            None => {
                debug!("Receive KEEP_ALIVE from peer {}", self.client.peer());
                return Ok(());
            }
        };

        match message.id {
            MessageId::UNCHOKE => self.client.read_unchoke(),
            MessageId::CHOKE => self.client.read_choke(),
            MessageId::HAVE => self.client.read_have(&message)?,
            MessageId::PIECE => {
                let copied = parse_piece(self.index, &mut self.buf, &message)?;
                self.downloaded += copied as u32;
                self.backlog = self.backlog.saturating_sub(1);
            }
            other => debug!("Ignore {} from peer {}", other, self.client.peer()),
        }

        Ok(())
    }
}

/// Downloads one piece from a peer and returns its bytes, unverified.
///
/// Requests are pipelined up to `max_backlog` while the peer does not choke
/// us. The whole attempt runs under `piece_timeout`.
pub fn attempt_download_piece(
    client: &mut Client,
    work: &PieceWork,
    config: &Config,
) -> PeerResult<Vec<u8>> {
    client.set_deadline(Some(Instant::now() + config.piece_timeout))?;
    let result = download_blocks(client, work, config);
    client.set_deadline(None)?;
    result
}

fn download_blocks(client: &mut Client, work: &PieceWork, config: &Config) -> PeerResult<Vec<u8>> {
    let mut state = PieceProgress {
        index: work.index,
        client,
        buf: vec![0; work.length as usize],
        downloaded: 0,
        requested: 0,
        backlog: 0,
    };

    while state.downloaded < work.length {
        if !state.client.is_choked() {
            while state.backlog < config.max_backlog && state.requested < work.length {
                // Last block might be shorter
                let block_size = config.max_block_size.min(work.length - state.requested);

                state
                    .client
                    .send_request(work.index, state.requested, block_size)?;
                state.backlog += 1;
                state.requested += block_size;
            }
        }

        state.read_message()?;
    }

    Ok(state.buf)
}
