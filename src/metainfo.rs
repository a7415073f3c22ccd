//! # Torrent Metadata
//!
//! Parses single-file `.torrent` files, which are bencoded dictionaries:
//!
//! - **announce**: tracker URL
//! - **announce-list**: optional tiers of backup tracker URLs
//! - **info**: `name`, `piece length`, `length` and `pieces` (concatenated
//!   20-byte SHA-1 hashes)
//!
//! The info hash identifying the swarm is the SHA-1 of the bencoded `info`
//! dictionary.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_bencode::{de, ser};
use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};

use crate::config::Config;
use crate::torrent::Torrent;
use crate::tracker;

const SHA1_HASH_SIZE: usize = 20;

#[derive(Deserialize, Serialize)]
struct BencodeInfo {
    #[serde(rename = "pieces")]
    pieces: ByteBuf,
    #[serde(rename = "piece length")]
    piece_length: u32,
    #[serde(rename = "length")]
    length: u64,
    #[serde(rename = "name")]
    name: String,
}

#[derive(Deserialize, Serialize)]
struct BencodeTorrent {
    #[serde(default)]
    announce: String,
    #[serde(rename = "announce-list", default)]
    announce_list: Vec<Vec<String>>,
    info: BencodeInfo,
}

impl BencodeInfo {
    fn hash(&self) -> Result<[u8; 20]> {
        let buf = ser::to_bytes(self)?;
        Ok(Sha1::digest(&buf).into())
    }

    fn split_piece_hashes(&self) -> Result<Vec<[u8; 20]>> {
        if self.pieces.len() % SHA1_HASH_SIZE != 0 {
            return Err(anyhow!(
                "received malformed pieces of length {}",
                self.pieces.len()
            ));
        }

        Ok(self
            .pieces
            .chunks_exact(SHA1_HASH_SIZE)
            .map(|chunk| {
                let mut hash = [0; SHA1_HASH_SIZE];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }
}

/// Structured description of a single-file torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    /// Tracker URLs, `announce` first, then the `announce-list` tiers in order
    pub announce: Vec<String>,
    pub info_hash: [u8; 20],
    pub piece_hashes: Vec<[u8; 20]>,
    pub piece_length: u32,
    pub length: u64,
    pub name: String,
}

impl TorrentFile {
    /// Opens and parses a `.torrent` file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<TorrentFile> {
        let path = path.as_ref();
        let buf = fs::read(path)
            .with_context(|| format!("could not read torrent {}", path.display()))?;
        TorrentFile::from_bytes(&buf)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<TorrentFile> {
        let bencode: BencodeTorrent =
            de::from_bytes(buf).map_err(|e| anyhow!("could not decode torrent: {}", e))?;

        let mut announce = vec![];
        if !bencode.announce.is_empty() {
            announce.push(bencode.announce.clone());
        }
        for url in bencode.announce_list.iter().flatten() {
            if !announce.contains(url) {
                announce.push(url.clone());
            }
        }
        if announce.is_empty() {
            return Err(anyhow!("torrent has no announce or announce-list"));
        }

        let piece_hashes = bencode.info.split_piece_hashes()?;
        if bencode.info.piece_length == 0 && bencode.info.length > 0 {
            return Err(anyhow!(
                "torrent has piece length 0 for {} bytes of data",
                bencode.info.length
            ));
        }
        let expected = if bencode.info.piece_length == 0 {
            0
        } else {
            bencode.info.length.div_ceil(bencode.info.piece_length as u64)
        };
        if piece_hashes.len() as u64 != expected {
            return Err(anyhow!(
                "torrent lists {} piece hashes but its length needs {}",
                piece_hashes.len(),
                expected
            ));
        }

        Ok(TorrentFile {
            announce,
            info_hash: bencode.info.hash()?,
            piece_hashes,
            piece_length: bencode.info.piece_length,
            length: bencode.info.length,
            name: bencode.info.name,
        })
    }

    /// Finds peers and downloads the whole file into memory.
    pub fn download(&self, config: Config) -> Result<Vec<u8>> {
        let peer_id: [u8; 20] = rand::thread_rng().gen();

        let peers = tracker::request_peers(self, &peer_id, config.listen_port)?;

        let torrent = Torrent {
            peers,
            peer_id,
            info_hash: self.info_hash,
            piece_hashes: self.piece_hashes.clone(),
            piece_length: self.piece_length,
            length: self.length,
            name: self.name.clone(),
            config,
        };

        torrent.download()
    }
}
