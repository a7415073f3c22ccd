//! # Piecewise
//!
//! A BitTorrent client library that downloads a single-file torrent into
//! memory.
//!
//! ## Architecture
//!
//! - **Engine thread** (`torrent`): seeds the work queue, collects verified
//!   pieces, assembles the file
//! - **Worker threads** (`worker`): one per peer, each owning its connection
//! - **Channels**: a shared work queue and a result channel, both crossbeam
//!
//! The wire protocol lives in `handshake`, `message`, `bitfield` and `client`.
//! `metainfo` and `tracker` turn a `.torrent` file into a list of peers.

#[macro_use]
extern crate log;

pub mod bitfield;
pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod message;
pub mod metainfo;
pub mod peer;
pub mod piece;
pub mod queue;
pub mod torrent;
pub mod tracker;
pub mod worker;

pub use config::Config;
pub use error::PeerError;
pub use metainfo::TorrentFile;
pub use peer::Peer;
pub use torrent::Torrent;
