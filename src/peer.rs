//! # BitTorrent Peer Address
//!
//! Trackers answer with a compact binary peer list made of 6-byte entries:
//!
//! ```text
//! <IP: 4 bytes><Port: 2 bytes>
//! ```
//!
//! Both fields are in network byte order.

use std::fmt;
use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt};

const PEER_SIZE: usize = 6;

/// A dialable peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    pub fn new(ip: Ipv4Addr, port: u16) -> Peer {
        Peer { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Parses a compact peer list.
    ///
    /// Fails if the list length is not a multiple of 6 bytes.
    pub fn from_compact(compact: &[u8]) -> Result<Vec<Peer>> {
        if compact.len() % PEER_SIZE != 0 {
            return Err(anyhow!(
                "received malformed peers of length {}",
                compact.len()
            ));
        }

        let mut peers = Vec::with_capacity(compact.len() / PEER_SIZE);
        for entry in compact.chunks_exact(PEER_SIZE) {
            let ip = Ipv4Addr::new(entry[0], entry[1], entry[2], entry[3]);
            let port = Cursor::new(&entry[4..6]).read_u16::<BigEndian>()?;
            peers.push(Peer::new(ip, port));
        }

        Ok(peers)
    }
}

impl From<SocketAddrV4> for Peer {
    fn from(addr: SocketAddrV4) -> Self {
        Peer::new(*addr.ip(), addr.port())
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}
