//! Scripted BitTorrent peer for driving the download engine in tests.
//!
//! Listens on `127.0.0.1:0`, answers the handshake, sends its bitfield and
//! serves REQUESTs from in-memory piece data. Misbehaviour is opt-in through
//! `MockPeerConfig`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};

use piecewise::error::{PeerError, PeerResult};
use piecewise::handshake::Handshake;
use piecewise::message::*;
use piecewise::Peer;

const MOCK_PEER_ID: [u8; 20] = *b"-MO0001-000000000000";

#[derive(Clone, Default)]
pub struct MockPeerConfig {
    pub info_hash: [u8; 20],
    pub bitfield: Vec<u8>,
    /// Bytes served for each piece index
    pub pieces: HashMap<u32, Vec<u8>>,
    /// Send CHOKE on the first REQUEST, then UNCHOKE shortly after
    pub choke_once: bool,
    /// Close the connection when this piece is requested
    pub hang_up_on: Option<u32>,
    /// Read requests but never answer them
    pub stall: bool,
    /// Collect requests until the client goes quiet for this long, then
    /// answer them all at once
    pub batch_window: Option<Duration>,
    /// Served but missing from the bitfield, announced with HAVE on the
    /// first REQUEST
    pub late: Vec<u32>,
}

impl MockPeerConfig {
    pub fn new(info_hash: [u8; 20], nb_pieces: usize) -> Self {
        MockPeerConfig {
            info_hash,
            bitfield: vec![0; nb_pieces.div_ceil(8)],
            ..Default::default()
        }
    }

    pub fn with_piece(mut self, index: u32, data: &[u8]) -> Self {
        self.pieces.insert(index, data.to_vec());
        self.bitfield[(index / 8) as usize] |= 1 << (7 - index % 8);
        self
    }

    pub fn with_late_piece(mut self, index: u32, data: &[u8]) -> Self {
        self.pieces.insert(index, data.to_vec());
        self.late.push(index);
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockStats {
    pub connections: usize,
    pub interested: bool,
    pub unchoked: bool,
    pub haves: Vec<u32>,
    /// `(index, begin, length)` of every REQUEST, in arrival order
    pub requests: Vec<(u32, u32, u32)>,
    pub max_batch: usize,
}

pub struct MockPeer {
    pub peer: Peer,
    stats: Arc<Mutex<MockStats>>,
}

impl MockPeer {
    pub fn spawn(config: MockPeerConfig) -> MockPeer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = match listener.local_addr().unwrap() {
            SocketAddr::V4(addr) => Peer::from(addr),
            SocketAddr::V6(_) => unreachable!(),
        };
        let stats = Arc::new(Mutex::new(MockStats::default()));

        let accept_stats = Arc::clone(&stats);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => return,
                };
                accept_stats.lock().unwrap().connections += 1;

                let config = config.clone();
                let stats = Arc::clone(&accept_stats);
                thread::spawn(move || {
                    let _ = serve(stream, &config, &stats);
                });
            }
        });

        MockPeer { peer, stats }
    }

    pub fn stats(&self) -> MockStats {
        self.stats.lock().unwrap().clone()
    }

    /// Polls the stats until `condition` holds, for at most two seconds.
    ///
    /// Messages sent by the client just before the download returns may not
    /// have been read yet.
    pub fn wait_until<F: Fn(&MockStats) -> bool>(&self, condition: F) -> MockStats {
        for _ in 0..200 {
            let stats = self.stats();
            if condition(&stats) {
                return stats;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.stats()
    }
}

fn send(stream: &mut TcpStream, message: &Message) -> PeerResult<()> {
    stream.write_all(&message.serialize())?;
    Ok(())
}

fn send_block(
    stream: &mut TcpStream,
    config: &MockPeerConfig,
    (index, begin, length): (u32, u32, u32),
) -> PeerResult<()> {
    let data = match config.pieces.get(&index) {
        Some(data) => data,
        None => return Ok(()),
    };
    let start = (begin as usize).min(data.len());
    let end = (start + length as usize).min(data.len());

    let mut payload = vec![0; 8];
    BigEndian::write_u32(&mut payload[0..4], index);
    BigEndian::write_u32(&mut payload[4..8], begin);
    payload.extend_from_slice(&data[start..end]);

    send(stream, &Message::new_with_payload(MessageId::PIECE, payload))
}

fn serve(mut stream: TcpStream, config: &MockPeerConfig, stats: &Mutex<MockStats>) -> PeerResult<()> {
    Handshake::read(&mut stream)?;
    stream.write_all(&Handshake::new(config.info_hash, MOCK_PEER_ID).serialize())?;
    send(
        &mut stream,
        &Message::new_with_payload(MessageId::BITFIELD, config.bitfield.clone()),
    )?;

    if let Some(window) = config.batch_window {
        stream.set_read_timeout(Some(window))?;
    }

    let mut choked_once = false;
    let mut announced_late = false;
    let mut pending = vec![];

    loop {
        let message = match read_message(&mut stream) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(PeerError::Io(e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                let mut stats = stats.lock().unwrap();
                stats.max_batch = stats.max_batch.max(pending.len());
                drop(stats);
                for request in pending.drain(..) {
                    send_block(&mut stream, config, request)?;
                }
                continue;
            }
            Err(e) => return Err(e),
        };

        match message.id {
            MessageId::INTERESTED => {
                stats.lock().unwrap().interested = true;
                send(&mut stream, &Message::new(MessageId::UNCHOKE))?;
                stream.write_all(&KEEP_ALIVE)?;
            }
            MessageId::UNCHOKE => stats.lock().unwrap().unchoked = true,
            MessageId::HAVE => {
                let index = parse_have(&message)?;
                stats.lock().unwrap().haves.push(index);
            }
            MessageId::REQUEST => {
                let p = &message.payload;
                let request = (
                    BigEndian::read_u32(&p[0..4]),
                    BigEndian::read_u32(&p[4..8]),
                    BigEndian::read_u32(&p[8..12]),
                );
                stats.lock().unwrap().requests.push(request);

                if !announced_late {
                    announced_late = true;
                    for &index in &config.late {
                        send(&mut stream, &format_have(index))?;
                    }
                }

                if config.hang_up_on == Some(request.0) {
                    return Ok(());
                }
                if config.stall {
                    continue;
                }
                if config.choke_once && !choked_once {
                    choked_once = true;
                    send(&mut stream, &Message::new(MessageId::CHOKE))?;
                    thread::sleep(Duration::from_millis(50));
                    send(&mut stream, &Message::new(MessageId::UNCHOKE))?;
                }

                if config.batch_window.is_some() {
                    pending.push(request);
                } else {
                    send_block(&mut stream, config, request)?;
                }
            }
            _ => {}
        }
    }
}
