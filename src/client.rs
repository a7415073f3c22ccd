//! # BitTorrent Peer Client
//!
//! One TCP connection to one remote peer, plus what we know about that peer:
//! whether it chokes us and which pieces it has.
//!
//! A `Client` only exists once the connection is fully set up:
//!
//! 1. **Dial**: TCP connect within the dial timeout
//! 2. **Handshake**: send ours, read theirs, compare info hashes
//! 3. **Bitfield**: the first message must be a BITFIELD
//!
//! The peer starts out choking us. Each phase runs under its own deadline; the
//! deadline is cleared afterwards so later I/O is not affected by it.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use crate::bitfield::Bitfield;
use crate::config::Config;
use crate::error::{PeerError, PeerResult};
use crate::handshake::Handshake;
use crate::message::*;
use crate::peer::Peer;

/// TCP stream that enforces an absolute deadline across many reads and writes.
///
/// Socket timeouts only bound a single syscall, so they are re-armed with the
/// remaining time before every operation.
struct Conn {
    stream: TcpStream,
    deadline: Option<Instant>,
}

impl Conn {
    fn new(stream: TcpStream) -> Self {
        Conn {
            stream,
            deadline: None,
        }
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.deadline = deadline;
        if deadline.is_none() {
            self.stream.set_read_timeout(None)?;
            self.stream.set_write_timeout(None)?;
        }
        Ok(())
    }

    fn arm(&self) -> io::Result<()> {
        let deadline = match self.deadline {
            Some(deadline) => deadline,
            None => return Ok(()),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining == Duration::ZERO {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
        }

        self.stream.set_read_timeout(Some(remaining))?;
        self.stream.set_write_timeout(Some(remaining))
    }
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.arm()?;
        self.stream.read(buf)
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.arm()?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Exchanges handshakes and checks the peer is in the same swarm.
fn complete_handshake(
    conn: &mut Conn,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    timeout: Duration,
) -> PeerResult<Handshake> {
    conn.set_deadline(Some(Instant::now() + timeout))?;
    let result = exchange_handshake(conn, info_hash, peer_id);
    conn.set_deadline(None)?;
    result
}

fn exchange_handshake(
    conn: &mut Conn,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
) -> PeerResult<Handshake> {
    let request = Handshake::new(info_hash, peer_id);
    conn.write_all(&request.serialize())?;

    let response = Handshake::read(conn)?;
    if response.info_hash != info_hash {
        return Err(PeerError::handshake_mismatch(&info_hash, &response.info_hash));
    }

    Ok(response)
}

/// Reads the peer's first message, which has to be its bitfield.
fn recv_bitfield(conn: &mut Conn, timeout: Duration) -> PeerResult<Bitfield> {
    conn.set_deadline(Some(Instant::now() + timeout))?;
    let result = read_message(conn);
    conn.set_deadline(None)?;

    match result? {
        None => Err(PeerError::protocol("expected bitfield but got keep-alive")),
        Some(message) if message.id != MessageId::BITFIELD => Err(PeerError::protocol(format!(
            "expected bitfield but got {}",
            message.id
        ))),
        Some(message) => Ok(Bitfield::from(message.payload)),
    }
}

/// A connected peer, past handshake and bitfield exchange.
pub struct Client {
    peer: Peer,
    conn: Conn,
    bitfield: Bitfield,
    choked: bool,
}

impl Client {
    /// Connects to a peer, completes the handshake and receives its bitfield.
    ///
    /// # Errors
    ///
    /// - `Io` if the peer cannot be reached or a phase times out
    /// - `HandshakeMismatch` if the peer serves another torrent
    /// - `Protocol` if the first message is not a bitfield
    pub fn new(
        peer: Peer,
        peer_id: [u8; 20],
        info_hash: [u8; 20],
        config: &Config,
    ) -> PeerResult<Client> {
        let stream = TcpStream::connect_timeout(&peer.socket_addr(), config.dial_timeout)?;
        let mut conn = Conn::new(stream);

        complete_handshake(&mut conn, info_hash, peer_id, config.handshake_timeout)?;
        debug!("Completed handshake with peer {}", peer);

        let bitfield = recv_bitfield(&mut conn, config.bitfield_timeout)?;
        debug!("Receive BITFIELD from peer {}", peer);

        Ok(Client {
            peer,
            conn,
            bitfield,
            choked: true,
        })
    }

    /// Remote address this client is connected to.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Returns `true` while the peer refuses to serve our requests.
    pub fn is_choked(&self) -> bool {
        self.choked
    }

    /// Checks the peer's bitfield, including pieces learnt from HAVE messages.
    ///
    /// # Arguments
    ///
    /// * `index` - Piece index, out of range indices are reported as missing.
    ///
    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.has_piece(index)
    }

    pub fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }

    /// Sets an absolute deadline for every following read and write, or
    /// clears it with `None`.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) -> PeerResult<()> {
        self.conn.set_deadline(deadline)?;
        Ok(())
    }

    /// Blocks until the next message arrives.
    ///
    /// # Returns
    ///
    /// `None` for a keep-alive, otherwise the decoded message.
    ///
    /// # Errors
    ///
    /// `Io` if the connection closes or the deadline passes, `Protocol` for an
    /// oversized frame.
    pub fn read(&mut self) -> PeerResult<Option<Message>> {
        read_message(&mut self.conn)
    }

    pub fn read_choke(&mut self) {
        debug!("Receive CHOKE from peer {}", self.peer);
        self.choked = true;
    }

    pub fn read_unchoke(&mut self) {
        debug!("Receive UNCHOKE from peer {}", self.peer);
        self.choked = false;
    }

    /// Records a piece announced by a HAVE message.
    pub fn read_have(&mut self, message: &Message) -> PeerResult<()> {
        let index = parse_have(message)?;
        debug!("Receive HAVE #{} from peer {}", index, self.peer);
        self.bitfield.set_piece(index);
        Ok(())
    }

    fn send(&mut self, message: &Message) -> PeerResult<()> {
        debug!("Send {} to peer {}", message.id, self.peer);
        self.conn.write_all(&message.serialize())?;
        Ok(())
    }

    /// Asks the peer for one block of a piece.
    ///
    /// # Arguments
    ///
    /// * `index` - Piece index.
    /// * `begin` - Byte offset of the block inside the piece.
    /// * `length` - Block length in bytes.
    ///
    /// # Errors
    ///
    /// `Io` if the message cannot be written before the deadline.
    pub fn send_request(&mut self, index: u32, begin: u32, length: u32) -> PeerResult<()> {
        debug!(
            "Request piece #{} [{}:{}] from peer {}",
            index,
            begin,
            begin + length,
            self.peer
        );
        self.send(&format_request(index, begin, length))
    }

    /// Tells the peer we want to download from it.
    pub fn send_interested(&mut self) -> PeerResult<()> {
        self.send(&Message::new(MessageId::INTERESTED))
    }

    pub fn send_not_interested(&mut self) -> PeerResult<()> {
        self.send(&Message::new(MessageId::NOT_INTERESTED))
    }

    /// Allows the peer to request blocks from us.
    pub fn send_unchoke(&mut self) -> PeerResult<()> {
        self.send(&Message::new(MessageId::UNCHOKE))
    }

    /// Announces a piece we have verified.
    ///
    /// # Arguments
    ///
    /// * `index` - Index of the verified piece.
    ///
    pub fn send_have(&mut self, index: u32) -> PeerResult<()> {
        self.send(&format_have(index))
    }
}
