//! # Peer Worker
//!
//! One worker thread per peer. A worker owns its `Client` outright, so the
//! connection state never needs a lock.
//!
//! ## Lifecycle
//!
//! 1. Connect, handshake and receive the bitfield (see `Client::new`)
//! 2. Send UNCHOKE and INTERESTED once
//! 3. Pull pieces from the shared queue until it is closed:
//!    - peer lacks the piece: put it back, pull again
//!    - download fails: put it back, disconnect
//!    - hash mismatch: put it back, keep the connection
//!    - success: send HAVE, publish the result

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;

use crate::client::Client;
use crate::config::Config;
use crate::error::PeerResult;
use crate::peer::Peer;
use crate::piece::*;
use crate::queue::WorkQueue;

/// Keeps the live worker count accurate on every exit path.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Downloads pieces from a single peer.
pub struct Worker {
    peer: Peer,
    peer_id: [u8; 20],
    info_hash: [u8; 20],
    queue: WorkQueue,
    results: Sender<PieceResult>,
    active: Arc<AtomicUsize>,
    config: Config,
}

impl Worker {
    /// Build a new worker.
    ///
    /// # Arguments
    ///
    /// * `peer` - Remote peer to download from.
    /// * `peer_id` - Our 20-byte peer id, sent in the handshake.
    /// * `info_hash` - Info hash of the torrent, the peer must echo it.
    /// * `queue` - Shared work queue to pull pieces from and requeue into.
    /// * `results` - Sender for verified pieces.
    /// * `active` - Live-worker counter shared with the engine.
    /// * `config` - Timeouts, backlog and block size.
    ///
    pub fn new(
        peer: Peer,
        peer_id: [u8; 20],
        info_hash: [u8; 20],
        queue: WorkQueue,
        results: Sender<PieceResult>,
        active: Arc<AtomicUsize>,
        config: Config,
    ) -> Worker {
        Worker {
            peer,
            peer_id,
            info_hash,
            queue,
            results,
            active,
            config,
        }
    }

    /// Runs the worker on a new thread.
    pub fn spawn(self) -> thread::JoinHandle<()> {
        // Count the worker before the thread starts so progress never misses it
        let guard = ActiveGuard::new(Arc::clone(&self.active));
        thread::spawn(move || {
            let _guard = guard;
            self.start_download();
        })
    }

    /// Start worker.
    ///
    /// Connects to the peer, then pulls pieces until the queue is closed or
    /// the connection fails. Every failure puts the piece back in the queue.
    pub fn start_download(&self) {
        let mut client = match Client::new(self.peer, self.peer_id, self.info_hash, &self.config)
        {
            Ok(client) => client,
            Err(e) => {
                info!("Could not handshake with peer {}: {}. Disconnected", self.peer, e);
                return;
            }
        };
        info!("Completed handshake with peer {}", self.peer);

        if let Err(e) = Self::announce_interest(&mut client) {
            warn!("Could not signal interest to peer {}: {}", self.peer, e);
            return;
        }

        while let Some(work) = self.queue.pull() {
            if !client.has_piece(work.index) {
                self.requeue(work);
                thread::sleep(self.config.skip_backoff);
                continue;
            }

            let data = match attempt_download_piece(&mut client, &work, &self.config) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Exiting worker for peer {}: {}", self.peer, e);
                    self.requeue(work);
                    return;
                }
            };

            if let Err(e) = work.check_integrity(&data) {
                warn!("{} from peer {}", e, self.peer);
                self.requeue(work);
                continue;
            }

            if let Err(e) = client.send_have(work.index) {
                warn!("Could not send HAVE to peer {}: {}", self.peer, e);
            }

            if self.results.send(PieceResult::new(work.index, data)).is_err() {
                // Engine is gone, nothing left to do
                return;
            }
        }

        debug!("Work queue closed, worker for peer {} exiting", self.peer);
    }

    fn announce_interest(client: &mut Client) -> PeerResult<()> {
        client.send_unchoke()?;
        client.send_interested()
    }

    fn requeue(&self, work: PieceWork) {
        if let Err(work) = self.queue.requeue(work) {
            error!("Could not put piece #{} back in work queue", work.index);
        }
    }
}
