//! # Shared Work Queue
//!
//! Pieces waiting for a peer. Workers block on `pull`, and put a piece back
//! with `requeue` when they cannot (or failed to) download it.
//!
//! The channel capacity equals the number of pieces, and a piece is either in
//! the queue or held by exactly one worker, so `requeue` never blocks.
//!
//! Closing is signalled on a separate channel: workers keep a sender to the
//! work channel for requeueing, so dropping senders alone would never
//! disconnect it.

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

use crate::piece::PieceWork;

/// Worker-side handle, cheap to clone.
#[derive(Clone)]
pub struct WorkQueue {
    work_tx: Sender<PieceWork>,
    work_rx: Receiver<PieceWork>,
    closed: Receiver<()>,
}

/// Engine-side handle. Dropping it, or calling `close`, wakes every worker
/// blocked on `pull`.
pub struct QueueCloser {
    _closer: Sender<()>,
}

impl QueueCloser {
    pub fn close(self) {}
}

impl WorkQueue {
    /// Creates a queue able to hold `capacity` pieces.
    pub fn new(capacity: usize) -> (WorkQueue, QueueCloser) {
        let (work_tx, work_rx) = bounded(capacity.max(1));
        let (closer, closed) = bounded(0);

        let queue = WorkQueue {
            work_tx,
            work_rx,
            closed,
        };

        (queue, QueueCloser { _closer: closer })
    }

    /// Blocks until a piece is available. Returns `None` once the queue is
    /// closed.
    pub fn pull(&self) -> Option<PieceWork> {
        select! {
            recv(self.closed) -> _ => None,
            recv(self.work_rx) -> work => work.ok(),
        }
    }

    /// Puts a piece back without blocking.
    ///
    /// Returns the piece if the queue is full, which only happens when more
    /// pieces are pushed than the queue was sized for.
    pub fn requeue(&self, work: PieceWork) -> Result<(), PieceWork> {
        match self.work_tx.try_send(work) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(work)) | Err(TrySendError::Disconnected(work)) => Err(work),
        }
    }

    /// Number of pieces currently waiting for a worker.
    pub fn len(&self) -> usize {
        self.work_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.work_rx.is_empty()
    }
}
