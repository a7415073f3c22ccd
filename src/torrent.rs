//! # Download Engine
//!
//! Coordinates one download from a known list of peers:
//!
//! 1. **Seed the work queue** with one `PieceWork` per piece
//! 2. **Spawn one worker thread** per peer
//! 3. **Collect verified pieces** from the result channel
//! 4. **Copy each piece** into the output buffer at its offset
//! 5. **Close the queue** once every piece arrived
//!
//! The whole payload is kept in memory. Pieces may arrive in any order.
//!
//! A piece that no peer can serve keeps cycling through the queue and the
//! download never finishes. There is no retry cap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use crossbeam_channel::bounded;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::peer::Peer;
use crate::piece::*;
use crate::queue::WorkQueue;
use crate::worker::Worker;

/// Everything needed to download a torrent from a list of peers.
#[derive(Debug, Clone)]
pub struct Torrent {
    /// Peers to download from
    pub peers: Vec<Peer>,
    /// Our 20-byte peer id
    pub peer_id: [u8; 20],
    /// SHA-1 hash of the info dictionary
    pub info_hash: [u8; 20],
    /// Expected SHA-1 hash of every piece
    pub piece_hashes: Vec<[u8; 20]>,
    /// Size of each piece in bytes (except possibly the last)
    pub piece_length: u32,
    /// Total size of the file in bytes
    pub length: u64,
    /// Suggested filename
    pub name: String,
    pub config: Config,
}

impl Torrent {
    /// Byte range `[begin, end)` of a piece in the output buffer.
    pub fn bounds_for_piece(&self, index: u32) -> (u64, u64) {
        let begin = index as u64 * self.piece_length as u64;
        let end = (begin + self.piece_length as u64).min(self.length);
        (begin, end.max(begin))
    }

    /// Size of a piece in bytes.
    ///
    /// # Arguments
    ///
    /// * `index` - Piece index, the last piece may be shorter.
    ///
    pub fn piece_size(&self, index: u32) -> u32 {
        let (begin, end) = self.bounds_for_piece(index);
        (end - begin) as u32
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(self.length);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    /// Downloads every piece and returns the assembled file.
    ///
    /// # Errors
    ///
    /// Fails if the piece hashes do not cover `length`, or if every worker
    /// exited before the last piece arrived.
    pub fn download(&self) -> Result<Vec<u8>> {
        info!(
            "Starting download for {:?} ({} pieces, {} peers)",
            self.name,
            self.piece_hashes.len(),
            self.peers.len()
        );

        let nb_pieces = self.piece_hashes.len();
        // Every output byte must belong to a hashed piece
        let covered = nb_pieces as u64 * self.piece_length as u64;
        if covered < self.length {
            return Err(anyhow!(
                "{} pieces of {} bytes cannot cover {} bytes",
                nb_pieces,
                self.piece_length,
                self.length
            ));
        }

        let (queue, closer) = WorkQueue::new(nb_pieces);
        for (index, hash) in self.piece_hashes.iter().enumerate() {
            let index = index as u32;
            let work = PieceWork::new(index, *hash, self.piece_size(index));
            if queue.requeue(work).is_err() {
                return Err(anyhow!("could not seed piece #{} into work queue", index));
            }
        }

        let (result_tx, result_rx) = bounded::<PieceResult>(0);
        let active = Arc::new(AtomicUsize::new(0));

        for peer in &self.peers {
            Worker::new(
                *peer,
                self.peer_id,
                self.info_hash,
                queue.clone(),
                result_tx.clone(),
                Arc::clone(&active),
                self.config.clone(),
            )
            .spawn();
        }
        // Workers hold their own senders and queue handles
        drop(result_tx);
        drop(queue);

        let pb = self.progress_bar();
        let mut buf = vec![0; self.length as usize];
        let mut done_pieces = 0;
        while done_pieces < nb_pieces {
            let result = result_rx
                .recv()
                .map_err(|_| anyhow!("every peer disconnected before the download finished"))?;

            let (begin, end) = self.bounds_for_piece(result.index);
            let (begin, end) = (begin as usize, end as usize);
            if result.data.len() != end - begin {
                return Err(anyhow!(
                    "piece #{} has length {}, expected {}",
                    result.index,
                    result.data.len(),
                    end - begin
                ));
            }
            buf[begin..end].copy_from_slice(&result.data);
            done_pieces += 1;

            let percent = done_pieces as f64 / nb_pieces as f64 * 100.0;
            info!(
                "({:.2}%) Downloaded piece #{} from {} peers",
                percent,
                result.index,
                active.load(Ordering::SeqCst)
            );
            pb.inc((end - begin) as u64);
        }

        pb.finish_and_clear();
        closer.close();

        Ok(buf)
    }
}
