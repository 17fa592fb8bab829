//! Block-level buffering progress over the head and tail windows.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::engine::PartialPiece;

/// Completion fraction per tracked piece.
///
/// Written by the buffering poll loop and read by reporters. Fractions
/// never decrease, so the mean is monotonic for a fixed piece set.
#[derive(Debug)]
pub struct BufferProgress {
    pieces: Mutex<BTreeMap<u32, f64>>,
}

impl BufferProgress {
    pub fn new(pieces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            pieces: Mutex::new(pieces.into_iter().map(|piece| (piece, 0.0)).collect()),
        }
    }

    /// Pieces still below 1.0, ascending.
    pub fn pending(&self) -> Vec<u32> {
        self.pieces
            .lock()
            .iter()
            .filter(|(_, fraction)| **fraction < 1.0)
            .map(|(piece, _)| *piece)
            .collect()
    }

    /// Folds in possession flags and the engine download queue.
    ///
    /// Possessed pieces snap to 1.0; in-flight pieces take the fraction of
    /// their downloaded block bytes. Untracked pieces are ignored.
    pub fn update(&self, possessed: &[u32], queue: &[PartialPiece]) {
        let mut pieces = self.pieces.lock();
        for piece in queue {
            if let Some(fraction) = pieces.get_mut(&piece.piece_index) {
                *fraction = fraction.max(piece.fraction());
            }
        }
        for piece in possessed {
            if let Some(fraction) = pieces.get_mut(piece) {
                *fraction = 1.0;
            }
        }
    }

    /// Arithmetic mean over tracked pieces, 1.0 when none are tracked.
    pub fn mean(&self) -> f64 {
        let pieces = self.pieces.lock();
        if pieces.is_empty() {
            return 1.0;
        }
        pieces.values().sum::<f64>() / pieces.len() as f64
    }

    pub fn snapshot(&self) -> BTreeMap<u32, f64> {
        self.pieces.lock().clone()
    }
}
