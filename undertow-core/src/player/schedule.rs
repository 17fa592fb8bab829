//! Piece-priority schedule biased toward the head and tail of one file.

use crate::config::StreamConfig;
use crate::engine::PiecePriority;
use crate::torrent::{FileEntry, TorrentInfo};

/// Window sizing inputs taken from [`StreamConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSizing {
    /// Floor for the head window
    pub min_buffer_bytes: u64,
    /// Fraction of the file span added to the head window
    pub head_fraction: f64,
    pub tail_bytes: u64,
}

impl From<&StreamConfig> for WindowSizing {
    fn from(config: &StreamConfig) -> Self {
        Self {
            min_buffer_bytes: config.min_buffer_bytes,
            head_fraction: config.head_buffer_fraction,
            tail_bytes: config.tail_buffer_bytes,
        }
    }
}

/// Head and tail windows over a file's inclusive piece span.
///
/// Head and tail pieces are fetched immediately with a zero deadline, the
/// rest of the file at normal priority and every other piece is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSchedule {
    pub piece_count: u32,
    pub start_piece: u32,
    pub end_piece: u32,
    pub head_pieces: u32,
    pub tail_pieces: u32,
}

impl BufferSchedule {
    /// Computes the schedule for `file` inside `info`.
    ///
    /// Returns `None` for an empty file.
    pub fn compute(info: &TorrentInfo, file: &FileEntry, sizing: WindowSizing) -> Option<Self> {
        let piece_length = info.piece_length;
        let (start_piece, end_piece) = file.piece_span(piece_length)?;
        let span_pieces = end_piece - start_piece + 1;

        let head_bytes = sizing
            .min_buffer_bytes
            .max((sizing.head_fraction * file.length as f64).ceil() as u64);
        let head_pieces = pieces_for(head_bytes, piece_length, span_pieces);
        let tail_pieces = pieces_for(sizing.tail_bytes, piece_length, span_pieces);

        Some(Self {
            piece_count: info.piece_count,
            start_piece,
            end_piece,
            head_pieces,
            tail_pieces,
        })
    }

    pub fn is_head(&self, piece: u32) -> bool {
        piece >= self.start_piece && piece < self.start_piece + self.head_pieces
    }

    pub fn is_tail(&self, piece: u32) -> bool {
        piece <= self.end_piece && piece + self.tail_pieces > self.end_piece
    }

    pub fn in_file(&self, piece: u32) -> bool {
        (self.start_piece..=self.end_piece).contains(&piece)
    }

    /// Pieces of the head and tail windows, ascending and deduplicated.
    pub fn window_pieces(&self) -> Vec<u32> {
        (self.start_piece..=self.end_piece)
            .filter(|&piece| self.is_head(piece) || self.is_tail(piece))
            .collect()
    }

    /// Full priority vector for the transfer.
    pub fn priorities(&self) -> Vec<PiecePriority> {
        (0..self.piece_count)
            .map(|piece| {
                if self.is_head(piece) || self.is_tail(piece) {
                    PiecePriority::Immediate
                } else if self.in_file(piece) {
                    PiecePriority::Normal
                } else {
                    PiecePriority::Skip
                }
            })
            .collect()
    }

    /// Priority vector without the head/tail bias, used once the transfer
    /// has finished so the rest of the file keeps fetching.
    pub fn uniform_priorities(&self) -> Vec<PiecePriority> {
        (0..self.piece_count)
            .map(|piece| {
                if self.in_file(piece) {
                    PiecePriority::Normal
                } else {
                    PiecePriority::Skip
                }
            })
            .collect()
    }
}

/// Whole pieces covering `bytes`, at least one and at most `span_pieces`.
fn pieces_for(bytes: u64, piece_length: u64, span_pieces: u32) -> u32 {
    let pieces = bytes
        .div_ceil(piece_length.max(1))
        .clamp(1, u64::from(span_pieces.max(1)));
    u32::try_from(pieces).unwrap_or(u32::MAX)
}
