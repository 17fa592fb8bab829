//! Core types produced by torrent and magnet parsing

use crate::torrent::InfoHash;

/// Complete metadata extracted from a torrent file.
///
/// Carries the piece geometry and file layout the buffer controller needs
/// to turn a chosen file into a piece schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentInfo {
    pub info_hash: InfoHash,
    pub name: String,
    pub piece_length: u64,
    pub piece_count: u32,
    pub total_size: u64,
    pub files: Vec<FileEntry>,
    /// Deduplicated, order-preserving announce URLs
    pub trackers: Vec<String>,
    pub is_private: bool,
}

impl TorrentInfo {
    /// Builds a single-file layout, mostly useful for tests and simulation.
    pub fn single_file(info_hash: InfoHash, name: &str, piece_length: u64, length: u64) -> Self {
        let piece_count = length.div_ceil(piece_length.max(1)) as u32;
        Self {
            info_hash,
            name: name.to_string(),
            piece_length,
            piece_count,
            total_size: length,
            files: vec![FileEntry {
                path: vec![name.to_string()],
                offset: 0,
                length,
            }],
            trackers: Vec::new(),
            is_private: false,
        }
    }

    /// Builds a multi-file layout with contiguous offsets.
    pub fn multi_file(
        info_hash: InfoHash,
        name: &str,
        piece_length: u64,
        files: &[(&str, u64)],
    ) -> Self {
        let mut offset = 0;
        let entries = files
            .iter()
            .map(|(path, length)| {
                let entry = FileEntry {
                    path: path.split('/').map(str::to_string).collect(),
                    offset,
                    length: *length,
                };
                offset += length;
                entry
            })
            .collect();

        Self {
            info_hash,
            name: name.to_string(),
            piece_length,
            piece_count: offset.div_ceil(piece_length.max(1)) as u32,
            total_size: offset,
            files: entries,
            trackers: Vec::new(),
            is_private: false,
        }
    }
}

/// Individual file within a torrent.
///
/// `offset` is the byte position of the file within the concatenated
/// torrent payload, which is what maps it onto pieces.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: Vec<String>,
    pub offset: u64,
    pub length: u64,
}

impl FileEntry {
    /// Relative path joined with `/`.
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }

    /// Inclusive piece range covered by this file.
    ///
    /// Returns `None` for empty files, which occupy no piece.
    pub fn piece_span(&self, piece_length: u64) -> Option<(u32, u32)> {
        if self.length == 0 || piece_length == 0 {
            return None;
        }
        let start = self.offset / piece_length;
        let end = (self.offset + self.length - 1) / piece_length;
        Some((start as u32, end as u32))
    }
}

/// Magnet link components.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

/// Appends `url` unless already present, keeping first-seen order.
pub(crate) fn push_unique(trackers: &mut Vec<String>, url: String) {
    if !url.is_empty() && !trackers.contains(&url) {
        trackers.push(url);
    }
}
