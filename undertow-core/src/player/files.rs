//! Choosing which file of a transfer to stream.

use serde::{Deserialize, Serialize};

use super::PlayerError;
use crate::torrent::TorrentInfo;

/// A file that could be streamed, offered when the choice is ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCandidate {
    pub index: usize,
    pub path: String,
    pub length: u64,
}

/// Picks the file to stream.
///
/// Files at or above `min_size` are candidates. With several candidates the
/// caller must supply `file_index`, otherwise `NeedsDisambiguation` lists
/// them. With one or no candidate the largest file wins.
///
/// # Errors
/// - `PlayerError::NoCandidateFile` - Transfer has no non-empty file
/// - `PlayerError::NeedsDisambiguation` - Several large files and no index
pub fn select_file(
    info: &TorrentInfo,
    min_size: u64,
    file_index: Option<usize>,
) -> Result<usize, PlayerError> {
    let candidates: Vec<FileCandidate> = info
        .files
        .iter()
        .enumerate()
        .filter(|(_, file)| file.length >= min_size)
        .map(|(index, file)| FileCandidate {
            index,
            path: file.display_path(),
            length: file.length,
        })
        .collect();

    if candidates.len() > 1 {
        return match file_index {
            Some(index) if candidates.iter().any(|c| c.index == index) => Ok(index),
            _ => Err(PlayerError::NeedsDisambiguation(candidates)),
        };
    }

    info.files
        .iter()
        .enumerate()
        .filter(|(_, file)| file.length > 0)
        .max_by_key(|(index, file)| (file.length, std::cmp::Reverse(*index)))
        .map(|(index, _)| index)
        .ok_or(PlayerError::NoCandidateFile)
}
