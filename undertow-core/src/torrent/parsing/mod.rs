//! Torrent file and magnet link parsing.
//!
//! Metadata extraction uses bencode-rs for `.torrent` files and the `url`
//! query parser for magnet links. Both produce canonical info hashes.

pub mod bencode;
pub mod magnet;
pub mod types;

// Re-export public API
pub use bencode::BencodeParser;
pub use magnet::MagnetParser;
pub use types::{FileEntry, MagnetLink, TorrentInfo};
