//! Torrent identity, metadata resolution, quality inference and tracker scrape

pub mod candidate;
pub mod parsing;
pub mod quality;
pub mod resolver;
pub mod tracker;

use std::fmt;
use std::str::FromStr;

pub use candidate::{CandidateTorrent, LocatorSource, TorrentLocator, format_size};
pub use parsing::{BencodeParser, FileEntry, MagnetLink, MagnetParser, TorrentInfo};
pub use quality::{AudioCodec, QualityTags, Resolution, RipType, SceneRating, VideoCodec};
pub use resolver::{ResolvedTorrent, TorrentResolver};
pub use tracker::{
    DEFAULT_TRACKERS, ScrapeBatch, ScrapeStats, TrackerScraper, UdpTracker, UdpTrackerScraper,
};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file.
/// Displays as 40 lowercase hex characters, the canonical identity used
/// for deduplication, resume-data file names and engine lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses a 40-character hex info hash, case-insensitive.
    ///
    /// # Errors
    /// - `TorrentError::InvalidLocator` - Wrong length or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, TorrentError> {
        if hex_str.len() != 40 {
            return Err(TorrentError::InvalidLocator {
                reason: format!("Invalid hash length: {} (expected 40)", hex_str.len()),
            });
        }

        let mut hash = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut hash).map_err(|_| TorrentError::InvalidLocator {
            reason: format!("Invalid hex character in hash: {hex_str}"),
        })?;
        Ok(Self(hash))
    }

    /// Parses a 32-character base32 info hash (RFC 4648 alphabet).
    ///
    /// # Errors
    /// - `TorrentError::InvalidLocator` - Wrong length or invalid base32 symbols
    pub fn from_base32(b32_str: &str) -> Result<Self, TorrentError> {
        if b32_str.len() != 32 {
            return Err(TorrentError::InvalidLocator {
                reason: format!("Invalid hash length: {} (expected 32)", b32_str.len()),
            });
        }

        let decoded = data_encoding::BASE32
            .decode(b32_str.to_ascii_uppercase().as_bytes())
            .map_err(|e| TorrentError::InvalidLocator {
                reason: format!("Invalid base32 hash {b32_str}: {e}"),
            })?;

        let hash: [u8; 20] = decoded
            .try_into()
            .map_err(|_| TorrentError::InvalidLocator {
                reason: format!("Base32 hash {b32_str} does not decode to 20 bytes"),
            })?;
        Ok(Self(hash))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for InfoHash {
    type Err = TorrentError;

    /// Accepts either the 40-character hex or 32-character base32 form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            32 => Self::from_base32(s),
            _ => Self::from_hex(s),
        }
    }
}

/// Errors that can occur while resolving torrents or talking to trackers.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("Invalid locator: {reason}")]
    InvalidLocator { reason: String },

    #[error("Failed to resolve {locator}: {reason}")]
    ResolutionFailed { locator: String, reason: String },

    #[error("Failed to parse torrent file: {reason}")]
    InvalidTorrentFile { reason: String },

    #[error("Unsupported tracker scheme: {url}")]
    UnsupportedTrackerScheme { url: String },

    #[error("Tracker connection failed: {url}: {reason}")]
    TrackerConnectFailed { url: String, reason: String },

    #[error("Tracker request to {url} timed out")]
    RequestTimedOut { url: String },

    #[error("Tracker {url} echoed transaction {received:#x}, expected {expected:#x}")]
    TransactionMismatch {
        url: String,
        expected: u32,
        received: u32,
    },

    #[error("Tracker protocol error: {message}")]
    TrackerProtocolError { message: String },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error")]
    UrlParsing(#[from] url::ParseError),

    #[error("HTTP error")]
    Http(#[from] reqwest::Error),
}
