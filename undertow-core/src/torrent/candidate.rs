//! Torrent locators and search candidates

use std::fmt;
use std::path::PathBuf;

use super::InfoHash;
use super::quality::QualityTags;

/// Where the metadata for a torrent can be obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorSource {
    /// `magnet:?xt=urn:btih:...` URI, resolved without network I/O.
    Magnet(String),
    /// HTTP(S) URL serving `.torrent` bytes.
    Url(String),
    /// Local `.torrent` file.
    Path(PathBuf),
    /// Raw `.torrent` bytes already in memory.
    Bytes(Vec<u8>),
}

impl LocatorSource {
    /// Classifies a user-supplied string as magnet, URL or path.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("magnet:") {
            Self::Magnet(trimmed.to_string())
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }
}

impl fmt::Display for LocatorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Magnet(uri) | Self::Url(uri) => write!(f, "{uri}"),
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Bytes(bytes) => write!(f, "<{} torrent bytes>", bytes.len()),
        }
    }
}

/// A magnet URI or `.torrent` source plus whatever identity is already known.
///
/// Search providers often know the info hash and trackers up front; the
/// resolver fills in the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentLocator {
    pub source: LocatorSource,
    pub info_hash: Option<InfoHash>,
    pub name: Option<String>,
    /// Deduplicated, order-preserving tracker URLs
    pub trackers: Vec<String>,
    pub is_private: bool,
}

impl TorrentLocator {
    pub fn new(source: LocatorSource) -> Self {
        Self {
            source,
            info_hash: None,
            name: None,
            trackers: Vec::new(),
            is_private: false,
        }
    }

    /// Classifies `input` via [`LocatorSource::parse`].
    pub fn parse(input: &str) -> Self {
        Self::new(LocatorSource::parse(input))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(LocatorSource::Bytes(bytes))
    }

    pub fn with_info_hash(mut self, info_hash: InfoHash) -> Self {
        self.info_hash = Some(info_hash);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_trackers<I, S>(mut self, trackers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tracker in trackers {
            super::parsing::types::push_unique(&mut self.trackers, tracker.into());
        }
        self
    }
}

/// One search result prior to ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTorrent {
    pub locator: TorrentLocator,
    pub name: String,
    pub size_bytes: Option<u64>,
    /// Pre-formatted display size
    pub size: String,
    pub seeds: u32,
    pub peers: u32,
    /// Identifier of the backend that produced this result
    pub provider: String,
    pub quality: QualityTags,
    /// Set when results with the same hash but different tags were merged
    pub multi: bool,
}

impl CandidateTorrent {
    /// Creates a candidate with quality tags inferred from `name`.
    pub fn new(provider: impl Into<String>, name: impl Into<String>, locator: TorrentLocator) -> Self {
        let name = name.into();
        Self {
            quality: QualityTags::from_name(&name),
            locator,
            name,
            size_bytes: None,
            size: String::new(),
            seeds: 0,
            peers: 0,
            provider: provider.into(),
            multi: false,
        }
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.size_bytes = Some(bytes);
        self.size = format_size(bytes);
        self
    }

    pub fn with_counts(mut self, seeds: u32, peers: u32) -> Self {
        self.seeds = seeds;
        self.peers = peers;
        self
    }

    pub fn with_quality(mut self, quality: QualityTags) -> Self {
        self.quality = quality;
        self
    }

    pub fn info_hash(&self) -> Option<InfoHash> {
        self.locator.info_hash
    }

    /// Folds a duplicate of the same content into this record.
    ///
    /// Quality tags take the element-wise maximum; counts are kept from
    /// the first record since scrape data replaces them later.
    pub fn absorb(&mut self, other: &CandidateTorrent) {
        let merged = self.quality.merged(other.quality);
        if other.quality != self.quality {
            self.multi = true;
        }
        self.quality = merged;
        self.multi |= other.multi;

        if self.size_bytes.is_none() && other.size_bytes.is_some() {
            self.size_bytes = other.size_bytes;
            self.size = other.size.clone();
        }
        for tracker in &other.locator.trackers {
            super::parsing::types::push_unique(&mut self.locator.trackers, tracker.clone());
        }
    }

    /// Raises counts to scraped values, never lowering them.
    pub fn raise_counts(&mut self, seeds: u32, peers: u32) {
        self.seeds = self.seeds.max(seeds);
        self.peers = self.peers.max(peers);
    }
}

/// Formats a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::quality::{Resolution, RipType};

    #[test]
    fn test_locator_classification() {
        assert!(matches!(
            LocatorSource::parse("  MAGNET:?xt=urn:btih:abc"),
            LocatorSource::Magnet(_)
        ));
        assert!(matches!(
            LocatorSource::parse("https://example.com/file.torrent"),
            LocatorSource::Url(_)
        ));
        assert_eq!(
            LocatorSource::parse("/tmp/file.torrent"),
            LocatorSource::Path(PathBuf::from("/tmp/file.torrent"))
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(1_500_000_000), "1.4 GB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(512), "0.5 KB");
    }

    #[test]
    fn test_absorb_upgrades_quality_and_sets_multi() {
        let hash = InfoHash::new([1; 20]);
        let locator = TorrentLocator::parse("magnet:?x").with_info_hash(hash);

        let mut first = CandidateTorrent::new("a", "Movie 720p", locator.clone()).with_counts(10, 2);
        let second = CandidateTorrent::new("b", "Movie BluRay", locator.with_trackers(["udp://t:1"]))
            .with_counts(99, 99)
            .with_size(2048);

        first.absorb(&second);
        assert_eq!(first.quality.resolution, Resolution::Hd720);
        assert_eq!(first.quality.rip_type, RipType::BluRay);
        assert!(first.multi);
        assert_eq!(first.seeds, 10);
        assert_eq!(first.size, "2.0 KB");
        assert_eq!(first.locator.trackers, vec!["udp://t:1"]);
    }

    #[test]
    fn test_absorb_identical_is_noop() {
        let candidate = CandidateTorrent::new("a", "Movie 1080p", TorrentLocator::parse("magnet:?x"));
        let mut merged = candidate.clone();
        merged.absorb(&candidate);
        assert_eq!(merged, candidate);
    }

    #[test]
    fn test_raise_counts_never_lowers() {
        let mut candidate =
            CandidateTorrent::new("a", "x", TorrentLocator::parse("magnet:?x")).with_counts(50, 5);
        candidate.raise_counts(10, 20);
        assert_eq!((candidate.seeds, candidate.peers), (50, 20));
    }
}
