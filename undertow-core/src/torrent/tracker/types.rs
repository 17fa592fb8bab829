//! Core types for tracker communication

use std::fmt;
use std::net::SocketAddr;
use std::ops::Range;

use async_trait::async_trait;

use crate::torrent::{InfoHash, TorrentError};

/// Tracker announce request.
///
/// Contains client statistics and torrent information sent to tracker
/// during announce operations to report progress and request peer list.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    /// Unique identifier for the torrent being announced
    pub info_hash: InfoHash,
    /// Client's unique 20-byte identifier
    pub peer_id: [u8; 20],
    /// TCP port client is listening on for peer connections
    pub port: u16,
    /// Total bytes uploaded to other peers
    pub uploaded: u64,
    /// Total bytes downloaded from other peers
    pub downloaded: u64,
    /// Bytes remaining to download (0 for seeders)
    pub left: u64,
    /// Current client state for this torrent
    pub event: AnnounceEvent,
    /// Random key letting the tracker recognise this client across IP changes
    pub key: u32,
    /// Peers wanted, `None` for the tracker default
    pub num_want: Option<u32>,
}

/// BitTorrent announce events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    None,
    Completed,
    Started,
    Stopped,
}

impl AnnounceEvent {
    pub fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Completed => 1,
            Self::Started => 2,
            Self::Stopped => 3,
        }
    }
}

/// Tracker announce response.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnounceResponse {
    /// Seconds until next announce request should be sent
    pub interval: u32,
    pub seeders: u32,
    pub leechers: u32,
    /// Peer addresses for connection attempts
    pub peers: Vec<SocketAddr>,
}

/// Individual torrent statistics from scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    /// Number of seeders (peers with complete file)
    pub seeders: u32,
    /// Total number of completed downloads
    pub completed: u32,
    /// Number of leechers (peers downloading)
    pub leechers: u32,
}

/// Outcome of one scrape request.
///
/// `hashes` indexes into the slice handed to the scrape; a failed batch
/// does not affect the batches before or after it.
#[derive(Debug)]
pub struct ScrapeBatch {
    pub hashes: Range<usize>,
    pub result: Result<Vec<ScrapeStats>, TorrentError>,
}

impl ScrapeBatch {
    /// Pairs each answered position with its stats; empty for a failed batch.
    pub fn answered(&self) -> impl Iterator<Item = (usize, ScrapeStats)> + '_ {
        let stats = self.result.as_deref().unwrap_or_default();
        self.hashes.clone().zip(stats.iter().copied())
    }
}

/// Fetches swarm statistics from one tracker.
///
/// One call connects once and sends every batch over that connection;
/// retry policy belongs to the caller.
#[async_trait]
pub trait TrackerScraper: Send + Sync + fmt::Debug {
    /// Returns one [`ScrapeBatch`] per request, in the order given.
    ///
    /// Batch failures are reported inside each batch:
    /// `TorrentError::RequestTimedOut`, `TorrentError::TransactionMismatch`
    /// or `TorrentError::TrackerProtocolError`.
    ///
    /// # Errors
    ///
    /// - `TorrentError::UnsupportedTrackerScheme` - Tracker is not `udp://`
    /// - `TorrentError::TrackerConnectFailed` - Address lookup or socket setup failed
    /// - `TorrentError::RequestTimedOut` - Connect handshake went unanswered
    /// - `TorrentError::TransactionMismatch` - Connect response echoed a different transaction
    async fn scrape(
        &self,
        tracker_url: &str,
        hashes: &[InfoHash],
    ) -> Result<Vec<ScrapeBatch>, TorrentError>;
}
