//! Data exchanged with the embedded transfer engine

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{EncryptionPolicy, ProxyConfig, UndertowConfig};
use crate::torrent::{InfoHash, TorrentInfo};

/// Per-piece download priority.
///
/// Discriminants follow the usual engine scale where 0 means "do not
/// download" and 7 is the highest priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PiecePriority {
    /// Do not fetch
    Skip = 0,
    #[default]
    Normal = 4,
    /// Do not skip, fetch immediately
    Immediate = 7,
}

/// Lifecycle state of a transfer as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Verifying existing data against fast-resume information
    CheckingResumeData,
    CheckingFiles,
    DownloadingMetadata,
    Downloading,
    /// All wanted pieces downloaded
    Finished,
    Seeding,
}

impl TransferState {
    pub fn is_checking(self) -> bool {
        matches!(self, Self::CheckingResumeData | Self::CheckingFiles)
    }
}

/// Snapshot of one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferStatus {
    pub info_hash: InfoHash,
    pub name: String,
    /// Fraction of wanted data downloaded, or verification progress while checking
    pub progress: f32,
    pub state: TransferState,
    pub paused: bool,
    pub has_metadata: bool,
    /// Bytes per second
    pub download_rate: u64,
    /// Bytes per second
    pub upload_rate: u64,
    pub num_seeds: u32,
    pub num_peers: u32,
    /// Bytes of wanted pieces already verified
    pub total_done: u64,
    /// Bytes of pieces not marked skip
    pub total_wanted: u64,
    pub all_time_download: u64,
    pub all_time_upload: u64,
    pub active_time: Duration,
    pub finished_time: Duration,
}

/// What a transfer is added from.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferSource {
    /// Magnet URI; metadata arrives later via `AlertKind::MetadataReceived`
    Magnet(String),
    /// Parsed `.torrent` metadata
    Metadata(TorrentInfo),
}

/// Parameters for adding a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct AddTorrentParams {
    pub source: TransferSource,
    pub save_path: PathBuf,
    /// Serialized fast-resume state from a previous run
    pub resume_data: Option<Vec<u8>>,
}

/// Download progress of one block inside an in-flight piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockProgress {
    pub bytes_downloaded: u32,
    pub block_size: u32,
}

/// In-flight piece from the engine's download queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialPiece {
    pub piece_index: u32,
    pub blocks: Vec<BlockProgress>,
}

impl PartialPiece {
    /// Downloaded fraction of this piece across all blocks.
    pub fn fraction(&self) -> f64 {
        let (done, total) = self.blocks.iter().fold((0u64, 0u64), |(done, total), block| {
            (
                done + u64::from(block.bytes_downloaded),
                total + u64::from(block.block_size),
            )
        });
        if total == 0 {
            0.0
        } else {
            (done as f64 / total as f64).min(1.0)
        }
    }
}

/// Alert classification used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCategory {
    Error,
    Status,
    Storage,
}

/// Typed engine notification.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertKind {
    MetadataReceived,
    StateChanged {
        previous: TransferState,
        current: TransferState,
    },
    TorrentFinished,
    TorrentRemoved,
    FileError { message: String },
    TorrentError { message: String },
}

/// Notification keyed to a specific transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineAlert {
    pub info_hash: InfoHash,
    pub kind: AlertKind,
}

impl EngineAlert {
    pub fn new(info_hash: InfoHash, kind: AlertKind) -> Self {
        Self { info_hash, kind }
    }

    pub fn category(&self) -> AlertCategory {
        match self.kind {
            AlertKind::FileError { .. } => AlertCategory::Storage,
            AlertKind::TorrentError { .. } => AlertCategory::Error,
            AlertKind::MetadataReceived
            | AlertKind::StateChanged { .. }
            | AlertKind::TorrentFinished
            | AlertKind::TorrentRemoved => AlertCategory::Status,
        }
    }
}

/// Session-wide engine settings, applied once at session creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub user_agent: String,
    pub connections_limit: usize,
    pub encryption: EncryptionPolicy,
    pub proxy: Option<ProxyConfig>,
    pub listen_ports: (u16, u16),
    pub enable_dht: bool,
    pub enable_lsd: bool,
    pub enable_upnp: bool,
    pub enable_natpmp: bool,
    pub download_rate_limit: Option<u64>,
    pub upload_rate_limit: Option<u64>,
}

impl SessionSettings {
    /// Derives settings from configuration.
    ///
    /// Rate limits are left unrestricted when they should only engage
    /// after buffering.
    pub fn from_config(config: &UndertowConfig) -> Self {
        let network = &config.network;
        let stream = &config.stream;
        let (download_rate_limit, upload_rate_limit) = if stream.limit_after_buffering {
            (None, None)
        } else {
            (stream.max_download_rate, stream.max_upload_rate)
        };

        Self {
            user_agent: network.user_agent.clone(),
            connections_limit: network.connections_limit,
            encryption: network.encryption,
            proxy: network.proxy.clone(),
            listen_ports: network.listen_ports,
            enable_dht: network.enable_dht,
            enable_lsd: network.enable_lsd,
            enable_upnp: network.enable_upnp,
            enable_natpmp: network.enable_natpmp,
            download_rate_limit,
            upload_rate_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(PiecePriority::Skip < PiecePriority::Normal);
        assert!(PiecePriority::Normal < PiecePriority::Immediate);
        assert_eq!(PiecePriority::Immediate as u8, 7);
    }

    #[test]
    fn test_partial_piece_fraction() {
        let piece = PartialPiece {
            piece_index: 3,
            blocks: vec![
                BlockProgress {
                    bytes_downloaded: 16384,
                    block_size: 16384,
                },
                BlockProgress {
                    bytes_downloaded: 0,
                    block_size: 16384,
                },
            ],
        };
        assert_eq!(piece.fraction(), 0.5);
        assert_eq!(
            PartialPiece {
                piece_index: 0,
                blocks: Vec::new()
            }
            .fraction(),
            0.0
        );
    }

    #[test]
    fn test_alert_categories() {
        let hash = InfoHash::new([0; 20]);
        assert_eq!(
            EngineAlert::new(hash, AlertKind::MetadataReceived).category(),
            AlertCategory::Status
        );
        assert_eq!(
            EngineAlert::new(
                hash,
                AlertKind::FileError {
                    message: "disk".into()
                }
            )
            .category(),
            AlertCategory::Storage
        );
    }

    #[test]
    fn test_session_settings_defer_limits() {
        let mut config = UndertowConfig::default();
        config.stream.max_download_rate = Some(1000);
        assert_eq!(
            SessionSettings::from_config(&config).download_rate_limit,
            Some(1000)
        );

        config.stream.limit_after_buffering = true;
        assert_eq!(SessionSettings::from_config(&config).download_rate_limit, None);
    }
}
