//! Embedded transfer engine boundary with trait-based abstraction
//!
//! The streaming controller only configures and steers an engine through
//! [`TransferEngine`]; bulk transfer mechanics live behind it. Alerts are a
//! closed enum produced at this boundary. A deterministic simulated engine
//! implements the trait for development and tests.

pub mod actor;
pub mod commands;
pub mod handle;
pub mod session;
pub mod simulated;
pub mod types;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use actor::spawn_simulated_engine;
pub use handle::SimulatedEngine;
pub use session::{EngineSession, with_session};
pub use types::{
    AddTorrentParams, AlertCategory, AlertKind, BlockProgress, EngineAlert, PartialPiece,
    PiecePriority, SessionSettings, TransferSource, TransferState, TransferStatus,
};

use crate::torrent::{InfoHash, TorrentInfo};

/// Errors reported by the transfer engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Transfer {info_hash} not found")]
    TorrentNotFound { info_hash: InfoHash },

    #[error("Metadata for {info_hash} not yet available")]
    MetadataUnavailable { info_hash: InfoHash },

    #[error("Piece {index} out of range for {info_hash}")]
    InvalidPiece { info_hash: InfoHash, index: u32 },

    #[error("Failed to add transfer: {reason}")]
    AddFailed { reason: String },

    #[error("Engine session closed")]
    SessionClosed,
}

/// Operations the streaming controller needs from an embedded engine.
///
/// Transfers are addressed by info hash.
#[async_trait]
pub trait TransferEngine: Send + Sync + fmt::Debug {
    /// Applies session-wide settings.
    ///
    /// # Errors
    /// - `EngineError::SessionClosed` - Engine already shut down
    async fn apply_settings(&self, settings: SessionSettings) -> Result<(), EngineError>;

    /// Adds a transfer, returning its info hash.
    ///
    /// # Errors
    /// - `EngineError::AddFailed` - Source rejected by the engine
    /// - `EngineError::SessionClosed` - Engine already shut down
    async fn add_torrent(&self, params: AddTorrentParams) -> Result<InfoHash, EngineError>;

    /// Status of every transfer in insertion order.
    async fn torrents(&self) -> Result<Vec<TransferStatus>, EngineError>;

    /// # Errors
    /// - `EngineError::TorrentNotFound` - Unknown transfer
    async fn status(&self, info_hash: InfoHash) -> Result<TransferStatus, EngineError>;

    /// Metadata once received.
    ///
    /// # Errors
    /// - `EngineError::TorrentNotFound` - Unknown transfer
    /// - `EngineError::MetadataUnavailable` - Magnet metadata not yet received
    async fn torrent_info(&self, info_hash: InfoHash) -> Result<TorrentInfo, EngineError>;

    /// Removes a transfer, optionally deleting its downloaded data.
    async fn remove_torrent(&self, info_hash: InfoHash, delete_files: bool)
    -> Result<(), EngineError>;

    async fn set_sequential_download(
        &self,
        info_hash: InfoHash,
        sequential: bool,
    ) -> Result<(), EngineError>;

    /// Replaces the whole piece priority vector.
    ///
    /// # Errors
    /// - `EngineError::InvalidPiece` - Vector length does not match the piece count
    async fn prioritize_pieces(
        &self,
        info_hash: InfoHash,
        priorities: Vec<PiecePriority>,
    ) -> Result<(), EngineError>;

    async fn piece_priorities(&self, info_hash: InfoHash)
    -> Result<Vec<PiecePriority>, EngineError>;

    /// Asks the engine to have `piece` within `deadline`.
    async fn set_piece_deadline(
        &self,
        info_hash: InfoHash,
        piece: u32,
        deadline: Duration,
    ) -> Result<(), EngineError>;

    async fn have_piece(&self, info_hash: InfoHash, piece: u32) -> Result<bool, EngineError>;

    /// Block-level snapshot of pieces currently being downloaded.
    async fn download_queue(&self, info_hash: InfoHash) -> Result<Vec<PartialPiece>, EngineError>;

    /// Session rate limits in bytes per second; `None` is unrestricted.
    async fn set_rate_limits(
        &self,
        download: Option<u64>,
        upload: Option<u64>,
    ) -> Result<(), EngineError>;

    /// Serialized fast-resume state for a transfer.
    async fn resume_data(&self, info_hash: InfoHash) -> Result<Vec<u8>, EngineError>;

    /// Opens a new alert stream.
    fn subscribe_alerts(&self) -> broadcast::Receiver<EngineAlert>;

    /// Stops the engine; later calls fail with `EngineError::SessionClosed`.
    async fn shutdown(&self) -> Result<(), EngineError>;
}
