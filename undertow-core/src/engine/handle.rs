//! Handle for communicating with the simulated engine actor.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{EngineCommand, EngineSnapshot};
use super::types::{
    AddTorrentParams, EngineAlert, PartialPiece, PiecePriority, SessionSettings, TransferStatus,
};
use super::{EngineError, TransferEngine};
use crate::torrent::{InfoHash, TorrentInfo};

/// Cloneable handle to the simulated engine actor.
///
/// Every clone talks to the same actor. Once the actor has stopped all
/// operations return `EngineError::SessionClosed`.
#[derive(Clone)]
pub struct SimulatedEngine {
    sender: mpsc::Sender<EngineCommand>,
    alerts: broadcast::Sender<EngineAlert>,
}

impl fmt::Debug for SimulatedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedEngine")
            .field("running", &self.is_running())
            .finish()
    }
}

impl SimulatedEngine {
    pub(super) fn new(
        sender: mpsc::Sender<EngineCommand>,
        alerts: broadcast::Sender<EngineAlert>,
    ) -> Self {
        Self { sender, alerts }
    }

    /// Registers metadata served to magnets with the same info hash.
    ///
    /// Magnets without registered metadata receive a synthesized single-file
    /// layout.
    pub async fn register_metadata(&self, info: TorrentInfo) -> Result<(), EngineError> {
        self.request(|responder| EngineCommand::RegisterMetadata { info, responder })
            .await
    }

    /// Engine-wide state for diagnostics and tests.
    pub async fn inspect(&self) -> Result<EngineSnapshot, EngineError> {
        self.request(|responder| EngineCommand::Inspect { responder })
            .await
    }

    /// Returns true while the actor accepts commands.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(build(responder))
            .await
            .map_err(|_| EngineError::SessionClosed)?;

        rx.await.map_err(|_| EngineError::SessionClosed)?
    }
}

#[async_trait]
impl TransferEngine for SimulatedEngine {
    async fn apply_settings(&self, settings: SessionSettings) -> Result<(), EngineError> {
        self.request(|responder| EngineCommand::ApplySettings {
            settings,
            responder,
        })
        .await
    }

    async fn add_torrent(&self, params: AddTorrentParams) -> Result<InfoHash, EngineError> {
        self.request(|responder| EngineCommand::AddTorrent { params, responder })
            .await
    }

    async fn torrents(&self) -> Result<Vec<TransferStatus>, EngineError> {
        self.request(|responder| EngineCommand::Torrents { responder })
            .await
    }

    async fn status(&self, info_hash: InfoHash) -> Result<TransferStatus, EngineError> {
        self.request(|responder| EngineCommand::Status {
            info_hash,
            responder,
        })
        .await
    }

    async fn torrent_info(&self, info_hash: InfoHash) -> Result<TorrentInfo, EngineError> {
        self.request(|responder| EngineCommand::TorrentInfo {
            info_hash,
            responder,
        })
        .await
    }

    async fn remove_torrent(
        &self,
        info_hash: InfoHash,
        delete_files: bool,
    ) -> Result<(), EngineError> {
        self.request(|responder| EngineCommand::RemoveTorrent {
            info_hash,
            delete_files,
            responder,
        })
        .await
    }

    async fn set_sequential_download(
        &self,
        info_hash: InfoHash,
        sequential: bool,
    ) -> Result<(), EngineError> {
        self.request(|responder| EngineCommand::SetSequential {
            info_hash,
            sequential,
            responder,
        })
        .await
    }

    async fn prioritize_pieces(
        &self,
        info_hash: InfoHash,
        priorities: Vec<PiecePriority>,
    ) -> Result<(), EngineError> {
        self.request(|responder| EngineCommand::PrioritizePieces {
            info_hash,
            priorities,
            responder,
        })
        .await
    }

    async fn piece_priorities(
        &self,
        info_hash: InfoHash,
    ) -> Result<Vec<PiecePriority>, EngineError> {
        self.request(|responder| EngineCommand::PiecePriorities {
            info_hash,
            responder,
        })
        .await
    }

    async fn set_piece_deadline(
        &self,
        info_hash: InfoHash,
        piece: u32,
        deadline: Duration,
    ) -> Result<(), EngineError> {
        self.request(|responder| EngineCommand::SetPieceDeadline {
            info_hash,
            piece,
            deadline,
            responder,
        })
        .await
    }

    async fn have_piece(&self, info_hash: InfoHash, piece: u32) -> Result<bool, EngineError> {
        self.request(|responder| EngineCommand::HavePiece {
            info_hash,
            piece,
            responder,
        })
        .await
    }

    async fn download_queue(&self, info_hash: InfoHash) -> Result<Vec<PartialPiece>, EngineError> {
        self.request(|responder| EngineCommand::DownloadQueue {
            info_hash,
            responder,
        })
        .await
    }

    async fn set_rate_limits(
        &self,
        download: Option<u64>,
        upload: Option<u64>,
    ) -> Result<(), EngineError> {
        self.request(|responder| EngineCommand::SetRateLimits {
            download,
            upload,
            responder,
        })
        .await
    }

    async fn resume_data(&self, info_hash: InfoHash) -> Result<Vec<u8>, EngineError> {
        self.request(|responder| EngineCommand::ResumeData {
            info_hash,
            responder,
        })
        .await
    }

    fn subscribe_alerts(&self) -> broadcast::Receiver<EngineAlert> {
        self.alerts.subscribe()
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::Shutdown { responder })
            .await
            .map_err(|_| EngineError::SessionClosed)?;

        rx.await.map_err(|_| EngineError::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::engine::spawn_simulated_engine;
    use crate::engine::types::{AlertKind, TransferSource, TransferState};

    fn magnet(hash: &InfoHash) -> AddTorrentParams {
        AddTorrentParams {
            source: TransferSource::Magnet(format!("magnet:?xt=urn:btih:{hash}&dn=Sample")),
            save_path: std::env::temp_dir(),
            resume_data: None,
        }
    }

    #[tokio::test]
    async fn test_magnet_transfer_downloads_to_completion() {
        let mut config = SimulationConfig::deterministic_testing();
        config.synthetic_payload_size = 4 * 1024 * 1024;
        let engine = spawn_simulated_engine(config);
        let mut alerts = engine.subscribe_alerts();

        let hash = InfoHash::new([3; 20]);
        assert_eq!(engine.add_torrent(magnet(&hash)).await.unwrap(), hash);

        let mut seen_metadata = false;
        loop {
            let alert = alerts.recv().await.unwrap();
            assert_eq!(alert.info_hash, hash);
            match alert.kind {
                AlertKind::MetadataReceived => seen_metadata = true,
                AlertKind::TorrentFinished => break,
                _ => {}
            }
        }
        assert!(seen_metadata);

        let status = engine.status(hash).await.unwrap();
        assert_eq!(status.state, TransferState::Finished);
        assert_eq!(status.total_done, 4 * 1024 * 1024);
        assert!(engine.have_piece(hash, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_operations_fail_after_shutdown() {
        let engine = spawn_simulated_engine(SimulationConfig::deterministic_testing());
        engine.shutdown().await.unwrap();

        let result = engine.torrents().await;
        assert!(matches!(result, Err(EngineError::SessionClosed)));
        assert!(matches!(
            engine.shutdown().await,
            Err(EngineError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_unknown_transfer_reports_not_found() {
        let engine = spawn_simulated_engine(SimulationConfig::deterministic_testing());
        let result = engine.status(InfoHash::new([1; 20])).await;
        assert!(matches!(result, Err(EngineError::TorrentNotFound { .. })));
    }

    #[tokio::test]
    async fn test_inspect_records_limits_and_removals() {
        let engine = spawn_simulated_engine(SimulationConfig::deterministic_testing());
        let hash = InfoHash::new([5; 20]);
        engine.add_torrent(magnet(&hash)).await.unwrap();
        engine.set_rate_limits(Some(1000), Some(10)).await.unwrap();
        engine.remove_torrent(hash, true).await.unwrap();

        let snapshot = engine.inspect().await.unwrap();
        assert_eq!(snapshot.download_rate_limit, Some(1000));
        assert_eq!(snapshot.upload_rate_limit, Some(10));
        assert_eq!(snapshot.removals, vec![(hash, true)]);
    }
}
