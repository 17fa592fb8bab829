//! Command definitions for the simulated engine actor.

use std::time::Duration;

use tokio::sync::oneshot;

use super::EngineError;
use super::types::{AddTorrentParams, PartialPiece, PiecePriority, SessionSettings, TransferStatus};
use crate::torrent::{InfoHash, TorrentInfo};

type Responder<T> = oneshot::Sender<Result<T, EngineError>>;

/// Commands that can be sent to the engine actor.
///
/// Each command carries a response channel; the actor processes them in
/// order, interleaved with simulation ticks.
pub enum EngineCommand {
    ApplySettings {
        settings: SessionSettings,
        responder: Responder<()>,
    },
    AddTorrent {
        params: AddTorrentParams,
        responder: Responder<InfoHash>,
    },
    RegisterMetadata {
        info: TorrentInfo,
        responder: Responder<()>,
    },
    Torrents {
        responder: Responder<Vec<TransferStatus>>,
    },
    Status {
        info_hash: InfoHash,
        responder: Responder<TransferStatus>,
    },
    TorrentInfo {
        info_hash: InfoHash,
        responder: Responder<TorrentInfo>,
    },
    RemoveTorrent {
        info_hash: InfoHash,
        delete_files: bool,
        responder: Responder<()>,
    },
    SetSequential {
        info_hash: InfoHash,
        sequential: bool,
        responder: Responder<()>,
    },
    PrioritizePieces {
        info_hash: InfoHash,
        priorities: Vec<PiecePriority>,
        responder: Responder<()>,
    },
    PiecePriorities {
        info_hash: InfoHash,
        responder: Responder<Vec<PiecePriority>>,
    },
    SetPieceDeadline {
        info_hash: InfoHash,
        piece: u32,
        deadline: Duration,
        responder: Responder<()>,
    },
    HavePiece {
        info_hash: InfoHash,
        piece: u32,
        responder: Responder<bool>,
    },
    DownloadQueue {
        info_hash: InfoHash,
        responder: Responder<Vec<PartialPiece>>,
    },
    SetRateLimits {
        download: Option<u64>,
        upload: Option<u64>,
        responder: Responder<()>,
    },
    ResumeData {
        info_hash: InfoHash,
        responder: Responder<Vec<u8>>,
    },
    Inspect {
        responder: Responder<EngineSnapshot>,
    },
    Shutdown {
        responder: oneshot::Sender<()>,
    },
}

/// Observable engine-wide state, used by tooling and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSnapshot {
    pub settings: Option<SessionSettings>,
    pub download_rate_limit: Option<u64>,
    pub upload_rate_limit: Option<u64>,
    /// `(info_hash, delete_files)` for every removal, in order
    pub removals: Vec<(InfoHash, bool)>,
    /// Transfers with sequential download enabled
    pub sequential: Vec<InfoHash>,
    /// Pieces that currently carry a deadline, per transfer
    pub deadlines: Vec<(InfoHash, Vec<u32>)>,
}
