//! Streaming buffer controller
//!
//! Turns a transfer into a playable stream: adds or reattaches the transfer,
//! picks the file, installs a head/tail piece schedule, tracks buffering at
//! block granularity and supervises playback. Loops communicate through the
//! event bus; a terminal failure on the bus unwinds all of them.

pub mod controller;
pub mod disk;
pub mod files;
pub mod host;
pub mod progress;
pub mod resume;
pub mod schedule;

use std::sync::Arc;
use std::time::Duration;

pub use controller::{Player, PlayerOptions, StartSource, StreamEvent};
pub use disk::{FixedSpace, SpaceProbe, SystemSpaceProbe};
pub use files::{FileCandidate, select_file};
pub use host::{
    HeadlessHost, PlaybackHost, ProgressTracker, TrackedContent, TrackingEvent,
};
pub use progress::BufferProgress;
pub use resume::ResumeStore;
pub use schedule::{BufferSchedule, WindowSizing};

use crate::engine::EngineError;
use crate::torrent::TorrentError;

/// Errors surfaced by the buffer controller.
///
/// Cloneable so a single failure can be broadcast to every loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlayerError {
    #[error("No download directory configured")]
    NoDownloadPathConfigured,

    #[error("Not enough disk space: {needed} bytes left to download, {available} available")]
    InsufficientDiskSpace { needed: u64, available: u64 },

    #[error("Failed to add transfer: {reason}")]
    TransferAddFailed { reason: String },

    #[error("Transfer contains no playable file")]
    NoCandidateFile,

    #[error("{} files could be streamed, a file index is required", .0.len())]
    NeedsDisambiguation(Vec<FileCandidate>),

    #[error("No transfer at resume index {index}")]
    UnknownResumeHandle { index: usize },

    #[error("Stream was not started")]
    NotStarted,

    #[error("Cancelled by user")]
    UserCancelled,

    #[error("Playback did not start within {timeout:?}")]
    PlaybackStartTimeout { timeout: Duration },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Torrent error: {0}")]
    Torrent(Arc<TorrentError>),
}

impl From<TorrentError> for PlayerError {
    fn from(err: TorrentError) -> Self {
        Self::Torrent(Arc::new(err))
    }
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Adding,
    Resuming,
    AwaitingMetadata,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Failed,
}

impl PlayerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}
