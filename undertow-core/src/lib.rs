//! Undertow Core - streaming torrent engine
//!
//! Resolves magnet links and `.torrent` files into canonical metadata,
//! scrapes UDP trackers for swarm health, and drives an embedded transfer
//! engine so a chosen file becomes playable before the transfer finishes.

pub mod bus;
pub mod config;
pub mod engine;
pub mod player;
pub mod service;
pub mod torrent;
pub mod tracing_setup;

pub use config::UndertowConfig;
pub use engine::{EngineError, EngineSession, TransferEngine};
pub use player::{Player, PlayerError, PlayerState};
pub use service::{StreamRegistry, StreamService};
pub use torrent::{InfoHash, TorrentError};

/// Errors that can bubble up from any Undertow subsystem.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Stream error: {0}")]
    Player(#[from] PlayerError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UndertowError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            UndertowError::Torrent(e) => match e {
                TorrentError::InvalidLocator { reason } => format!("Invalid link: {reason}"),
                TorrentError::InvalidTorrentFile { reason } => {
                    format!("Invalid torrent file: {reason}")
                }
                TorrentError::ResolutionFailed { locator, .. } => {
                    format!("Could not fetch torrent from {locator}")
                }
                _ => "Tracker or network error occurred".to_string(),
            },
            UndertowError::Engine(_) => "Transfer engine error occurred".to_string(),
            UndertowError::Player(e) => match e {
                PlayerError::NoDownloadPathConfigured => {
                    "Set a download directory before streaming".to_string()
                }
                PlayerError::InsufficientDiskSpace { .. }
                | PlayerError::PlaybackStartTimeout { .. }
                | PlayerError::NeedsDisambiguation(_)
                | PlayerError::NoCandidateFile => e.to_string(),
                PlayerError::UserCancelled => "Cancelled".to_string(),
                _ => "Streaming error occurred".to_string(),
            },
            UndertowError::Configuration { .. } => "Configuration error occurred".to_string(),
            UndertowError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input or user action.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            UndertowError::Configuration { .. }
                | UndertowError::Torrent(
                    TorrentError::InvalidLocator { .. } | TorrentError::InvalidTorrentFile { .. }
                )
                | UndertowError::Player(
                    PlayerError::NoDownloadPathConfigured | PlayerError::UserCancelled
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_classified() {
        let err = UndertowError::from(TorrentError::InvalidLocator {
            reason: "missing xt".to_string(),
        });
        assert!(err.is_user_error());
        assert_eq!(err.user_message(), "Invalid link: missing xt");

        let err = UndertowError::from(PlayerError::InsufficientDiskSpace {
            needed: 10,
            available: 1,
        });
        assert!(!err.is_user_error());
        assert!(err.user_message().contains("Not enough disk space"));

        assert!(UndertowError::from(PlayerError::NoDownloadPathConfigured).is_user_error());
    }
}
