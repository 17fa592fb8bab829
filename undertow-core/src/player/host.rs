//! Playback host and progress-tracking collaborators.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// UI and media player the controller reports to.
///
/// Implementations must be cheap to call from polling loops.
pub trait PlaybackHost: Send + Sync + fmt::Debug {
    fn is_playing(&self) -> bool;
    fn is_paused(&self) -> bool;

    /// Shows a blocking progress dialog.
    fn show_progress(&self, title: &str);
    fn update_progress(&self, percent: u8, detail: &str);
    /// True once the user asked to cancel the progress dialog.
    fn progress_cancelled(&self) -> bool;
    fn hide_progress(&self);

    /// Shows a non-blocking overlay on top of playback.
    fn show_overlay(&self, text: &str);
    fn hide_overlay(&self);

    /// Single-choice prompt, `None` when dismissed.
    fn select(&self, title: &str, options: &[String]) -> Option<usize>;

    /// Starts playing `target`.
    fn play(&self, target: &str);
    fn notify(&self, message: &str);
}

/// Lifecycle events sent to a progress-tracking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingEvent {
    Start,
    /// Also sent when playback resumes after a pause
    Update,
    Pause,
    Stop,
}

/// Content being watched, as known to the tracking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedContent {
    /// e.g. "movie" or "episode"
    pub content_type: String,
    pub external_id: u64,
    pub runtime_secs: u64,
}

pub trait ProgressTracker: Send + Sync + fmt::Debug {
    fn track(&self, event: TrackingEvent, content: &TrackedContent);
}

/// Host without a UI.
///
/// Progress goes to the log. Playback state is driven from outside through
/// [`HeadlessHost::set_playing`] and friends, which is how the CLI and tests
/// stand in for a media player.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    autoplay: bool,
    choice: Option<usize>,
    playing: AtomicBool,
    paused: AtomicBool,
    cancelled: AtomicBool,
    played: Mutex<Vec<String>>,
    notifications: Mutex<Vec<String>>,
    overlay: Mutex<Option<String>>,
}

impl HeadlessHost {
    /// A host whose `play` immediately reports playback as started.
    pub fn autoplay() -> Self {
        Self {
            autoplay: true,
            ..Self::default()
        }
    }

    /// Answers every selection prompt with `choice`.
    pub fn with_choice(mut self, choice: usize) -> Self {
        self.choice = Some(choice);
        self
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }

    pub fn overlay(&self) -> Option<String> {
        self.overlay.lock().clone()
    }
}

impl PlaybackHost for HeadlessHost {
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn show_progress(&self, title: &str) {
        info!("{}", title);
    }

    fn update_progress(&self, percent: u8, detail: &str) {
        debug!("[{:>3}%] {}", percent, detail);
    }

    fn progress_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn hide_progress(&self) {}

    fn show_overlay(&self, text: &str) {
        *self.overlay.lock() = Some(text.to_string());
    }

    fn hide_overlay(&self) {
        *self.overlay.lock() = None;
    }

    fn select(&self, title: &str, options: &[String]) -> Option<usize> {
        info!("{}: {}", title, options.join(", "));
        self.choice.filter(|choice| *choice < options.len())
    }

    fn play(&self, target: &str) {
        info!("Playing {}", target);
        self.played.lock().push(target.to_string());
        if self.autoplay {
            self.set_playing(true);
        }
    }

    fn notify(&self, message: &str) {
        info!("{}", message);
        self.notifications.lock().push(message.to_string());
    }
}
