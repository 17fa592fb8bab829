//! Player lifecycle and its supervising loops.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::disk::{SpaceProbe, SystemSpaceProbe};
use super::files::select_file;
use super::host::{PlaybackHost, ProgressTracker, TrackedContent, TrackingEvent};
use super::progress::BufferProgress;
use super::resume::ResumeStore;
use super::schedule::BufferSchedule;
use super::{PlayerError, PlayerState};
use crate::bus::{EventBus, EventWriter, RecvError, Subscription, event_bus};
use crate::config::{StreamConfig, UndertowConfig};
use crate::engine::{
    AddTorrentParams, AlertKind, EngineAlert, TransferEngine, TransferSource, TransferState,
};
use crate::torrent::{InfoHash, MagnetParser, ResolvedTorrent, TorrentInfo, format_size};

/// What to stream.
#[derive(Debug, Clone)]
pub enum StartSource {
    /// Add a new transfer
    Resolved(Box<ResolvedTorrent>),
    /// Reattach to the transfer at this index of the engine's transfer list
    Resume(usize),
}

/// Per-stream choices supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct PlayerOptions {
    /// File to stream when several qualify
    pub file_index: Option<usize>,
    /// Content reported to the progress tracker
    pub tracked: Option<TrackedContent>,
}

/// Values broadcast on a stream's bus.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    FileSelected { index: usize, path: String },
    /// Verification progress of existing data
    Checking(f32),
    /// Mean buffer fraction
    Buffering(f64),
    Buffered,
}

struct Selection {
    file_path: PathBuf,
    schedule: BufferSchedule,
    progress: Arc<BufferProgress>,
}

/// State shared by the loops of one stream.
struct StreamShared {
    engine: Arc<dyn TransferEngine>,
    config: StreamConfig,
    host: Arc<dyn PlaybackHost>,
    space: Arc<dyn SpaceProbe>,
    info_hash: InfoHash,
    save_path: Option<PathBuf>,
    file_index: Option<usize>,
    writer: EventWriter<StreamEvent, PlayerError>,
    state: Arc<Mutex<PlayerState>>,
    selection: Mutex<Option<Selection>>,
    metadata_handled: AtomicBool,
    out_of_space: AtomicBool,
    completion_reset: AtomicBool,
    /// Keep the transfer at teardown so the caller can reattach
    retain_transfer: AtomicBool,
}

impl StreamShared {
    fn set_state(&self, state: PlayerState) {
        let mut current = self.state.lock();
        if *current != PlayerState::Failed {
            *current = state;
        }
    }

    fn fail(&self, err: PlayerError) {
        if matches!(err, PlayerError::NeedsDisambiguation(_)) {
            self.retain_transfer.store(true, Ordering::Release);
        }
        let message = err.to_string();
        if self.writer.fail(err) {
            warn!("Stream {} failed: {}", self.info_hash, message);
            *self.state.lock() = PlayerState::Failed;
        }
    }

    async fn on_alert(&self, alert: EngineAlert) {
        match alert.kind {
            AlertKind::MetadataReceived => self.on_metadata().await,
            AlertKind::StateChanged {
                current: TransferState::Downloading,
                ..
            } => {
                if let Ok(info) = self.engine.torrent_info(self.info_hash).await {
                    self.check_disk_space(&info).await;
                }
            }
            AlertKind::TorrentFinished => self.reset_priorities().await,
            AlertKind::FileError { message } | AlertKind::TorrentError { message } => {
                warn!("Engine reported error for {}: {}", self.info_hash, message);
            }
            AlertKind::StateChanged { .. } | AlertKind::TorrentRemoved => {}
        }
    }

    /// Picks the file and installs its schedule. Runs once per stream.
    async fn on_metadata(&self) {
        if self.metadata_handled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.install_schedule().await {
            self.fail(e);
        }
    }

    async fn install_schedule(&self) -> Result<(), PlayerError> {
        let info = self.engine.torrent_info(self.info_hash).await?;
        info!(
            "Metadata for {}: {} files, {} pieces of {}",
            info.name,
            info.files.len(),
            info.piece_count,
            format_size(info.piece_length)
        );

        // Fail before any deadline is set.
        if !self.check_disk_space(&info).await {
            return Ok(());
        }

        let index = select_file(&info, self.config.min_candidate_file_size, self.file_index)?;
        let file = &info.files[index];
        let schedule = BufferSchedule::compute(&info, file, (&self.config).into())
            .ok_or(PlayerError::NoCandidateFile)?;

        self.engine
            .prioritize_pieces(self.info_hash, schedule.priorities())
            .await?;
        let window = schedule.window_pieces();
        for &piece in &window {
            self.engine
                .set_piece_deadline(self.info_hash, piece, Duration::ZERO)
                .await?;
        }
        debug!(
            "Schedule for {}: pieces {}..={}, head {}, tail {}",
            file.display_path(),
            schedule.start_piece,
            schedule.end_piece,
            schedule.head_pieces,
            schedule.tail_pieces
        );

        let path = file.display_path();
        *self.selection.lock() = Some(Selection {
            file_path: file.path.iter().collect(),
            schedule,
            progress: Arc::new(BufferProgress::new(window)),
        });
        self.set_state(PlayerState::Buffering);
        self.writer.write(StreamEvent::FileSelected { index, path });
        Ok(())
    }

    /// Returns false once free space is known to be short.
    async fn check_disk_space(&self, info: &TorrentInfo) -> bool {
        if self.out_of_space.load(Ordering::Acquire) {
            return false;
        }
        let Some(save_path) = &self.save_path else {
            return true;
        };
        let downloaded = match self.engine.status(self.info_hash).await {
            Ok(status) => status.all_time_download,
            Err(_) => return true,
        };
        let needed = info.total_size.saturating_sub(downloaded);

        match self.space.free_space(save_path) {
            Ok(available) if available < needed => {
                if !self.out_of_space.swap(true, Ordering::AcqRel) {
                    self.host.notify(&format!(
                        "Not enough space: {} needed, {} free",
                        format_size(needed),
                        format_size(available)
                    ));
                    self.fail(PlayerError::InsufficientDiskSpace { needed, available });
                }
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!("Could not probe free space in {}: {}", save_path.display(), e);
                true
            }
        }
    }

    /// Drops the head/tail bias once the transfer has finished.
    async fn reset_priorities(&self) {
        let schedule = match &*self.selection.lock() {
            Some(selection) => selection.schedule,
            None => return,
        };
        if self.completion_reset.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Transfer {} finished, resetting piece priorities", self.info_hash);
        if let Err(e) = self
            .engine
            .prioritize_pieces(self.info_hash, schedule.uniform_priorities())
            .await
        {
            warn!("Failed to reset priorities for {}: {}", self.info_hash, e);
        }
    }

    /// One slow-tick poll. Returns true once the buffer is full.
    async fn poll_buffer(&self) -> Result<bool, PlayerError> {
        let status = self.engine.status(self.info_hash).await?;
        if status.state.is_checking() {
            self.writer.write(StreamEvent::Checking(status.progress));
            return Ok(false);
        }

        let progress = match &*self.selection.lock() {
            Some(selection) => selection.progress.clone(),
            None => return Ok(false),
        };

        let mut possessed = Vec::new();
        for piece in progress.pending() {
            if self.engine.have_piece(self.info_hash, piece).await? {
                possessed.push(piece);
            }
        }
        let queue = self.engine.download_queue(self.info_hash).await?;
        progress.update(&possessed, &queue);

        let mean = progress.mean();
        self.writer.write(StreamEvent::Buffering(mean));
        if mean < 1.0 {
            return Ok(false);
        }

        if self.config.limit_after_buffering {
            self.engine
                .set_rate_limits(self.config.max_download_rate, self.config.max_upload_rate)
                .await?;
        }
        info!("Buffering complete for {}", self.info_hash);
        self.writer.write(StreamEvent::Buffered);
        Ok(true)
    }
}

async fn run_alert_loop(
    shared: Arc<StreamShared>,
    mut alerts: broadcast::Receiver<EngineAlert>,
    mut closing: Subscription<(), Infallible>,
) {
    // Metadata may already be present for .torrent sources and reattached transfers.
    if let Ok(status) = shared.engine.status(shared.info_hash).await {
        if status.has_metadata {
            shared.on_metadata().await;
        }
    }

    loop {
        tokio::select! {
            _ = closing.recv() => break,
            alert = alerts.recv() => match alert {
                Ok(alert) if alert.info_hash == shared.info_hash => shared.on_alert(alert).await,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Alert consumer for {} missed {} alerts", shared.info_hash, missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("Alert loop for {} stopped", shared.info_hash);
}

async fn run_buffer_loop(
    shared: Arc<StreamShared>,
    mut events: Subscription<StreamEvent, PlayerError>,
) {
    let mut fast = tokio::time::interval(shared.config.buffer_fast_tick);
    let mut slow = tokio::time::interval(shared.config.buffer_slow_tick);
    fast.set_missed_tick_behavior(MissedTickBehavior::Delay);
    slow.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => {
                if event.is_err() {
                    break;
                }
            }
            _ = fast.tick() => {
                if shared.host.progress_cancelled() {
                    shared.fail(PlayerError::UserCancelled);
                    break;
                }
                if shared.out_of_space.load(Ordering::Acquire) {
                    break;
                }
            }
            _ = slow.tick() => match shared.poll_buffer().await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    shared.fail(e);
                    break;
                }
            },
        }
    }
    debug!("Buffer loop for {} stopped", shared.info_hash);
}

async fn run_reporter(
    host: Arc<dyn PlaybackHost>,
    mut events: Subscription<StreamEvent, PlayerError>,
) {
    host.show_progress("Buffering");
    while let Ok(event) = events.recv().await {
        match event {
            StreamEvent::FileSelected { path, .. } => {
                host.update_progress(0, &format!("Streaming {path}"));
            }
            StreamEvent::Checking(progress) => {
                host.update_progress(percent(f64::from(progress)), "Checking existing data");
            }
            StreamEvent::Buffering(fraction) => {
                host.update_progress(percent(fraction), "Buffering");
            }
            StreamEvent::Buffered => break,
        }
    }
    host.hide_progress();
}

fn percent(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

struct ActiveStream {
    shared: Arc<StreamShared>,
    bus: EventBus<StreamEvent, PlayerError>,
    ready: Subscription<StreamEvent, PlayerError>,
    closing: EventWriter<(), Infallible>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Streaming buffer controller for a single transfer.
///
/// ```text
/// Idle -> Adding | Resuming -> AwaitingMetadata -> Buffering -> Playing <-> Paused -> Stopped
/// ```
/// Any state may move to `Failed`. Call [`Player::close`] on every path;
/// [`Player::run`] does so itself.
pub struct Player {
    engine: Arc<dyn TransferEngine>,
    config: StreamConfig,
    host: Arc<dyn PlaybackHost>,
    tracker: Option<Arc<dyn ProgressTracker>>,
    space: Arc<dyn SpaceProbe>,
    resume: Option<ResumeStore>,
    options: PlayerOptions,
    state: Arc<Mutex<PlayerState>>,
    stream: Option<ActiveStream>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state())
            .field("info_hash", &self.info_hash())
            .finish_non_exhaustive()
    }
}

impl Player {
    pub fn new(
        engine: Arc<dyn TransferEngine>,
        config: &UndertowConfig,
        host: Arc<dyn PlaybackHost>,
    ) -> Self {
        Self {
            engine,
            config: config.stream.clone(),
            host,
            tracker: None,
            space: Arc::new(SystemSpaceProbe),
            resume: config.stream.resume_dir.clone().map(ResumeStore::new),
            options: PlayerOptions::default(),
            state: Arc::new(Mutex::new(PlayerState::Idle)),
            stream: None,
        }
    }

    pub fn with_options(mut self, options: PlayerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_space_probe(mut self, space: Arc<dyn SpaceProbe>) -> Self {
        self.space = space;
        self
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    pub fn info_hash(&self) -> Option<InfoHash> {
        self.stream.as_ref().map(|stream| stream.shared.info_hash)
    }

    /// Mean buffer fraction once a file has been selected.
    pub fn buffer_fraction(&self) -> Option<f64> {
        let stream = self.stream.as_ref()?;
        let selection = stream.shared.selection.lock();
        selection.as_ref().map(|s| s.progress.mean())
    }

    pub fn schedule(&self) -> Option<BufferSchedule> {
        let stream = self.stream.as_ref()?;
        let selection = stream.shared.selection.lock();
        selection.as_ref().map(|s| s.schedule)
    }

    /// Index of this stream's transfer in the engine list, for reattaching.
    pub async fn resume_handle(&self) -> Result<Option<usize>, PlayerError> {
        let Some(info_hash) = self.info_hash() else {
            return Ok(None);
        };
        let torrents = self.engine.torrents().await?;
        Ok(torrents.iter().position(|t| t.info_hash == info_hash))
    }

    /// Opens a subscription to this stream's events.
    pub fn subscribe(&self) -> Option<Subscription<StreamEvent, PlayerError>> {
        self.stream.as_ref().map(|stream| stream.bus.subscribe())
    }

    /// Adds or reattaches the transfer and starts supervising it.
    ///
    /// # Errors
    /// - `PlayerError::NoDownloadPathConfigured` - No download directory for a new transfer
    /// - `PlayerError::TransferAddFailed` - Engine rejected the transfer
    /// - `PlayerError::UnknownResumeHandle` - Resume index not in the engine list
    pub async fn start(&mut self, source: StartSource) -> Result<InfoHash, PlayerError> {
        if let Some(info_hash) = self.info_hash() {
            return Ok(info_hash);
        }

        let result = self.attach(source).await;
        if result.is_err() {
            *self.state.lock() = PlayerState::Failed;
        }
        result
    }

    async fn attach(&mut self, source: StartSource) -> Result<InfoHash, PlayerError> {
        // Subscribe before adding so no alert for this transfer is missed.
        let alerts = self.engine.subscribe_alerts();

        let (info_hash, save_path) = match source {
            StartSource::Resume(index) => {
                *self.state.lock() = PlayerState::Resuming;
                let torrents = self.engine.torrents().await?;
                let status = torrents
                    .get(index)
                    .ok_or(PlayerError::UnknownResumeHandle { index })?;
                info!("Reattaching to {} ({})", status.name, status.info_hash);
                (status.info_hash, self.config.download_dir.clone())
            }
            StartSource::Resolved(resolved) => {
                *self.state.lock() = PlayerState::Adding;
                let save_path = self.add_transfer(&resolved).await?;
                (resolved.info_hash, Some(save_path))
            }
        };

        let (writer, bus) = event_bus();
        let (closing, closing_bus) = event_bus();
        let shared = Arc::new(StreamShared {
            engine: self.engine.clone(),
            config: self.config.clone(),
            host: self.host.clone(),
            space: self.space.clone(),
            info_hash,
            save_path,
            file_index: self.options.file_index,
            writer,
            state: self.state.clone(),
            selection: Mutex::new(None),
            metadata_handled: AtomicBool::new(false),
            out_of_space: AtomicBool::new(false),
            completion_reset: AtomicBool::new(false),
            retain_transfer: AtomicBool::new(false),
        });
        shared.set_state(PlayerState::AwaitingMetadata);

        let ready = bus.subscribe();
        let tasks = vec![
            tokio::spawn(run_reporter(self.host.clone(), bus.subscribe())),
            tokio::spawn(run_buffer_loop(shared.clone(), bus.subscribe())),
            tokio::spawn(run_alert_loop(shared.clone(), alerts, closing_bus.subscribe())),
        ];

        self.stream = Some(ActiveStream {
            shared,
            bus,
            ready,
            closing,
            tasks,
        });
        Ok(info_hash)
    }

    /// Adds a new transfer with sequential download enabled, returning its
    /// save path.
    async fn add_transfer(&self, resolved: &ResolvedTorrent) -> Result<PathBuf, PlayerError> {
        let save_path = self
            .config
            .download_dir
            .clone()
            .ok_or(PlayerError::NoDownloadPathConfigured)?;
        let info_hash = resolved.info_hash;

        match self.space.free_space(&save_path) {
            Ok(free) => debug!("{} free in {}", format_size(free), save_path.display()),
            Err(e) => warn!("Could not probe free space in {}: {}", save_path.display(), e),
        }

        let resume_data = match &self.resume {
            Some(store) => store.load(&info_hash).await.unwrap_or_else(|e| {
                warn!("Ignoring unreadable resume data for {}: {}", info_hash, e);
                None
            }),
            None => None,
        };
        if resume_data.is_some() {
            info!("Resuming {} from saved state", info_hash);
        }

        let source = match &resolved.info {
            Some(info) => TransferSource::Metadata(info.clone()),
            None => TransferSource::Magnet(MagnetParser::to_magnet_uri(
                &info_hash,
                Some(&resolved.name),
                &resolved.trackers,
            )),
        };
        self.engine
            .add_torrent(AddTorrentParams {
                source,
                save_path: save_path.clone(),
                resume_data,
            })
            .await
            .map_err(|e| PlayerError::TransferAddFailed {
                reason: e.to_string(),
            })?;
        self.engine.set_sequential_download(info_hash, true).await?;
        info!("Added {} ({}) to {}", resolved.name, info_hash, save_path.display());

        Ok(save_path)
    }

    /// Waits until the head and tail windows are fully downloaded.
    ///
    /// # Errors
    /// Any terminal failure broadcast by the stream loops, or
    /// `PlayerError::UserCancelled` if the stream was closed first.
    pub async fn wait_buffered(&mut self) -> Result<(), PlayerError> {
        let stream = self.stream.as_mut().ok_or(PlayerError::NotStarted)?;
        loop {
            match stream.ready.recv().await {
                Ok(StreamEvent::Buffered) => return Ok(()),
                Ok(_) => {}
                Err(RecvError::Failed(e)) => return Err(e),
                Err(RecvError::Closed) => return Err(PlayerError::UserCancelled),
            }
        }
    }

    /// Hands the selected file to the host and watches playback until it
    /// stops.
    ///
    /// # Errors
    /// - `PlayerError::PlaybackStartTimeout` - Host never reported playback
    /// - Any terminal failure broadcast while playing
    pub async fn play(&mut self) -> Result<(), PlayerError> {
        let stream = self.stream.as_mut().ok_or(PlayerError::NotStarted)?;
        let shared = stream.shared.clone();
        let target = {
            let selection = shared.selection.lock();
            let selection = selection.as_ref().ok_or(PlayerError::NoCandidateFile)?;
            match &shared.save_path {
                Some(dir) => dir.join(&selection.file_path),
                None => selection.file_path.clone(),
            }
        };

        self.host.play(&target.display().to_string());

        let timeout = self.config.playback_start_timeout;
        let deadline = Instant::now() + timeout;
        let mut ticker = tokio::time::interval(self.config.playback_poll_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                event = stream.ready.recv() => {
                    if let Err(e) = event {
                        return Err(terminal(e));
                    }
                    continue;
                }
            }
            if self.host.is_playing() {
                break;
            }
            if Instant::now() >= deadline {
                let err = PlayerError::PlaybackStartTimeout { timeout };
                shared.fail(err.clone());
                return Err(err);
            }
        }

        info!("Playback started for {}", shared.info_hash);
        shared.set_state(PlayerState::Playing);
        let watched = self.watch_playback(&shared).await;

        self.host.hide_overlay();
        if let Err(e) = self.engine.set_rate_limits(None, None).await {
            warn!("Failed to lift rate limits: {}", e);
        }
        shared.set_state(PlayerState::Stopped);
        info!("Playback stopped for {}", shared.info_hash);
        watched
    }

    /// Polls the host until playback stops, firing tracking events on
    /// pause and resume transitions only.
    async fn watch_playback(&mut self, shared: &StreamShared) -> Result<(), PlayerError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(PlayerError::NotStarted);
        };
        let tracking = self.tracker.clone().zip(self.options.tracked.clone());
        let track = |event| {
            if let Some((tracker, content)) = &tracking {
                tracker.track(event, content);
            }
        };

        track(TrackingEvent::Start);
        let mut paused = false;
        let mut ticker = tokio::time::interval(self.config.playback_poll_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                event = stream.ready.recv() => {
                    match event {
                        Err(e) => break Err(terminal(e)),
                        Ok(_) => continue,
                    }
                }
            }
            if !self.host.is_playing() {
                break Ok(());
            }

            let now_paused = self.host.is_paused();
            if now_paused == paused {
                continue;
            }
            paused = now_paused;
            if paused {
                shared.set_state(PlayerState::Paused);
                track(TrackingEvent::Pause);
                if let Ok(status) = self.engine.status(shared.info_hash).await {
                    self.host.show_overlay(&format!(
                        "{:.1}% - {}/s - {} seeds, {} peers",
                        status.progress * 100.0,
                        format_size(status.download_rate),
                        status.num_seeds,
                        status.num_peers
                    ));
                }
            } else {
                shared.set_state(PlayerState::Playing);
                track(TrackingEvent::Update);
                self.host.hide_overlay();
            }
        };

        track(TrackingEvent::Stop);
        result
    }

    /// Stops the loops and tears the transfer down.
    ///
    /// The transfer is kept when running in the background is configured,
    /// unless free space ran out, and when the caller must pick a file.
    /// Otherwise it is removed and its resume blob deleted.
    pub async fn close(&mut self) -> Result<(), PlayerError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let shared = stream.shared.clone();
        let info_hash = shared.info_hash;

        stream.closing.signal();
        stream.closing.close();
        shared.writer.close();
        for task in std::mem::take(&mut stream.tasks) {
            let _ = task.await;
        }
        drop(stream);
        shared.set_state(PlayerState::Stopped);

        let forced = shared.out_of_space.load(Ordering::Acquire);
        if shared.retain_transfer.load(Ordering::Acquire)
            || (self.config.keep_in_background && !forced)
        {
            info!("Leaving {} in the engine", info_hash);
            if let Some(store) = &self.resume {
                match self.engine.resume_data(info_hash).await {
                    Ok(data) => {
                        if let Err(e) = store.save(&info_hash, &data).await {
                            warn!("Failed to save resume data for {}: {}", info_hash, e);
                        }
                    }
                    Err(e) => debug!("No resume data for {}: {}", info_hash, e),
                }
            }
            return Ok(());
        }

        let removed = self
            .engine
            .remove_torrent(info_hash, !self.config.keep_files)
            .await;
        if let Some(store) = &self.resume {
            if let Err(e) = store.delete(&info_hash).await {
                warn!("Failed to delete resume data for {}: {}", info_hash, e);
            }
        }
        info!(
            "Removed {} ({})",
            info_hash,
            if self.config.keep_files { "files kept" } else { "files deleted" }
        );
        removed.map_err(PlayerError::from)
    }

    /// Starts, buffers, plays and closes, tearing down on every path.
    pub async fn run(&mut self, source: StartSource) -> Result<(), PlayerError> {
        let result = self.stream_to_end(source).await;
        let teardown = self.close().await;
        result?;
        teardown
    }

    async fn stream_to_end(&mut self, source: StartSource) -> Result<(), PlayerError> {
        self.start(source).await?;
        self.wait_buffered().await?;
        self.play().await
    }
}

fn terminal(err: RecvError<PlayerError>) -> PlayerError {
    match err {
        RecvError::Failed(e) => e,
        RecvError::Closed => PlayerError::UserCancelled,
    }
}
