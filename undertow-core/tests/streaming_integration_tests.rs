//! Integration tests for the streaming buffer controller.
//!
//! These drive the public Player and StreamService APIs against the
//! simulated engine, covering buffering, playback supervision, disk-space
//! enforcement, file disambiguation and background resume.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, timeout};
use undertow_core::config::UndertowConfig;
use undertow_core::engine::{
    EngineSession, PiecePriority, SimulatedEngine, TransferEngine, spawn_simulated_engine,
};
use undertow_core::player::{
    FixedSpace, HeadlessHost, PlaybackHost, Player, PlayerError, PlayerOptions, PlayerState,
    ProgressTracker,
    ResumeStore, StartSource, StreamEvent, TrackedContent, TrackingEvent,
};
use undertow_core::service::StreamService;
use undertow_core::torrent::{
    InfoHash, MagnetParser, ResolvedTorrent, TorrentInfo, TorrentLocator,
};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct RecordingTracker {
    events: Mutex<Vec<TrackingEvent>>,
}

impl ProgressTracker for RecordingTracker {
    fn track(&self, event: TrackingEvent, content: &TrackedContent) {
        assert_eq!(content.content_type, "movie");
        self.events.lock().unwrap().push(event);
    }
}

/// Simulated engine plus the config and host a test streams with.
struct StreamFixture {
    config: UndertowConfig,
    engine: SimulatedEngine,
    host: Arc<HeadlessHost>,
}

impl StreamFixture {
    fn new() -> Self {
        Self::with_host(HeadlessHost::autoplay())
    }

    fn with_host(host: HeadlessHost) -> Self {
        let config = UndertowConfig::for_testing();
        let engine = spawn_simulated_engine(config.simulation.clone());
        Self {
            config,
            engine,
            host: Arc::new(host),
        }
    }

    fn player(&self, free_space: u64) -> Player {
        Player::new(Arc::new(self.engine.clone()), &self.config, self.host.clone())
            .with_space_probe(Arc::new(FixedSpace(free_space)))
    }

    fn resolved(info: &TorrentInfo) -> StartSource {
        StartSource::Resolved(Box::new(ResolvedTorrent {
            locator: TorrentLocator::from_bytes(Vec::new()),
            info_hash: info.info_hash,
            name: info.name.clone(),
            trackers: Vec::new(),
            is_private: false,
            info: Some(info.clone()),
        }))
    }

    async fn service(&self) -> StreamService {
        let session = EngineSession::open(Arc::new(self.engine.clone()), &self.config)
            .await
            .unwrap();
        StreamService::new(session, self.config.clone(), self.host.clone())
            .with_space_probe(Arc::new(FixedSpace(u64::MAX)))
    }

    /// Plays for a while once the host reports playback, then stops.
    fn stop_playback_after(&self, delay: Duration) -> tokio::task::JoinHandle<()> {
        let host = self.host.clone();
        tokio::spawn(async move {
            while !host.is_playing() {
                sleep(Duration::from_millis(5)).await;
            }
            sleep(delay).await;
            host.set_playing(false);
        })
    }
}

#[tokio::test]
async fn test_insufficient_disk_space_before_any_deadline() {
    let mut fixture = StreamFixture::new();
    fixture.config.stream.keep_in_background = true;
    let info = TorrentInfo::single_file(InfoHash::new([0x11; 20]), "huge.mkv", MIB, 5 * GIB);
    let mut player = fixture.player(GIB);

    player.start(StreamFixture::resolved(&info)).await.unwrap();
    let result = timeout(TEST_TIMEOUT, player.wait_buffered()).await.unwrap();

    match result {
        Err(PlayerError::InsufficientDiskSpace { needed, available }) => {
            assert_eq!(available, GIB);
            assert!(needed > 4 * GIB);
        }
        other => panic!("expected disk space failure, got {other:?}"),
    }
    assert_eq!(player.state(), PlayerState::Failed);
    assert_eq!(fixture.host.notifications().len(), 1);

    let snapshot = fixture.engine.inspect().await.unwrap();
    let deadlines = snapshot
        .deadlines
        .iter()
        .find(|(hash, _)| *hash == info.info_hash)
        .map(|(_, pieces)| pieces.clone())
        .unwrap();
    assert!(deadlines.is_empty());
    let priorities = fixture.engine.piece_priorities(info.info_hash).await.unwrap();
    assert!(!priorities.contains(&PiecePriority::Immediate));

    // Disk shortfall forces teardown even when configured to keep running.
    player.close().await.unwrap();
    let snapshot = fixture.engine.inspect().await.unwrap();
    assert_eq!(snapshot.removals, vec![(info.info_hash, true)]);
}

#[tokio::test]
async fn test_buffer_progress_is_monotonic_and_completes_once() {
    let fixture = StreamFixture::new();
    let info = TorrentInfo::single_file(InfoHash::new([0x22; 20]), "film.mkv", MIB, 96 * MIB);
    let mut player = fixture.player(u64::MAX);

    player.start(StreamFixture::resolved(&info)).await.unwrap();
    let mut events = player.subscribe().unwrap();
    timeout(TEST_TIMEOUT, player.wait_buffered())
        .await
        .unwrap()
        .unwrap();

    let mut fractions = Vec::new();
    let mut buffered = 0;
    while let Ok(Some(event)) = events.try_recv() {
        match event {
            StreamEvent::Buffering(fraction) => fractions.push(fraction),
            StreamEvent::Buffered => buffered += 1,
            _ => {}
        }
    }
    assert_eq!(buffered, 1);
    assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(fractions.last().copied(), Some(1.0));

    player.close().await.unwrap();
}

#[tokio::test]
async fn test_finished_transfer_resets_priorities_to_uniform() {
    let fixture = StreamFixture::new();
    let info = TorrentInfo::multi_file(
        InfoHash::new([0x33; 20]),
        "pack",
        MIB,
        &[("pack/movie.mkv", 24 * MIB), ("pack/notes.txt", MIB)],
    );
    let mut player = fixture.player(u64::MAX);
    player.start(StreamFixture::resolved(&info)).await.unwrap();
    timeout(TEST_TIMEOUT, player.wait_buffered())
        .await
        .unwrap()
        .unwrap();

    let uniform = player.schedule().unwrap().uniform_priorities();
    timeout(TEST_TIMEOUT, async {
        loop {
            let priorities = fixture.engine.piece_priorities(info.info_hash).await.unwrap();
            if priorities == uniform {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(uniform[24], PiecePriority::Skip);

    player.close().await.unwrap();
}

#[tokio::test]
async fn test_magnet_stream_through_service_with_tracking_and_limits() {
    let mut fixture = StreamFixture::new();
    fixture.config.stream.max_download_rate = Some(8 * MIB);
    fixture.config.stream.limit_after_buffering = true;

    let info = TorrentInfo::multi_file(
        InfoHash::new([0x44; 20]),
        "Show",
        MIB,
        &[("Show/sample.mkv", 2 * MIB), ("Show/show.mkv", 48 * MIB)],
    );
    fixture.engine.register_metadata(info.clone()).await.unwrap();
    let locator = TorrentLocator::parse(&MagnetParser::to_magnet_uri(
        &info.info_hash,
        Some("Show"),
        &[],
    ));

    let tracker = Arc::new(RecordingTracker::default());
    let service = fixture.service().await.with_tracker(tracker.clone());
    let options = PlayerOptions {
        file_index: None,
        tracked: Some(TrackedContent {
            content_type: "movie".to_string(),
            external_id: 603,
            runtime_secs: 8160,
        }),
    };

    let host = fixture.host.clone();
    let engine = fixture.engine.clone();
    let driver = tokio::spawn(async move {
        while !host.is_playing() {
            sleep(Duration::from_millis(5)).await;
        }
        let limit = engine.inspect().await.unwrap().download_rate_limit;
        sleep(Duration::from_millis(100)).await;
        host.set_paused(true);
        sleep(Duration::from_millis(100)).await;
        let overlay = host.overlay();
        host.set_paused(false);
        sleep(Duration::from_millis(100)).await;
        host.set_playing(false);
        (limit, overlay)
    });

    timeout(TEST_TIMEOUT, service.stream(&locator, options))
        .await
        .unwrap()
        .unwrap();
    let (limit_while_playing, overlay_while_paused) = driver.await.unwrap();

    assert_eq!(limit_while_playing, Some(8 * MIB));
    assert!(overlay_while_paused.is_some());
    assert_eq!(
        *tracker.events.lock().unwrap(),
        vec![
            TrackingEvent::Start,
            TrackingEvent::Pause,
            TrackingEvent::Update,
            TrackingEvent::Stop
        ]
    );

    let played = fixture.host.played();
    assert_eq!(played.len(), 1);
    assert!(played[0].ends_with("show.mkv"));

    let snapshot = fixture.engine.inspect().await.unwrap();
    assert_eq!(snapshot.download_rate_limit, None);
    assert_eq!(snapshot.removals, vec![(info.info_hash, true)]);
    assert!(service.registry().in_progress().is_empty());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ambiguous_files_resolved_by_host_choice() {
    let fixture = StreamFixture::with_host(HeadlessHost::autoplay().with_choice(1));
    let info = TorrentInfo::multi_file(
        InfoHash::new([0x55; 20]),
        "Season",
        4 * MIB,
        &[("Season/e01.mkv", 150 * MIB), ("Season/e02.mkv", 160 * MIB)],
    );
    fixture.engine.register_metadata(info.clone()).await.unwrap();
    let locator =
        TorrentLocator::parse(&MagnetParser::to_magnet_uri(&info.info_hash, None, &[]));

    let service = fixture.service().await;
    let driver = fixture.stop_playback_after(Duration::from_millis(50));
    timeout(TEST_TIMEOUT, service.stream(&locator, PlayerOptions::default()))
        .await
        .unwrap()
        .unwrap();
    driver.await.unwrap();

    let played = fixture.host.played();
    assert_eq!(played.len(), 1);
    assert!(played[0].ends_with("e02.mkv"));

    // Only the final teardown removes the transfer.
    let snapshot = fixture.engine.inspect().await.unwrap();
    assert_eq!(snapshot.removals, vec![(info.info_hash, true)]);
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_background_transfer_keeps_resume_data_and_reattaches() {
    let resume_dir = tempfile::tempdir().unwrap();
    let mut fixture = StreamFixture::new();
    fixture.config.stream.keep_in_background = true;
    fixture.config.stream.resume_dir = Some(resume_dir.path().to_path_buf());
    let info = TorrentInfo::single_file(InfoHash::new([0x66; 20]), "clip.mkv", MIB, 20 * MIB);

    let driver = fixture.stop_playback_after(Duration::from_millis(20));
    let mut player = fixture.player(u64::MAX);
    timeout(TEST_TIMEOUT, player.run(StreamFixture::resolved(&info)))
        .await
        .unwrap()
        .unwrap();
    driver.await.unwrap();

    let store = ResumeStore::new(resume_dir.path());
    assert!(store.load(&info.info_hash).await.unwrap().is_some());
    let torrents = fixture.engine.torrents().await.unwrap();
    assert_eq!(torrents.len(), 1);
    assert!(fixture.engine.inspect().await.unwrap().removals.is_empty());

    fixture.config.stream.keep_in_background = false;
    let mut reattached = fixture.player(u64::MAX);
    assert_eq!(
        reattached.start(StartSource::Resume(0)).await.unwrap(),
        info.info_hash
    );
    timeout(TEST_TIMEOUT, reattached.wait_buffered())
        .await
        .unwrap()
        .unwrap();
    reattached.close().await.unwrap();

    assert!(store.load(&info.info_hash).await.unwrap().is_none());
    assert_eq!(
        fixture.engine.inspect().await.unwrap().removals,
        vec![(info.info_hash, true)]
    );
}

#[tokio::test]
async fn test_unknown_resume_handle_rejected() {
    let fixture = StreamFixture::new();
    let mut player = fixture.player(u64::MAX);
    assert!(matches!(
        player.start(StartSource::Resume(3)).await,
        Err(PlayerError::UnknownResumeHandle { index: 3 })
    ));
}
