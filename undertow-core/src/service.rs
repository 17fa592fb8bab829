//! Stream service and in-progress registry
//!
//! The service owns the engine session for its whole lifetime. The registry
//! maps an info hash to the completion channel of the stream currently
//! serving it, so a second request for the same content waits on the first
//! instead of adding the transfer again.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::bus::{EventBus, EventWriter, RecvError, Subscription, event_bus};
use crate::config::UndertowConfig;
use crate::engine::{EngineSession, TransferEngine};
use crate::player::{
    PlaybackHost, Player, PlayerError, PlayerOptions, ProgressTracker, SpaceProbe, StartSource,
    SystemSpaceProbe,
};
use crate::torrent::{InfoHash, ResolvedTorrent, TorrentLocator, TorrentResolver, format_size};
use crate::{Result, UndertowError};

type Entries = Arc<Mutex<HashMap<InfoHash, EventBus<(), PlayerError>>>>;

/// Outcome of registering interest in a stream.
#[derive(Debug)]
pub enum Registration {
    /// Caller serves the stream and must report its outcome
    Owner(RegistrationGuard),
    /// Another caller is serving it; wait on this subscription
    Joined(Subscription<(), PlayerError>),
}

/// In-progress streams keyed by info hash.
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    entries: Entries,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, info_hash: InfoHash) -> Registration {
        let mut entries = self.entries.lock();
        if let Some(bus) = entries.get(&info_hash) {
            return Registration::Joined(bus.subscribe());
        }

        let (writer, bus) = event_bus();
        entries.insert(info_hash, bus);
        Registration::Owner(RegistrationGuard {
            entries: self.entries.clone(),
            info_hash,
            writer,
            finished: false,
        })
    }

    pub fn contains(&self, info_hash: &InfoHash) -> bool {
        self.entries.lock().contains_key(info_hash)
    }

    pub fn in_progress(&self) -> Vec<InfoHash> {
        self.entries.lock().keys().copied().collect()
    }
}

/// Owner side of a registry entry. The entry is removed on drop; an owner
/// dropped without [`RegistrationGuard::finish`] reports cancellation.
#[derive(Debug)]
pub struct RegistrationGuard {
    entries: Entries,
    info_hash: InfoHash,
    writer: EventWriter<(), PlayerError>,
    finished: bool,
}

impl RegistrationGuard {
    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Completes the entry, waking every joined caller with `result`.
    pub fn finish(mut self, result: &std::result::Result<(), PlayerError>) {
        match result {
            Ok(()) => self.writer.close(),
            Err(e) => self.writer.fail(e.clone()),
        };
        self.finished = true;
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.entries.lock().remove(&self.info_hash);
        if !self.finished {
            self.writer.fail(PlayerError::UserCancelled);
        }
    }
}

/// Waits for the stream a joined caller is attached to.
pub async fn wait_for_stream(
    mut joined: Subscription<(), PlayerError>,
) -> std::result::Result<(), PlayerError> {
    loop {
        match joined.recv().await {
            Ok(()) => {}
            Err(RecvError::Closed) => return Ok(()),
            Err(RecvError::Failed(e)) => return Err(e),
        }
    }
}

/// Top-level streaming service.
pub struct StreamService {
    config: UndertowConfig,
    session: EngineSession,
    resolver: TorrentResolver,
    registry: StreamRegistry,
    host: Arc<dyn PlaybackHost>,
    tracker: Option<Arc<dyn ProgressTracker>>,
    space: Arc<dyn SpaceProbe>,
}

impl std::fmt::Debug for StreamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamService")
            .field("session", &self.session)
            .field("in_progress", &self.registry.in_progress())
            .finish_non_exhaustive()
    }
}

impl StreamService {
    pub fn new(session: EngineSession, config: UndertowConfig, host: Arc<dyn PlaybackHost>) -> Self {
        let resolver = TorrentResolver::new(
            config.storage.torrent_cache_dir.clone(),
            config.network.fetch_timeout,
        );
        Self {
            config,
            session,
            resolver,
            registry: StreamRegistry::new(),
            host,
            tracker: None,
            space: Arc::new(SystemSpaceProbe),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_space_probe(mut self, space: Arc<dyn SpaceProbe>) -> Self {
        self.space = space;
        self
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn engine(&self) -> Arc<dyn TransferEngine> {
        self.session.engine()
    }

    pub async fn resolve(&self, locator: &TorrentLocator) -> Result<ResolvedTorrent> {
        Ok(self.resolver.resolve(locator).await?)
    }

    /// Resolves `locator` and streams it to the end, or joins the stream
    /// already serving the same content.
    pub async fn stream(&self, locator: &TorrentLocator, options: PlayerOptions) -> Result<()> {
        let resolved = self.resolve(locator).await?;
        match self.registry.register(resolved.info_hash) {
            Registration::Joined(joined) => {
                info!("Joining stream already in progress for {}", resolved.info_hash);
                Ok(wait_for_stream(joined).await?)
            }
            Registration::Owner(guard) => {
                let result = self.play(resolved, options).await;
                guard.finish(&result);
                Ok(result?)
            }
        }
    }

    async fn play(
        &self,
        resolved: ResolvedTorrent,
        options: PlayerOptions,
    ) -> std::result::Result<(), PlayerError> {
        let info_hash = resolved.info_hash;
        let result = self
            .player(options.clone())
            .run(StartSource::Resolved(Box::new(resolved)))
            .await;

        let Err(PlayerError::NeedsDisambiguation(candidates)) = result else {
            return result;
        };

        let engine = self.engine();
        let torrents = engine.torrents().await?;
        let handle = torrents
            .iter()
            .position(|t| t.info_hash == info_hash)
            .ok_or(PlayerError::NoCandidateFile)?;

        let names: Vec<String> = candidates
            .iter()
            .map(|c| format!("{} ({})", c.path, format_size(c.length)))
            .collect();
        let Some(choice) = self.host.select("Choose a file to stream", &names) else {
            if let Err(e) = engine
                .remove_torrent(info_hash, !self.config.stream.keep_files)
                .await
            {
                warn!("Failed to remove {} after dismissed choice: {}", info_hash, e);
            }
            return Err(PlayerError::UserCancelled);
        };

        let options = PlayerOptions {
            file_index: candidates.get(choice).map(|c| c.index),
            ..options
        };
        self.player(options).run(StartSource::Resume(handle)).await
    }

    fn player(&self, options: PlayerOptions) -> Player {
        let player = Player::new(self.session.engine(), &self.config, self.host.clone())
            .with_options(options)
            .with_space_probe(self.space.clone());
        match &self.tracker {
            Some(tracker) => player.with_tracker(tracker.clone()),
            None => player,
        }
    }

    /// Shuts the engine session down.
    pub async fn shutdown(&self) -> Result<()> {
        self.session.shutdown().await.map_err(UndertowError::from)
    }
}
