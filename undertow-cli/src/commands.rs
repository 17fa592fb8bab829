//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Subcommand;
use tracing::{info, warn};
use undertow_core::engine::EngineSession;
use undertow_core::player::{HeadlessHost, PlaybackHost, PlayerOptions};
use undertow_core::torrent::{
    InfoHash, TorrentLocator, TorrentResolver, TrackerScraper, UdpTrackerScraper, format_size,
};
use undertow_core::{StreamService, UndertowConfig, UndertowError};
use undertow_search::{IndexerProvider, SearchAggregator, SearchQuery, quality_score};
use url::Url;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a magnet link, .torrent URL or file to its identity
    Resolve {
        /// Magnet link, http(s) URL or path to a .torrent file
        locator: String,
    },
    /// Search indexers and rank the results
    Search {
        /// Title or free text
        query: String,
        /// Treat the query as a movie title
        #[arg(long, conflicts_with = "episode")]
        movie: bool,
        /// Release year for movie searches
        #[arg(long, requires = "movie")]
        year: Option<u16>,
        /// Treat the query as a show and look for one episode
        #[arg(long, num_args = 2, value_names = ["SEASON", "EPISODE"])]
        episode: Option<Vec<u32>>,
        /// Base URL of a JSON indexer (repeatable)
        #[arg(long = "indexer", required = true)]
        indexers: Vec<String>,
    },
    /// Scrape seed and peer counts from a UDP tracker
    Scrape {
        /// Tracker URL, e.g. udp://tracker.example:80/announce
        tracker: String,
        /// Info hashes, 40-char hex or 32-char base32
        #[arg(required = true)]
        hashes: Vec<String>,
    },
    /// Stream a torrent through the buffer controller
    Stream {
        /// Magnet link, http(s) URL or path to a .torrent file
        locator: String,
        /// Run against the simulated transfer engine
        #[arg(long)]
        simulate: bool,
        /// File to play when several qualify
        #[arg(long)]
        file_index: Option<usize>,
        /// Seconds of playback before stopping
        #[arg(long, default_value = "10")]
        play_for: u64,
        /// Download directory override
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of the command that failed
pub async fn handle_command(command: Commands, config: UndertowConfig) -> anyhow::Result<()> {
    match command {
        Commands::Resolve { locator } => resolve(&config, &locator).await,
        Commands::Search {
            query,
            movie,
            year,
            episode,
            indexers,
        } => {
            let query = match (movie, episode.as_deref()) {
                (true, _) => SearchQuery::Movie {
                    title: query,
                    year,
                    imdb_id: None,
                },
                (false, Some(&[season, episode])) => SearchQuery::episode(query, season, episode),
                _ => SearchQuery::text(query),
            };
            search(&config, &query, &indexers).await
        }
        Commands::Scrape { tracker, hashes } => scrape(&config, &tracker, &hashes).await,
        Commands::Stream {
            locator,
            simulate,
            file_index,
            play_for,
            output,
        } => {
            if !simulate {
                bail!("No transfer engine is linked into this build; pass --simulate");
            }
            stream(config, &locator, file_index, Duration::from_secs(play_for), output).await
        }
    }
}

fn resolver(config: &UndertowConfig) -> TorrentResolver {
    TorrentResolver::new(
        config.storage.torrent_cache_dir.clone(),
        config.network.fetch_timeout,
    )
}

/// Prints the canonical identity of `locator`.
///
/// # Errors
/// - `TorrentError::InvalidLocator` - Malformed magnet or unreadable source
/// - `TorrentError::ResolutionFailed` - `.torrent` could not be fetched
async fn resolve(config: &UndertowConfig, locator: &str) -> anyhow::Result<()> {
    let resolved = resolver(config)
        .resolve(&TorrentLocator::parse(locator))
        .await
        .map_err(UndertowError::from)?;

    println!("Info hash: {}", resolved.info_hash);
    println!("Name:      {}", resolved.name);
    println!("Private:   {}", resolved.is_private);
    for tracker in &resolved.trackers {
        println!("Tracker:   {tracker}");
    }

    if let Some(info) = &resolved.info {
        println!(
            "Size:      {} in {} pieces of {}",
            format_size(info.total_size),
            info.piece_count,
            format_size(info.piece_length)
        );
        for (index, file) in info.files.iter().enumerate() {
            println!("  [{index}] {} ({})", file.display_path(), format_size(file.length));
        }
    }
    Ok(())
}

/// Runs `query` against every indexer and prints the ranked candidates.
///
/// # Errors
/// - Invalid indexer URL
async fn search(config: &UndertowConfig, query: &SearchQuery, indexers: &[String]) -> anyhow::Result<()> {
    let mut aggregator = SearchAggregator::new(&config.search).with_resolver(resolver(config));
    for base_url in indexers {
        let name = Url::parse(base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| base_url.clone());
        let provider = IndexerProvider::new(name, base_url)
            .with_context(|| format!("Cannot use indexer {base_url}"))?;
        aggregator = aggregator.with_provider(Arc::new(provider));
    }

    let candidates = aggregator.search(query).await;
    if candidates.is_empty() {
        println!("No results for '{query}'.");
        return Ok(());
    }

    println!(
        "{:>3}  {:<60} {:>9} {:>6} {:>6} {:>8}  {}",
        "#", "Name", "Size", "Seeds", "Peers", "Score", "Provider"
    );
    for (position, candidate) in candidates.iter().enumerate() {
        let marker = if candidate.multi { "*" } else { "" };
        println!(
            "{:>3}  {:<60} {:>9} {:>6} {:>6} {:>8}  {}{}",
            position + 1,
            truncate(&candidate.name, 60),
            candidate.size,
            candidate.seeds,
            candidate.peers,
            quality_score(candidate),
            candidate.provider,
            marker
        );
    }
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('~');
    cut
}

/// Scrapes `hashes` from one tracker.
///
/// # Errors
/// - Malformed info hash
/// - Tracker connect failure; a failed batch is printed in place of its rows
async fn scrape(config: &UndertowConfig, tracker: &str, hashes: &[String]) -> anyhow::Result<()> {
    let hashes = hashes
        .iter()
        .map(|hash| {
            hash.parse::<InfoHash>()
                .with_context(|| format!("Invalid info hash {hash}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let scraper = UdpTrackerScraper::new(config.search.tracker_timeout);
    let batches = scraper
        .scrape(tracker, &hashes)
        .await
        .with_context(|| format!("Scrape of {tracker} failed"))?;

    println!("{:<40} {:>8} {:>8} {:>10}", "Info hash", "Seeders", "Leechers", "Completed");
    for batch in &batches {
        let batch_hashes = hashes.get(batch.hashes.clone()).unwrap_or_default();
        match &batch.result {
            Ok(stats) => {
                for (hash, stat) in batch_hashes.iter().zip(stats) {
                    println!(
                        "{:<40} {:>8} {:>8} {:>10}",
                        hash.to_string(),
                        stat.seeders,
                        stat.leechers,
                        stat.completed
                    );
                }
            }
            Err(e) => {
                for hash in batch_hashes {
                    println!("{:<40} {}", hash.to_string(), e);
                }
            }
        }
    }
    Ok(())
}

/// Streams `locator` against the simulated engine.
///
/// Playback stops after `play_for`, or on Ctrl-C, which also cancels
/// buffering.
///
/// # Errors
/// - Any `UndertowError` from resolution, the engine or the controller
async fn stream(
    mut config: UndertowConfig,
    locator: &str,
    file_index: Option<usize>,
    play_for: Duration,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(output) = output {
        config.stream.download_dir = Some(output);
    }
    if config.stream.download_dir.is_none() {
        let fallback = std::env::temp_dir().join("undertow-downloads");
        warn!("No download directory configured, using {}", fallback.display());
        config.stream.download_dir = Some(fallback);
    }

    let session = EngineSession::simulated(&config)
        .await
        .map_err(UndertowError::from)?;
    let host = Arc::new(match file_index {
        Some(index) => HeadlessHost::autoplay().with_choice(index),
        None => HeadlessHost::autoplay(),
    });
    let service = StreamService::new(session, config, host.clone());

    let watcher = tokio::spawn(watch_playback(host, play_for));
    let options = PlayerOptions {
        file_index,
        tracked: None,
    };
    let result = service.stream(&TorrentLocator::parse(locator), options).await;
    watcher.abort();
    service.shutdown().await?;

    result.map_err(|e| {
        let message = e.user_message();
        anyhow::Error::new(e).context(message)
    })?;
    info!("Stream finished");
    Ok(())
}

async fn watch_playback(host: Arc<HeadlessHost>, play_for: Duration) {
    let played = async {
        while !host.is_playing() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        info!("Playback started, stopping in {:?}", play_for);
        tokio::time::sleep(play_for).await;
    };

    tokio::select! {
        () = played => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            host.cancel();
        }
    }
    host.set_playing(false);
}
