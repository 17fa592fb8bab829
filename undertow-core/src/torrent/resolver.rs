//! Locator resolution into canonical torrent identity.
//!
//! Magnets resolve synchronously from their query string. `.torrent`
//! sources are bencode-decoded; HTTP sources are fetched once and cached as
//! `<infohash>.torrent` so later engine calls never hit the network again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use super::candidate::{CandidateTorrent, LocatorSource, TorrentLocator};
use super::parsing::types::push_unique;
use super::parsing::{BencodeParser, MagnetParser, TorrentInfo};
use super::quality::QualityTags;
use super::{InfoHash, TorrentError};

/// Canonical identity of a torrent after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTorrent {
    /// Locator rewritten to a magnet or a local file
    pub locator: TorrentLocator,
    pub info_hash: InfoHash,
    pub name: String,
    pub trackers: Vec<String>,
    pub is_private: bool,
    /// Full metadata when resolved from a `.torrent` source
    pub info: Option<TorrentInfo>,
}

/// Resolves locators, caching fetched `.torrent` files in a session directory.
#[derive(Debug, Clone)]
pub struct TorrentResolver {
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl TorrentResolver {
    /// Creates resolver writing fetched torrents under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>, fetch_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_default();
        Self {
            cache_dir: cache_dir.into(),
            client,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolves a locator into canonical identity.
    ///
    /// # Errors
    /// - `TorrentError::InvalidLocator` - Malformed magnet URI
    /// - `TorrentError::ResolutionFailed` - Fetch or read of the `.torrent` source failed
    /// - `TorrentError::InvalidTorrentFile` - Source is not valid torrent metadata
    pub async fn resolve(&self, locator: &TorrentLocator) -> Result<ResolvedTorrent, TorrentError> {
        match &locator.source {
            LocatorSource::Magnet(uri) => Self::resolve_magnet(locator, uri),
            LocatorSource::Bytes(bytes) => Self::resolve_torrent_bytes(locator.clone(), bytes),
            LocatorSource::Path(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    TorrentError::ResolutionFailed {
                        locator: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Self::resolve_torrent_bytes(locator.clone(), &bytes)
            }
            LocatorSource::Url(url) => {
                let bytes = self.fetch(url).await?;
                let mut resolved = Self::resolve_torrent_bytes(locator.clone(), &bytes)?;
                let cached = self.persist(&resolved.info_hash, &bytes).await?;
                info!("Cached {} as {}", url, cached.display());
                resolved.locator.source = LocatorSource::Path(cached);
                Ok(resolved)
            }
        }
    }

    /// Resolves a search candidate in place.
    ///
    /// Candidates that already carry hash, name and live counts (and either
    /// are public or have trackers) are left alone. Quality tags still at
    /// their unknown sentinel are re-inferred from the final name.
    ///
    /// # Errors
    /// Same as [`Self::resolve`].
    pub async fn resolve_candidate(
        &self,
        candidate: &mut CandidateTorrent,
    ) -> Result<(), TorrentError> {
        if Self::needs_resolution(candidate) {
            let resolved = self.resolve(&candidate.locator).await?;
            candidate.locator = resolved.locator;
            candidate.locator.info_hash = Some(resolved.info_hash);
            candidate.locator.name = Some(resolved.name.clone());
            candidate.locator.trackers = resolved.trackers;
            candidate.locator.is_private = resolved.is_private;
            if candidate.name.is_empty() {
                candidate.name = resolved.name;
            }
        } else {
            debug!("Skipping resolution of {}", candidate.name);
        }

        if candidate.quality.has_unknown() {
            candidate
                .quality
                .fill_unknown(QualityTags::from_name(&candidate.name));
        }
        Ok(())
    }

    /// Whether resolving would learn anything new about `candidate`.
    pub fn needs_resolution(candidate: &CandidateTorrent) -> bool {
        let locator = &candidate.locator;
        let identified = locator.info_hash.is_some()
            && !candidate.name.is_empty()
            && candidate.seeds > 0
            && candidate.peers > 0;
        let reachable = !locator.is_private || !locator.trackers.is_empty();
        !(identified && reachable)
    }

    fn resolve_magnet(locator: &TorrentLocator, uri: &str) -> Result<ResolvedTorrent, TorrentError> {
        let link = MagnetParser::parse_magnet_link(uri)?;
        let info_hash = locator.info_hash.unwrap_or(link.info_hash);

        let mut trackers = locator.trackers.clone();
        for tracker in link.trackers {
            push_unique(&mut trackers, tracker);
        }

        let name = locator
            .name
            .clone()
            .or(link.display_name)
            .unwrap_or_else(|| info_hash.to_string());

        Ok(ResolvedTorrent {
            locator: locator.clone(),
            info_hash,
            name,
            trackers,
            is_private: locator.is_private,
            info: None,
        })
    }

    fn resolve_torrent_bytes(
        locator: TorrentLocator,
        bytes: &[u8],
    ) -> Result<ResolvedTorrent, TorrentError> {
        let info = BencodeParser::parse_torrent(bytes)?;

        let info_hash = locator.info_hash.unwrap_or(info.info_hash);
        let name = locator.name.clone().unwrap_or_else(|| info.name.clone());
        let trackers = if locator.trackers.is_empty() {
            info.trackers.clone()
        } else {
            locator.trackers.clone()
        };
        let is_private = locator.is_private || info.is_private;

        debug!(
            "Resolved torrent {} ({}) with {} trackers",
            name,
            info_hash,
            trackers.len()
        );

        Ok(ResolvedTorrent {
            locator,
            info_hash,
            name,
            trackers,
            is_private,
            info: Some(info),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TorrentError> {
        let failed = |reason: String| TorrentError::ResolutionFailed {
            locator: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn persist(&self, info_hash: &InfoHash, bytes: &[u8]) -> Result<PathBuf, TorrentError> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let path = self.cache_dir.join(format!("{info_hash}.torrent"));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}
