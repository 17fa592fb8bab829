//! JSON HTTP indexer provider.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use undertow_core::torrent::{CandidateTorrent, InfoHash, MagnetParser, TorrentLocator};
use url::Url;

use super::SearchProvider;
use crate::errors::MediaSearchError;
use crate::query::{QueryKind, SearchQuery};

const RESULT_LIMIT: &str = "50";

/// Provider for indexers exposing a JSON search endpoint.
///
/// Queries `GET {base}/api/v1/search` with the flattened query text and a
/// category, plus structured parameters for movie and episode queries.
#[derive(Debug)]
pub struct IndexerProvider {
    name: String,
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    kinds: Vec<QueryKind>,
}

/// Response from the search endpoint.
#[derive(Debug, Deserialize)]
struct IndexerResponse {
    results: Vec<IndexerTorrent>,
}

/// Single result row.
#[derive(Debug, Deserialize)]
struct IndexerTorrent {
    name: String,
    #[serde(default)]
    magnet: Option<String>,
    /// Direct `.torrent` link, used when no magnet is given
    #[serde(default)]
    link: Option<String>,
    #[serde(default, rename = "infoHash")]
    info_hash: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    seeders: u32,
    #[serde(default)]
    leechers: u32,
    #[serde(default)]
    trackers: Vec<String>,
}

impl IndexerProvider {
    /// Creates a provider for the indexer at `base_url`.
    ///
    /// # Errors
    /// - `MediaSearchError::ProviderError` - `base_url` is not a valid URL
    pub fn new(name: impl Into<String>, base_url: &str) -> Result<Self, MediaSearchError> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("api/v1/search"))
            .map_err(|e| MediaSearchError::ProviderError {
                reason: format!("Invalid indexer URL {base_url}: {e}"),
            })?;
        Ok(Self {
            name: name.into(),
            client: reqwest::Client::new(),
            endpoint,
            api_key: None,
            kinds: vec![QueryKind::Text, QueryKind::Movie, QueryKind::Episode],
        })
    }

    /// Sends `key` with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Restricts the query kinds this indexer answers.
    pub fn with_kinds(mut self, kinds: &[QueryKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Search endpoint requests are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn params(&self, query: &SearchQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![("query", query.to_text()), ("limit", RESULT_LIMIT.to_string())];
        match query {
            SearchQuery::Text(_) => params.push(("category", "all".to_string())),
            SearchQuery::Movie { imdb_id, .. } => {
                params.push(("category", "movie".to_string()));
                if let Some(id) = imdb_id {
                    params.push(("imdb", id.clone()));
                }
            }
            SearchQuery::Episode {
                season, episode, ..
            } => {
                params.push(("category", "tv".to_string()));
                params.push(("season", season.to_string()));
                params.push(("episode", episode.to_string()));
            }
        }
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.clone()));
        }
        params
    }

    fn candidates(&self, response: IndexerResponse) -> Vec<CandidateTorrent> {
        response
            .results
            .into_iter()
            .filter_map(|row| self.candidate(row))
            .collect()
    }

    fn candidate(&self, row: IndexerTorrent) -> Option<CandidateTorrent> {
        let hint = row.info_hash.as_deref().and_then(|h| h.parse::<InfoHash>().ok());
        let locator = match (&row.magnet, &row.link) {
            (Some(magnet), _) => match MagnetParser::parse_magnet_link(magnet) {
                Ok(link) => TorrentLocator::parse(magnet)
                    .with_info_hash(link.info_hash)
                    .with_trackers(link.trackers),
                Err(e) => {
                    debug!("{}: skipping '{}' with bad magnet: {}", self.name, row.name, e);
                    return None;
                }
            },
            (None, Some(link)) => {
                let locator = TorrentLocator::parse(link);
                match hint {
                    Some(hash) => locator.with_info_hash(hash),
                    None => locator,
                }
            }
            (None, None) => {
                debug!("{}: skipping '{}' without a link", self.name, row.name);
                return None;
            }
        };

        let locator = locator
            .with_name(row.name.clone())
            .with_trackers(row.trackers);
        let candidate = CandidateTorrent::new(&self.name, row.name, locator)
            .with_counts(row.seeders, row.leechers);
        Some(match row.size {
            Some(size) => candidate.with_size(size),
            None => candidate,
        })
    }
}

#[async_trait]
impl SearchProvider for IndexerProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, kind: QueryKind) -> bool {
        self.kinds.contains(&kind)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CandidateTorrent>, MediaSearchError> {
        if !self.supports(query.kind()) {
            return Err(MediaSearchError::UnsupportedQuery {
                provider: self.name.clone(),
                kind: query.kind(),
            });
        }

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&self.params(query))
            .send()
            .await
            .map_err(|e| MediaSearchError::NetworkError {
                reason: format!("{} request failed: {e}", self.name),
            })?;

        if !response.status().is_success() {
            return Err(MediaSearchError::SearchFailed {
                query: query.to_text(),
                reason: format!("{} HTTP {}", self.name, response.status()),
            });
        }

        let body: IndexerResponse = response.json().await.map_err(|e| MediaSearchError::ParseError {
            reason: format!("{} JSON parsing failed: {e}", self.name),
        })?;

        let candidates = self.candidates(body);
        debug!("{} returned {} candidates for '{}'", self.name, candidates.len(), query);
        Ok(candidates)
    }
}
