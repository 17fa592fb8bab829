//! In-memory provider over a fixed catalogue.

use std::time::Duration;

use async_trait::async_trait;
use undertow_core::torrent::CandidateTorrent;

use super::SearchProvider;
use crate::errors::MediaSearchError;
use crate::query::{QueryKind, SearchQuery, terms_of};

/// Serves candidates from a fixed list.
///
/// A candidate matches when every query term appears among the words of its
/// name. Useful offline and for exercising the aggregator; an optional delay
/// or failure stands in for a slow or broken backend.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    name: String,
    catalogue: Vec<CandidateTorrent>,
    kinds: Vec<QueryKind>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl StaticProvider {
    /// Creates a provider answering every query kind from `catalogue`.
    pub fn new(name: impl Into<String>, catalogue: Vec<CandidateTorrent>) -> Self {
        Self {
            name: name.into(),
            catalogue,
            kinds: vec![QueryKind::Text, QueryKind::Movie, QueryKind::Episode],
            delay: None,
            failure: None,
        }
    }

    /// Restricts the query kinds this provider answers.
    pub fn with_kinds(mut self, kinds: &[QueryKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails every search with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    fn matches(candidate: &CandidateTorrent, terms: &[String]) -> bool {
        let words = terms_of(&candidate.name);
        terms.iter().all(|term| words.contains(term))
    }
}

#[async_trait]
impl SearchProvider for StaticProvider {
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
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(MediaSearchError::ProviderError {
                reason: reason.clone(),
            });
        }

        let terms = query.terms();
        Ok(self
            .catalogue
            .iter()
            .filter(|candidate| Self::matches(candidate, &terms))
            .map(|candidate| CandidateTorrent {
                provider: self.name.clone(),
                ..candidate.clone()
            })
            .collect())
    }
}
