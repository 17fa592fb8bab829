//! Search backends.

use async_trait::async_trait;
use undertow_core::torrent::CandidateTorrent;

use crate::errors::MediaSearchError;
use crate::query::{QueryKind, SearchQuery};

pub mod fixed;
pub mod indexer;

pub use fixed::StaticProvider;
pub use indexer::IndexerProvider;

/// A source of raw search candidates.
///
/// Implementations return whatever they find for one query. Merging,
/// scrape enrichment and ranking happen in the aggregator.
#[async_trait]
pub trait SearchProvider: Send + Sync + std::fmt::Debug {
    /// Identifier stamped on every candidate this provider returns.
    fn name(&self) -> &str;

    /// Whether this provider can answer queries of `kind`.
    fn supports(&self, kind: QueryKind) -> bool;

    /// Runs `query` against the backend.
    ///
    /// # Errors
    /// - `MediaSearchError::UnsupportedQuery` - Query kind not supported
    /// - `MediaSearchError::NetworkError` - Backend unreachable
    /// - `MediaSearchError::SearchFailed` - Backend rejected the query
    /// - `MediaSearchError::ParseError` - Response could not be decoded
    async fn search(&self, query: &SearchQuery) -> Result<Vec<CandidateTorrent>, MediaSearchError>;
}
