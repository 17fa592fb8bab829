//! Undertow Search - search backends and result aggregation

#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! Queries several torrent indexers concurrently, merges duplicate releases
//! by info hash, refreshes swarm counts from UDP trackers and ranks the
//! results by quality.

pub mod aggregator;
pub mod errors;
pub mod providers;
pub mod query;

// Re-export main types
pub use aggregator::{SearchAggregator, collect_trackers, merge_candidates, quality_score, rank};
pub use errors::MediaSearchError;
pub use providers::{IndexerProvider, SearchProvider, StaticProvider};
pub use query::{QueryKind, SearchQuery};

/// Convenience type alias for Results with MediaSearchError.
pub type Result<T> = std::result::Result<T, MediaSearchError>;
