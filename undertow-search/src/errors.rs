//! Error types for search backends and aggregation.

use std::time::Duration;

use thiserror::Error;

use crate::query::QueryKind;

/// Errors a single search backend can report.
///
/// The aggregator logs these and drops the backend's contribution; they
/// surface to callers only when a provider is queried directly.
#[derive(Debug, Error)]
pub enum MediaSearchError {
    /// Search operation failed with the specified query and reason.
    #[error("Search failed for query '{query}': {reason}")]
    SearchFailed {
        /// The search query that failed
        query: String,
        /// The reason for the failure
        reason: String,
    },

    /// Network communication error occurred during search.
    #[error("Network error: {reason}")]
    NetworkError {
        /// The reason for the network error
        reason: String,
    },

    /// Failed to parse search results or response data.
    #[error("Parse error: {reason}")]
    ParseError {
        /// The reason for the parse error
        reason: String,
    },

    /// Search provider returned an error or is unavailable.
    #[error("Provider error: {reason}")]
    ProviderError {
        /// The reason for the provider error
        reason: String,
    },

    /// Backend did not answer within its budget.
    #[error("Provider '{provider}' timed out after {after:?}")]
    Timeout {
        /// Name of the slow provider
        provider: String,
        /// Budget that was exceeded
        after: Duration,
    },

    /// Backend cannot handle this kind of query.
    #[error("Provider '{provider}' does not support {kind} queries")]
    UnsupportedQuery {
        /// Name of the provider
        provider: String,
        /// Kind of the rejected query
        kind: QueryKind,
    },
}

impl From<reqwest::Error> for MediaSearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            MediaSearchError::ParseError {
                reason: e.to_string(),
            }
        } else {
            MediaSearchError::NetworkError {
                reason: e.to_string(),
            }
        }
    }
}
