//! Search query kinds.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static SEPARATORS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").ok());

/// Discriminant of [`SearchQuery`], advertised by providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Free-text search
    Text,
    /// Movie by title and year
    Movie,
    /// Single episode of a show
    Episode,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryKind::Text => "text",
            QueryKind::Movie => "movie",
            QueryKind::Episode => "episode",
        };
        f.write_str(name)
    }
}

/// What the user is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchQuery {
    /// Free text passed to the backends as is
    Text(String),
    /// A movie, optionally pinned to its release year and an external id
    Movie {
        /// Release title
        title: String,
        /// Release year
        year: Option<u16>,
        /// IMDb identifier such as `tt0133093`
        imdb_id: Option<String>,
    },
    /// A single episode
    Episode {
        /// Show title
        show: String,
        /// Season number
        season: u32,
        /// Episode number within the season
        episode: u32,
    },
}

impl SearchQuery {
    /// Free-text query.
    pub fn text(query: impl Into<String>) -> Self {
        SearchQuery::Text(query.into())
    }

    /// Movie query without year or id.
    pub fn movie(title: impl Into<String>) -> Self {
        SearchQuery::Movie {
            title: title.into(),
            year: None,
            imdb_id: None,
        }
    }

    /// Episode query.
    pub fn episode(show: impl Into<String>, season: u32, episode: u32) -> Self {
        SearchQuery::Episode {
            show: show.into(),
            season,
            episode,
        }
    }

    /// Kind used for provider capability checks.
    pub fn kind(&self) -> QueryKind {
        match self {
            SearchQuery::Text(_) => QueryKind::Text,
            SearchQuery::Movie { .. } => QueryKind::Movie,
            SearchQuery::Episode { .. } => QueryKind::Episode,
        }
    }

    /// Flattens the query to the text an indexer would be sent.
    ///
    /// ```
    /// use undertow_search::SearchQuery;
    ///
    /// assert_eq!(SearchQuery::episode("Dark", 1, 3).to_text(), "Dark S01E03");
    /// ```
    pub fn to_text(&self) -> String {
        match self {
            SearchQuery::Text(text) => text.trim().to_string(),
            SearchQuery::Movie { title, year, .. } => match year {
                Some(year) => format!("{} {year}", title.trim()),
                None => title.trim().to_string(),
            },
            SearchQuery::Episode {
                show,
                season,
                episode,
            } => format!("{} S{season:02}E{episode:02}", show.trim()),
        }
    }

    /// Lowercase words of [`Self::to_text`], punctuation stripped.
    pub fn terms(&self) -> Vec<String> {
        terms_of(&self.to_text())
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Splits `text` into lowercase alphanumeric words.
pub fn terms_of(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    match SEPARATORS.as_ref() {
        Some(separators) => separators
            .split(&lower)
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect(),
        None => lower.split_whitespace().map(str::to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_text_forms() {
        let movie = SearchQuery::Movie {
            title: " The Matrix ".to_string(),
            year: Some(1999),
            imdb_id: Some("tt0133093".to_string()),
        };
        assert_eq!(movie.to_text(), "The Matrix 1999");
        assert_eq!(movie.kind(), QueryKind::Movie);
        assert_eq!(SearchQuery::movie("Heat").to_text(), "Heat");
        assert_eq!(SearchQuery::episode("Show", 12, 1).to_text(), "Show S12E01");
    }

    #[test]
    fn test_terms_strip_punctuation() {
        assert_eq!(
            terms_of("Big.Movie.2019.1080p-GROUP"),
            vec!["big", "movie", "2019", "1080p", "group"]
        );
        assert_eq!(SearchQuery::text("  ").terms(), Vec::<String>::new());
    }
}
