//! Search aggregation
//!
//! Fans a query out to every provider, merges duplicate results by info
//! hash, refreshes seed and peer counts from the trackers and ranks the
//! merged list. A failing or slow provider or tracker only loses its own
//! contribution; the aggregate search itself never fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};
use undertow_core::config::SearchConfig;
use undertow_core::torrent::{
    CandidateTorrent, InfoHash, Resolution, RipType, TorrentResolver, TrackerScraper,
    UdpTrackerScraper,
};
use url::Url;

use crate::errors::MediaSearchError;
use crate::providers::SearchProvider;
use crate::query::SearchQuery;

/// Concurrent search over a set of providers.
#[derive(Debug)]
pub struct SearchAggregator {
    providers: Vec<Arc<dyn SearchProvider>>,
    scraper: Arc<dyn TrackerScraper>,
    resolver: Option<TorrentResolver>,
    backend_timeout: Duration,
    fallback_trackers: Vec<String>,
}

impl SearchAggregator {
    /// Creates an aggregator without providers, scraping over UDP.
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            providers: Vec::new(),
            scraper: Arc::new(UdpTrackerScraper::new(config.tracker_timeout)),
            resolver: None,
            backend_timeout: config.effective_backend_timeout(),
            fallback_trackers: config.fallback_trackers.clone(),
        }
    }

    /// Adds a provider.
    pub fn with_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replaces the tracker scraper.
    pub fn with_scraper(mut self, scraper: Arc<dyn TrackerScraper>) -> Self {
        self.scraper = scraper;
        self
    }

    /// Resolves candidates that lack an info hash or name before merging.
    pub fn with_resolver(mut self, resolver: TorrentResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Number of registered providers.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Runs `query` against every provider and returns the ranked results.
    pub async fn search(&self, query: &SearchQuery) -> Vec<CandidateTorrent> {
        let raw = self.gather(query).await;
        let raw = self.resolve(raw).await;
        let mut candidates = merge_candidates(raw);

        let trackers = collect_trackers(&candidates, &self.fallback_trackers);
        self.enrich(&mut candidates, &trackers).await;

        rank(&mut candidates);
        info!(
            "Search '{}' produced {} candidates from {} providers",
            query,
            candidates.len(),
            self.providers.len()
        );
        candidates
    }

    async fn gather(&self, query: &SearchQuery) -> Vec<CandidateTorrent> {
        let kind = query.kind();
        let searches = self
            .providers
            .iter()
            .filter(|provider| {
                let supported = provider.supports(kind);
                if !supported {
                    debug!("Skipping {} for {} query", provider.name(), kind);
                }
                supported
            })
            .map(|provider| self.search_one(provider.as_ref(), query));

        join_all(searches).await.into_iter().flatten().collect()
    }

    async fn search_one(&self, provider: &dyn SearchProvider, query: &SearchQuery) -> Vec<CandidateTorrent> {
        let result = match tokio::time::timeout(self.backend_timeout, provider.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(MediaSearchError::Timeout {
                provider: provider.name().to_string(),
                after: self.backend_timeout,
            }),
        };

        match result {
            Ok(candidates) => {
                debug!("{} returned {} candidates", provider.name(), candidates.len());
                candidates
            }
            Err(e) => {
                warn!("Provider {} contributed nothing: {}", provider.name(), e);
                Vec::new()
            }
        }
    }

    async fn resolve(&self, candidates: Vec<CandidateTorrent>) -> Vec<CandidateTorrent> {
        let Some(resolver) = &self.resolver else {
            return candidates;
        };

        let resolved = candidates.into_iter().map(|mut candidate| async move {
            match resolver.resolve_candidate(&mut candidate).await {
                Ok(()) => Some(candidate),
                Err(e) => {
                    warn!("Dropping unresolvable candidate {}: {}", candidate.name, e);
                    None
                }
            }
        });
        join_all(resolved).await.into_iter().flatten().collect()
    }

    async fn enrich(&self, candidates: &mut [CandidateTorrent], trackers: &[String]) {
        let hashes: Vec<InfoHash> = candidates.iter().filter_map(|c| c.info_hash()).collect();
        if hashes.is_empty() || trackers.is_empty() {
            return;
        }

        let scrapes = trackers.iter().map(|tracker| {
            let hashes = &hashes;
            async move { (tracker, self.scraper.scrape(tracker, hashes).await) }
        });
        let results = join_all(scrapes).await;

        let positions: HashMap<InfoHash, usize> = candidates
            .iter()
            .enumerate()
            .filter_map(|(position, c)| c.info_hash().map(|hash| (hash, position)))
            .collect();

        for (tracker, result) in results {
            let batches = match result {
                Ok(batches) => batches,
                Err(e) => {
                    debug!("Scrape of {} failed: {}", tracker, e);
                    continue;
                }
            };
            for batch in &batches {
                if let Err(e) = &batch.result {
                    debug!("Scrape batch {:?} of {} failed: {}", batch.hashes, tracker, e);
                }
                for (index, stat) in batch.answered() {
                    let position = hashes.get(index).and_then(|hash| positions.get(hash));
                    if let Some(&position) = position {
                        candidates[position].raise_counts(stat.seeders, stat.leechers);
                    }
                }
            }
        }
    }
}

/// Merges candidates sharing an info hash, keeping first-seen order.
///
/// The first occurrence is the base record and later duplicates are folded
/// in with [`CandidateTorrent::absorb`]. Candidates without a hash are kept
/// as they are.
pub fn merge_candidates(candidates: Vec<CandidateTorrent>) -> Vec<CandidateTorrent> {
    let mut merged: Vec<CandidateTorrent> = Vec::with_capacity(candidates.len());
    let mut by_hash: HashMap<InfoHash, usize> = HashMap::new();

    for candidate in candidates {
        match candidate.info_hash() {
            Some(hash) => match by_hash.get(&hash) {
                Some(&position) => merged[position].absorb(&candidate),
                None => {
                    by_hash.insert(hash, merged.len());
                    merged.push(candidate);
                }
            },
            None => merged.push(candidate),
        }
    }
    merged
}

/// Distinct UDP trackers across `candidates` followed by the fallback list.
///
/// Trackers are distinct by host and port; the first URL seen for a host
/// is the one scraped.
pub fn collect_trackers(candidates: &[CandidateTorrent], fallback: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    let mut trackers = Vec::new();

    let urls = candidates
        .iter()
        .flat_map(|c| c.locator.trackers.iter())
        .chain(fallback.iter());
    for url in urls {
        let Some(key) = tracker_key(url) else {
            debug!("Not scraping {}", url);
            continue;
        };
        if !seen.contains(&key) {
            seen.push(key);
            trackers.push(url.clone());
        }
    }
    trackers
}

fn tracker_key(url: &str) -> Option<(String, u16)> {
    let parsed = Url::parse(url).ok()?;
    if parsed.scheme() != "udp" {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some((host, parsed.port()?))
}

fn resolution_rank(resolution: Resolution) -> u64 {
    (resolution as u64).max(1)
}

fn rip_rank(rip_type: RipType) -> u64 {
    rip_type as u64
}

/// Ranking score: `seeds × resolution³ × rip type`.
///
/// Unknown resolution counts as rank 1; unknown rip type is a true zero.
pub fn quality_score(candidate: &CandidateTorrent) -> u64 {
    let resolution = resolution_rank(candidate.quality.resolution);
    u64::from(candidate.seeds) * resolution.pow(3) * rip_rank(candidate.quality.rip_type)
}

/// Sorts by descending score; ties go to resolution, then rip type, then seeds.
pub fn rank(candidates: &mut [CandidateTorrent]) {
    candidates.sort_by(|a, b| {
        quality_score(b)
            .cmp(&quality_score(a))
            .then_with(|| b.quality.resolution.cmp(&a.quality.resolution))
            .then_with(|| b.quality.rip_type.cmp(&a.quality.rip_type))
            .then_with(|| b.seeds.cmp(&a.seeds))
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use proptest::prelude::*;
    use undertow_core::torrent::{
        MagnetParser, QualityTags, ScrapeBatch, ScrapeStats, TorrentError, TorrentLocator,
    };

    use super::*;
    use crate::providers::StaticProvider;

    /// Answers every scrape with fixed per-hash counts.
    ///
    /// Hashes are split into batches of `batch_size`; batches listed in
    /// `failing_batches` time out.
    #[derive(Debug)]
    struct FakeScraper {
        stats: HashMap<InfoHash, ScrapeStats>,
        failing: Vec<String>,
        batch_size: usize,
        failing_batches: Vec<usize>,
        /// Tracker URLs scraped, in call order
        calls: Mutex<Vec<String>>,
    }

    impl Default for FakeScraper {
        fn default() -> Self {
            Self {
                stats: HashMap::new(),
                failing: Vec::new(),
                batch_size: 70,
                failing_batches: Vec::new(),
                calls: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl TrackerScraper for FakeScraper {
        async fn scrape(
            &self,
            tracker_url: &str,
            hashes: &[InfoHash],
        ) -> Result<Vec<ScrapeBatch>, TorrentError> {
            self.calls.lock().unwrap().push(tracker_url.to_string());
            if self.failing.iter().any(|t| t == tracker_url) {
                return Err(TorrentError::RequestTimedOut {
                    url: tracker_url.to_string(),
                });
            }
            Ok(hashes
                .chunks(self.batch_size)
                .enumerate()
                .map(|(index, batch)| {
                    let start = index * self.batch_size;
                    let result = if self.failing_batches.contains(&index) {
                        Err(TorrentError::RequestTimedOut {
                            url: tracker_url.to_string(),
                        })
                    } else {
                        Ok(batch
                            .iter()
                            .map(|hash| self.stats.get(hash).copied().unwrap_or_default())
                            .collect())
                    };
                    ScrapeBatch {
                        hashes: start..start + batch.len(),
                        result,
                    }
                })
                .collect())
        }
    }

    fn hash(byte: u8) -> InfoHash {
        InfoHash::new([byte; 20])
    }

    fn candidate(byte: u8, name: &str, trackers: &[&str]) -> CandidateTorrent {
        let magnet = MagnetParser::to_magnet_uri(&hash(byte), Some(name), &[]);
        let locator = TorrentLocator::parse(&magnet)
            .with_info_hash(hash(byte))
            .with_trackers(trackers.iter().copied());
        CandidateTorrent::new("test", name, locator)
    }

    fn config() -> SearchConfig {
        SearchConfig {
            backend_timeout: Duration::from_millis(200),
            fallback_trackers: vec!["udp://fallback.example:80".to_string()],
            ..SearchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_duplicates_merge_to_best_tags() {
        let a = StaticProvider::new("a", vec![candidate(1, "Example 720p", &[]).with_counts(12, 3)]);
        let b = StaticProvider::new("b", vec![candidate(1, "Example BluRay", &[]).with_counts(99, 9)]);
        let aggregator = SearchAggregator::new(&config())
            .with_scraper(Arc::new(FakeScraper::default()))
            .with_provider(Arc::new(a))
            .with_provider(Arc::new(b));

        let results = aggregator.search(&SearchQuery::text("example")).await;

        assert_eq!(results.len(), 1);
        let merged = &results[0];
        assert_eq!(merged.quality.resolution, Resolution::Hd720);
        assert_eq!(merged.quality.rip_type, RipType::BluRay);
        assert!(merged.multi);
        assert_eq!(merged.provider, "a");
        assert_eq!((merged.seeds, merged.peers), (12, 3));
    }

    #[tokio::test]
    async fn test_slow_and_failing_providers_contribute_nothing() {
        let fast = StaticProvider::new("fast", vec![candidate(1, "Film 1080p BluRay", &[])]);
        let slow = StaticProvider::new("slow", vec![candidate(2, "Film 2160p BluRay", &[])])
            .with_delay(Duration::from_secs(30));
        let broken = StaticProvider::new("broken", Vec::new()).failing("HTTP 503");
        let aggregator = SearchAggregator::new(&config())
            .with_scraper(Arc::new(FakeScraper::default()))
            .with_provider(Arc::new(fast))
            .with_provider(Arc::new(slow))
            .with_provider(Arc::new(broken));

        let started = std::time::Instant::now();
        let results = aggregator.search(&SearchQuery::text("film")).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provider, "fast");
    }

    #[tokio::test]
    async fn test_scrape_raises_counts_and_uses_distinct_trackers() {
        let mut stats = HashMap::new();
        stats.insert(hash(1), ScrapeStats { seeders: 500, completed: 0, leechers: 40 });
        stats.insert(hash(2), ScrapeStats { seeders: 1, completed: 0, leechers: 1 });
        let scraper = Arc::new(FakeScraper {
            stats,
            failing: vec!["udp://down.example:6969".to_string()],
            ..FakeScraper::default()
        });

        let provider = StaticProvider::new(
            "p",
            vec![
                candidate(1, "Show 720p WEB", &["udp://one.example:80/announce", "http://web.example/announce"])
                    .with_counts(10, 2),
                candidate(2, "Show 1080p WEB", &["udp://ONE.example:80", "udp://down.example:6969"])
                    .with_counts(70, 20),
            ],
        );
        let aggregator = SearchAggregator::new(&config())
            .with_scraper(scraper.clone())
            .with_provider(Arc::new(provider));

        let results = aggregator.search(&SearchQuery::text("show")).await;

        let mut calls = scraper.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(
            calls,
            vec![
                "udp://down.example:6969",
                "udp://fallback.example:80",
                "udp://one.example:80/announce",
            ]
        );

        let first = results.iter().find(|c| c.info_hash() == Some(hash(1))).unwrap();
        assert_eq!((first.seeds, first.peers), (500, 40));
        let second = results.iter().find(|c| c.info_hash() == Some(hash(2))).unwrap();
        assert_eq!((second.seeds, second.peers), (70, 20));
    }

    #[tokio::test]
    async fn test_failed_scrape_batch_keeps_other_batches() {
        let mut stats = HashMap::new();
        for byte in 1..=5 {
            stats.insert(hash(byte), ScrapeStats { seeders: 300, completed: 0, leechers: 30 });
        }
        let scraper = Arc::new(FakeScraper {
            stats,
            batch_size: 2,
            failing_batches: vec![1],
            ..FakeScraper::default()
        });

        let catalogue = (1..=5)
            .map(|byte| candidate(byte, "Clip 1080p WEB", &[]).with_counts(10, 1))
            .collect();
        let aggregator = SearchAggregator::new(&config())
            .with_scraper(scraper)
            .with_provider(Arc::new(StaticProvider::new("p", catalogue)));

        let results = aggregator.search(&SearchQuery::text("clip")).await;
        assert_eq!(results.len(), 5);

        let counts = |byte: u8| {
            let found = results.iter().find(|c| c.info_hash() == Some(hash(byte))).unwrap();
            (found.seeds, found.peers)
        };
        // Batches: [1, 2] answered, [3, 4] timed out, [5] answered.
        assert_eq!(counts(1), (300, 30));
        assert_eq!(counts(2), (300, 30));
        assert_eq!(counts(3), (10, 1));
        assert_eq!(counts(4), (10, 1));
        assert_eq!(counts(5), (300, 30));
    }

    #[tokio::test]
    async fn test_unsupported_providers_skipped() {
        let movies = StaticProvider::new("movies", vec![candidate(1, "Heat 1995 1080p", &[])])
            .with_kinds(&[crate::query::QueryKind::Movie]);
        let aggregator = SearchAggregator::new(&config())
            .with_scraper(Arc::new(FakeScraper::default()))
            .with_provider(Arc::new(movies));

        assert!(aggregator.search(&SearchQuery::text("heat")).await.is_empty());
        assert_eq!(aggregator.search(&SearchQuery::movie("heat")).await.len(), 1);
    }

    #[test]
    fn test_resolution_outweighs_seeds() {
        let mut candidates = vec![
            candidate(1, "Plain Release", &[]).with_counts(500, 0),
            candidate(2, "Release 1080p BluRay", &[]).with_counts(1, 0),
            candidate(3, "Release 720p WEB-DL", &[]).with_counts(3, 0),
        ];
        rank(&mut candidates);

        let order: Vec<_> = candidates.iter().map(|c| c.info_hash().unwrap()).collect();
        assert_eq!(order, vec![hash(2), hash(3), hash(1)]);
        assert_eq!(quality_score(&candidates[0]), 27 * 9);
        assert_eq!(quality_score(&candidates[2]), 0);
    }

    #[test]
    fn test_untagged_candidates_order_by_seeds() {
        let mut candidates = vec![
            candidate(1, "Home Video", &[]).with_counts(5, 0),
            candidate(2, "Home Video", &[]).with_counts(50, 0),
        ];
        rank(&mut candidates);
        assert_eq!(candidates[0].seeds, 50);
    }

    #[test]
    fn test_merge_keeps_unhashed_candidates() {
        let unhashed =
            CandidateTorrent::new("p", "Loose", TorrentLocator::parse("https://x.example/a.torrent"));
        let merged = merge_candidates(vec![
            candidate(1, "A 480p", &["udp://a:1"]),
            unhashed.clone(),
            candidate(1, "A", &["udp://b:2"]),
            unhashed,
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].locator.trackers, vec!["udp://a:1", "udp://b:2"]);
        assert_eq!(merged[0].quality.resolution, Resolution::Sd480);
        assert!(merged[0].multi);
    }

    fn arb_candidate() -> impl Strategy<Value = CandidateTorrent> {
        (any::<u8>(), 0u32..10_000, 0usize..6, 0usize..10).prop_map(|(byte, seeds, res, rip)| {
            let resolution = [
                Resolution::Unknown,
                Resolution::Sd480,
                Resolution::Hd720,
                Resolution::Hd1080,
                Resolution::Qhd1440,
                Resolution::Uhd4k,
            ][res];
            let rip_type = [
                RipType::Unknown,
                RipType::Cam,
                RipType::Telesync,
                RipType::Telecine,
                RipType::Screener,
                RipType::DvdScreener,
                RipType::DvdRip,
                RipType::Hdtv,
                RipType::WebDl,
                RipType::BluRay,
            ][rip];
            candidate(byte, "x", &[])
                .with_counts(seeds, 0)
                .with_quality(QualityTags {
                    resolution,
                    rip_type,
                    ..QualityTags::default()
                })
        })
    }

    proptest! {
        #[test]
        fn prop_ranked_scores_never_increase(mut candidates in prop::collection::vec(arb_candidate(), 0..40)) {
            rank(&mut candidates);
            for pair in candidates.windows(2) {
                prop_assert!(quality_score(&pair[0]) >= quality_score(&pair[1]));
            }
        }
    }
}
