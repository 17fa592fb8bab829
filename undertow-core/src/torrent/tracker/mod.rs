//! Tracker scrape client.
//!
//! Minimal UDP tracker protocol (BEP 15) implementation with
//! connect/announce/scrape, used for seed and peer counts only.

pub mod protocol;
pub mod types;
pub mod udp;

// Re-export public API
pub use types::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, ScrapeBatch, ScrapeStats, TrackerScraper,
};
pub use udp::{UdpTracker, UdpTrackerScraper};

/// Fallback trackers used when a candidate or transfer carries none.
pub const DEFAULT_TRACKERS: &[&str] = &[
    "udp://open.demonii.com:1337/announce",
    "udp://tracker.publicbt.com:80",
    "udp://tracker.openbittorrent.com:80",
    "udp://pow7.com:80/announce",
];
