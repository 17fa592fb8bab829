//! Centralized configuration for Undertow.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

use crate::torrent::DEFAULT_TRACKERS;

const MIB: u64 = 1024 * 1024;

/// Central configuration for all Undertow components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub stream: StreamConfig,
    pub search: SearchConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub simulation: SimulationConfig,
}

/// Buffer controller configuration.
///
/// Download locations, rate limits, lifecycle toggles and the buffer
/// window geometry used to build piece schedules.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Where transfers are saved; streaming refuses to start without it
    pub download_dir: Option<PathBuf>,
    /// Directory holding `<infohash>.fastresume` blobs
    pub resume_dir: Option<PathBuf>,
    /// Download limit in bytes per second (None = unlimited)
    pub max_download_rate: Option<u64>,
    /// Upload limit in bytes per second (None = unlimited)
    pub max_upload_rate: Option<u64>,
    /// Apply the rate limits only once the buffer is full
    pub limit_after_buffering: bool,
    /// Leave downloaded data on disk when a stream stops
    pub keep_files: bool,
    /// Leave the transfer running after playback stops
    pub keep_in_background: bool,
    /// Floor for the head buffer window
    pub min_buffer_bytes: u64,
    /// Files smaller than this are not considered for streaming
    pub min_candidate_file_size: u64,
    /// Head buffer as a fraction of the chosen file's piece span
    pub head_buffer_fraction: f64,
    /// Tail buffer window size
    pub tail_buffer_bytes: u64,
    /// How long to wait for the player to report playback
    pub playback_start_timeout: Duration,
    /// Cancellation and disk-space check interval
    pub buffer_fast_tick: Duration,
    /// Buffer progress report interval
    pub buffer_slow_tick: Duration,
    /// Playback state poll interval
    pub playback_poll_tick: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            resume_dir: None,
            max_download_rate: None,
            max_upload_rate: None,
            limit_after_buffering: false,
            keep_files: false,
            keep_in_background: false,
            min_buffer_bytes: 20 * MIB,
            min_candidate_file_size: 100 * MIB,
            head_buffer_fraction: 0.005,
            tail_buffer_bytes: 10 * MIB,
            playback_start_timeout: Duration::from_secs(20),
            buffer_fast_tick: Duration::from_millis(500),
            buffer_slow_tick: Duration::from_secs(1),
            playback_poll_tick: Duration::from_secs(1),
        }
    }
}

/// Search aggregation configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Per-backend timeout on interactive hardware
    pub backend_timeout: Duration,
    /// Per-backend timeout on constrained hardware
    pub low_power_backend_timeout: Duration,
    /// Running on constrained hardware
    pub low_power: bool,
    /// Per-request UDP tracker timeout
    pub tracker_timeout: Duration,
    /// Trackers scraped for every candidate
    pub fallback_trackers: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(4),
            low_power_backend_timeout: Duration::from_secs(30),
            low_power: false,
            tracker_timeout: Duration::from_secs(3),
            fallback_trackers: DEFAULT_TRACKERS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl SearchConfig {
    /// Backend timeout for the current hardware profile.
    pub fn effective_backend_timeout(&self) -> Duration {
        if self.low_power {
            self.low_power_backend_timeout
        } else {
            self.backend_timeout
        }
    }
}

/// Encryption policy for peer connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionPolicy {
    Enabled,
    Forced,
    Disabled,
}

/// Proxy used by the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Transfer engine session settings.
///
/// Applied once when the engine session is created.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// User agent announced to trackers and peers
    pub user_agent: String,
    /// Maximum concurrent peer connections
    pub connections_limit: usize,
    pub encryption: EncryptionPolicy,
    pub proxy: Option<ProxyConfig>,
    /// Inclusive listen port range
    pub listen_ports: (u16, u16),
    pub enable_dht: bool,
    pub enable_lsd: bool,
    pub enable_upnp: bool,
    pub enable_natpmp: bool,
    /// HTTP timeout for fetching `.torrent` files
    pub fetch_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("undertow/{}", env!("CARGO_PKG_VERSION")),
            connections_limit: 200,
            encryption: EncryptionPolicy::Enabled,
            proxy: None,
            listen_ports: (6891, 6899),
            enable_dht: true,
            enable_lsd: true,
            enable_upnp: true,
            enable_natpmp: true,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Filesystem locations owned by a running session.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Cache for fetched `.torrent` files, one directory per process
    pub torrent_cache_dir: PathBuf,
    /// Directory for trace log files
    pub logs_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            torrent_cache_dir: std::env::temp_dir()
                .join(format!("undertow-torrents-{}", std::process::id())),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

/// Simulated transfer engine configuration for testing and development.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Deterministic seed for reproducible simulations
    pub deterministic_seed: Option<u64>,
    /// Simulated download speed in bytes per second
    pub simulated_download_speed: u64,
    /// Simulated time between engine ticks
    pub tick_interval: Duration,
    /// Delay before magnet metadata "arrives"
    pub metadata_delay: Duration,
    /// Payload size synthesized for magnets with no registered metadata
    pub synthetic_payload_size: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            simulated_download_speed: 4 * MIB,
            tick_interval: Duration::from_millis(100),
            metadata_delay: Duration::from_millis(500),
            synthetic_payload_size: 700 * MIB,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            deterministic_seed: Some(42),
            simulated_download_speed: 64 * MIB,
            tick_interval: Duration::from_millis(5),
            metadata_delay: Duration::from_millis(10),
            synthetic_payload_size: 128 * MIB,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("UNDERTOW_DOWNLOAD_DIR") {
            config.stream.download_dir = Some(PathBuf::from(dir));
        }
        if let Ok(dir) = std::env::var("UNDERTOW_RESUME_DIR") {
            config.stream.resume_dir = Some(PathBuf::from(dir));
        }
        if let Some(rate) = env_parse::<u64>("UNDERTOW_MAX_DOWNLOAD_RATE") {
            config.stream.max_download_rate = (rate > 0).then_some(rate);
        }
        if let Some(rate) = env_parse::<u64>("UNDERTOW_MAX_UPLOAD_RATE") {
            config.stream.max_upload_rate = (rate > 0).then_some(rate);
        }
        if let Some(flag) = env_flag("UNDERTOW_LIMIT_AFTER_BUFFERING") {
            config.stream.limit_after_buffering = flag;
        }
        if let Some(flag) = env_flag("UNDERTOW_KEEP_FILES") {
            config.stream.keep_files = flag;
        }
        if let Some(flag) = env_flag("UNDERTOW_BACKGROUND") {
            config.stream.keep_in_background = flag;
        }

        // Search configuration overrides
        if let Some(seconds) = env_parse::<u64>("UNDERTOW_SEARCH_TIMEOUT") {
            config.search.backend_timeout = Duration::from_secs(seconds);
        }
        if let Some(seconds) = env_parse::<u64>("UNDERTOW_TRACKER_TIMEOUT") {
            config.search.tracker_timeout = Duration::from_secs(seconds);
        }
        if let Some(flag) = env_flag("UNDERTOW_LOW_POWER") {
            config.search.low_power = flag;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Small buffer floor and fast ticks so controller tests finish quickly.
    pub fn for_testing() -> Self {
        Self {
            stream: StreamConfig {
                download_dir: Some(std::env::temp_dir().join("undertow-test-downloads")),
                min_buffer_bytes: 5 * MIB,
                playback_start_timeout: Duration::from_millis(500),
                buffer_fast_tick: Duration::from_millis(10),
                buffer_slow_tick: Duration::from_millis(20),
                playback_poll_tick: Duration::from_millis(20),
                ..Default::default()
            },
            search: SearchConfig {
                backend_timeout: Duration::from_millis(500),
                tracker_timeout: Duration::from_millis(200),
                fallback_trackers: Vec::new(),
                ..Default::default()
            },
            simulation: SimulationConfig::deterministic_testing(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = UndertowConfig::default();

        assert_eq!(config.stream.download_dir, None);
        assert_eq!(config.stream.min_candidate_file_size, 100 * MIB);
        assert_eq!(config.stream.tail_buffer_bytes, 10 * MIB);
        assert_eq!(config.stream.head_buffer_fraction, 0.005);
        assert_eq!(config.stream.playback_start_timeout, Duration::from_secs(20));
        assert_eq!(config.search.backend_timeout, Duration::from_secs(4));
        assert_eq!(config.search.tracker_timeout, Duration::from_secs(3));
        assert_eq!(config.search.fallback_trackers.len(), 4);
        assert_eq!(config.network.encryption, EncryptionPolicy::Enabled);
    }

    #[test]
    fn test_torrent_cache_is_per_process() {
        let storage = StorageConfig::default();
        let dir = storage.torrent_cache_dir.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(dir, format!("undertow-torrents-{}", std::process::id()));
        assert!(storage.torrent_cache_dir.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn test_low_power_timeout() {
        let mut search = SearchConfig::default();
        assert_eq!(search.effective_backend_timeout(), Duration::from_secs(4));
        search.low_power = true;
        assert_eq!(search.effective_backend_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_testing_preset() {
        let config = UndertowConfig::for_testing();
        assert!(config.stream.download_dir.is_some());
        assert_eq!(config.stream.min_buffer_bytes, 5 * MIB);
        assert_eq!(config.simulation.deterministic_seed, Some(42));
        assert!(config.search.fallback_trackers.is_empty());
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("UNDERTOW_DOWNLOAD_DIR", "/tmp/undertow-dl");
            std::env::set_var("UNDERTOW_MAX_DOWNLOAD_RATE", "1048576");
            std::env::set_var("UNDERTOW_LIMIT_AFTER_BUFFERING", "true");
            std::env::set_var("UNDERTOW_TRACKER_TIMEOUT", "7");
            std::env::set_var("UNDERTOW_LOW_POWER", "1");
        }

        let config = UndertowConfig::from_env();

        assert_eq!(
            config.stream.download_dir,
            Some(PathBuf::from("/tmp/undertow-dl"))
        );
        assert_eq!(config.stream.max_download_rate, Some(1048576));
        assert!(config.stream.limit_after_buffering);
        assert_eq!(config.search.tracker_timeout, Duration::from_secs(7));
        assert!(config.search.low_power);

        // Cleanup
        unsafe {
            std::env::remove_var("UNDERTOW_DOWNLOAD_DIR");
            std::env::remove_var("UNDERTOW_MAX_DOWNLOAD_RATE");
            std::env::remove_var("UNDERTOW_LIMIT_AFTER_BUFFERING");
            std::env::remove_var("UNDERTOW_TRACKER_TIMEOUT");
            std::env::remove_var("UNDERTOW_LOW_POWER");
        }
    }
}
