/// Tracker configuration
///
/// Defaults: 4 cards, 30 second refresh. Every field can be
/// overridden from the environment with `TrackerConfig::from_env`.
use std::path::PathBuf;
use std::time::Duration;

/// Maximum number of tracked symbols
pub const MAX_CARDS: usize = 4;
/// Refresh period in seconds
pub const REFRESH_SEC: u32 = 30;
/// Maximum number of catalog matches offered for a query
pub const SEARCH_LIMIT: usize = 30;
/// Storage key of the persisted tracked set
pub const STATE_KEY: &str = "oi_tracked";

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Tracker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Base URL of the metrics API (without trailing slash)
    pub api_url: String,
    /// Capacity of the tracked set
    pub max_cards: usize,
    /// Seconds between refresh cycles
    pub refresh_secs: u32,
    /// Maximum number of search matches
    pub search_limit: usize,
    /// Directory holding the persisted tracked set and the log file
    pub state_dir: PathBuf,
    /// Storage key (file stem) of the persisted tracked set
    pub state_key: String,
    /// Per-request timeout. None leaves requests unbounded.
    pub request_timeout: Option<Duration>,
    /// Log file. None disables logging.
    pub log_file: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let state_dir = default_state_dir();
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            max_cards: MAX_CARDS,
            refresh_secs: REFRESH_SEC,
            search_limit: SEARCH_LIMIT,
            log_file: Some(state_dir.join("oi-tracker.log")),
            state_dir,
            state_key: STATE_KEY.to_string(),
            request_timeout: None,
        }
    }
}

impl TrackerConfig {
    /// Create a new configuration with custom API URL
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::default().with_api_url(api_url)
    }

    /// Build configuration from environment variables, falling back to defaults
    ///
    /// - `OI_API_URL`
    /// - `OI_MAX_CARDS`
    /// - `OI_REFRESH_SEC`
    /// - `OI_SEARCH_LIMIT`
    /// - `OI_STATE_DIR`
    /// - `OI_REQUEST_TIMEOUT_SEC`
    /// - `OI_LOG_FILE`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("OI_API_URL") {
            config = config.with_api_url(url);
        }
        if let Some(max_cards) = env_parse::<usize>("OI_MAX_CARDS") {
            config = config.with_max_cards(max_cards);
        }
        if let Some(secs) = env_parse::<u32>("OI_REFRESH_SEC") {
            config = config.with_refresh_secs(secs);
        }
        if let Some(limit) = env_parse::<usize>("OI_SEARCH_LIMIT") {
            config = config.with_search_limit(limit);
        }
        if let Ok(dir) = std::env::var("OI_STATE_DIR") {
            config = config.with_state_dir(dir);
        }
        if let Some(secs) = env_parse::<u64>("OI_REQUEST_TIMEOUT_SEC") {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Ok(path) = std::env::var("OI_LOG_FILE") {
            config.log_file = Some(PathBuf::from(path));
        }

        config
    }

    /// Set API base URL
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set tracked set capacity (at least 1)
    pub fn with_max_cards(mut self, max_cards: usize) -> Self {
        self.max_cards = max_cards.max(1);
        self
    }

    /// Set refresh period in seconds (at least 1)
    pub fn with_refresh_secs(mut self, secs: u32) -> Self {
        self.refresh_secs = secs.max(1);
        self
    }

    /// Set search match limit (at least 1)
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    /// Set state directory. The log file follows it unless set explicitly.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if self.log_file == Some(self.state_dir.join("oi-tracker.log")) {
            self.log_file = Some(dir.join("oi-tracker.log"));
        }
        self.state_dir = dir;
        self
    }

    /// Set per-request timeout (zero disables it)
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Disable the log file
    pub fn without_log_file(mut self) -> Self {
        self.log_file = None;
        self
    }
}

/// Read and parse an env var, ignoring unparseable and zero values
fn env_parse<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .filter(|value| *value != T::default())
}

fn default_state_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("oi-tracker")
}
