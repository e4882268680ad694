use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for an `Engine`. Hard limits live in `crate::limits`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub journal_path: PathBuf,
    /// Appends after which the background compactor rewrites the journal.
    pub compact_threshold: u64,
    /// Upper bound on waiting for the store's write guard.
    pub lock_timeout: Duration,
    /// Reject slots whose start is not after the current time.
    pub require_future_start: bool,
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            journal_path: PathBuf::from("./data/slotbook.wal"),
            compact_threshold: 1000,
            lock_timeout: Duration::from_secs(5),
            require_future_start: true,
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    pub fn with_journal(path: impl Into<PathBuf>) -> Self {
        Self {
            journal_path: path.into(),
            ..Self::default()
        }
    }

    /// Read overrides from `SLOTBOOK_*` environment variables. Unset or unparsable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("SLOTBOOK_DATA_DIR") {
            config.journal_path = PathBuf::from(dir).join("slotbook.wal");
        }
        if let Some(n) = env_parse::<u64>("SLOTBOOK_COMPACT_THRESHOLD") {
            config.compact_threshold = n;
        }
        if let Some(ms) = env_parse::<u64>("SLOTBOOK_LOCK_TIMEOUT_MS") {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(b) = env_parse::<bool>("SLOTBOOK_REQUIRE_FUTURE_START") {
            config.require_future_start = b;
        }
        config.metrics_port = env_parse::<u16>("SLOTBOOK_METRICS_PORT");
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
