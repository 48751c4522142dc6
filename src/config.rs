//! Configuration types for channel-archiver

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level archiver configuration
///
/// Every field has a default, so an empty JSON object (or no file at all)
/// yields a working configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root of the archive tree; each channel gets `<output_root>/<channel_id>/`
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Selection (cursor) file. Defaults to `<output_root>/last_selection.json`
    #[serde(default)]
    pub selection_file: Option<PathBuf>,

    /// Credentials/session file (default: "./config.json")
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    /// Page fetching behaviour
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Download scheduler behaviour
    #[serde(default)]
    pub download: DownloadConfig,

    /// Page-level retry policy (connect, page fetch, page processing)
    #[serde(default)]
    pub retry: RetryConfig,

    /// Retry policy for a single download batch
    #[serde(default = "default_download_retry")]
    pub download_retry: RetryConfig,

    /// Per-channel retry policy used by the batch orchestrator
    #[serde(default)]
    pub channel_retry: RetryConfig,

    /// Options handed to the protocol client factory
    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            selection_file: None,
            session_file: default_session_file(),
            fetch: FetchConfig::default(),
            download: DownloadConfig::default(),
            retry: RetryConfig::default(),
            download_retry: default_download_retry(),
            channel_retry: RetryConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a JSON file
    ///
    /// A missing file is not an error; defaults are returned instead.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file without validating it
    ///
    /// For callers that adjust settings before calling [`Config::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::file(path, e)),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_parallel == 0 {
            return Err(Error::config(
                "max_parallel must be at least 1",
                "download.max_parallel",
            ));
        }
        if self.fetch.message_limit == 0 {
            return Err(Error::config(
                "message_limit must be at least 1",
                "fetch.message_limit",
            ));
        }
        Ok(())
    }

    /// Resolved path of the selection (cursor) file
    pub fn selection_path(&self) -> PathBuf {
        self.selection_file
            .clone()
            .unwrap_or_else(|| self.output_root.join("last_selection.json"))
    }
}

/// Page fetching configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Messages requested per page (default: 100)
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,

    /// Pause between consecutive pages (default: 1 second)
    #[serde(default = "default_page_delay", with = "duration_serde")]
    pub page_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
            page_delay: default_page_delay(),
        }
    }
}

/// Download scheduler configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum transfers in flight at once (default: 5)
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Pause after every full batch (default: 3 seconds)
    #[serde(default = "default_cool_down", with = "duration_serde")]
    pub cool_down: Duration,

    /// Deadline for one batch; expiry counts as a transient failure (default: 300 seconds)
    #[serde(default = "default_batch_timeout", with = "duration_serde")]
    pub batch_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            cool_down: default_cool_down(),
            batch_timeout: default_batch_timeout(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 3 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Cap on any single delay (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Connection options passed through to the protocol client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection attempts the client makes internally (default: 10)
    #[serde(default = "default_connection_retries")]
    pub connection_retries: u32,

    /// Connection establishment timeout (default: 60 seconds)
    #[serde(default = "default_connection_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Delay between internal connection retries (default: 5 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,

    /// Keep-alive ping interval (default: 120 seconds)
    #[serde(default = "default_ping_interval", with = "duration_serde")]
    pub ping_interval: Duration,

    /// Keep-alive ping timeout (default: 30 seconds)
    #[serde(default = "default_ping_timeout", with = "duration_serde")]
    pub ping_timeout: Duration,

    /// Delay before an automatic reconnect (default: 3 seconds)
    #[serde(default = "default_reconnect_delay", with = "duration_serde")]
    pub reconnect_delay: Duration,

    /// Let the client reconnect on its own after a drop (default: true)
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_retries: default_connection_retries(),
            connection_timeout: default_connection_timeout(),
            retry_delay: default_retry_delay(),
            ping_interval: default_ping_interval(),
            ping_timeout: default_ping_timeout(),
            reconnect_delay: default_reconnect_delay(),
            auto_reconnect: true,
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("./export")
}

fn default_session_file() -> PathBuf {
    PathBuf::from("./config.json")
}

fn default_message_limit() -> usize {
    100
}

fn default_page_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_parallel() -> usize {
    5
}

fn default_cool_down() -> Duration {
    Duration::from_secs(3)
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_download_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(2),
        backoff_multiplier: 1.0,
        jitter: false,
    }
}

fn default_connection_retries() -> u32 {
    10
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(120)
}

fn default_ping_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_true() -> bool {
    true
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
