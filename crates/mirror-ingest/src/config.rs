//! Ingest configuration
//!
//! Defaults below target the public e621 hosts; every field can be
//! overridden through a `MIRROR_*` environment variable (a `.env` file is
//! honoured) and then again by command-line flags.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Metadata API queried for deleted items.
pub const DEFAULT_API_BASE_URL: &str = "https://e621.net";

/// Content host serving sharded preview images.
pub const DEFAULT_STATIC_BASE_URL: &str = "https://static1.e621.net";

/// Directory listing of the daily catalog exports.
pub const DEFAULT_EXPORT_BASE_URL: &str = "https://e621.net/db_export";

/// Product token of the User-Agent; a contact is appended when configured.
pub const DEFAULT_USER_AGENT: &str = concat!("IQDBMirror/", env!("CARGO_PKG_VERSION"));

/// Concurrent fetch/fingerprint/submit tasks
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Completions between two checkpoint flushes.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 100;

/// Hard limit on identifiers per metadata query.
pub const MAX_RESOLVE_BATCH_SIZE: usize = 100;

pub const DEFAULT_COMPLETION_QUEUE_CAPACITY: usize = 100;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// One attempt means no retry.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 1;

pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// File name of the checkpoint inside the system temp directory.
pub const DEFAULT_CHECKPOINT_FILE: &str = "iqdb-mirror-export-state";

/// What the orchestrator does when a single item fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run on the first failed item
    #[default]
    Abort,
    /// Count the failure, leave the item out of the checkpoint, keep going
    Skip,
}

impl std::str::FromStr for FailurePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "skip" => Ok(FailurePolicy::Skip),
            _ => Err(IngestError::config(format!("Invalid failure policy: {}", s))),
        }
    }
}

/// Metadata API credentials (basic auth)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    #[serde(skip_serializing)]
    pub api_key: String,
}

impl Credentials {
    /// Both halves are required; either one missing disables resolution
    pub fn from_parts(user: Option<String>, api_key: Option<String>) -> Option<Self> {
        match (user, api_key) {
            (Some(user), Some(api_key)) => Some(Self { user, api_key }),
            _ => None,
        }
    }
}

/// Bounded exponential backoff for fetch and submit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: base * 2^(attempt - 1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Main ingest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Base URL of the indexing service; mandatory
    pub index_url: String,
    pub api_base_url: String,
    pub static_base_url: String,
    pub export_base_url: String,
    pub user_agent: String,
    /// Operator contact (site username or email) sent in the User-Agent
    pub user_agent_contact: Option<String>,
    /// Deleted items are only resolved when credentials are present
    pub credentials: Option<Credentials>,
    pub pool_size: usize,
    pub checkpoint_interval: usize,
    pub resolve_batch_size: usize,
    pub completion_queue_capacity: usize,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
    pub checkpoint_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            index_url: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            static_base_url: DEFAULT_STATIC_BASE_URL.to_string(),
            export_base_url: DEFAULT_EXPORT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            user_agent_contact: None,
            credentials: None,
            pool_size: DEFAULT_POOL_SIZE,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            resolve_batch_size: MAX_RESOLVE_BATCH_SIZE,
            completion_queue_capacity: DEFAULT_COMPLETION_QUEUE_CAPACITY,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::default(),
            checkpoint_path: std::env::temp_dir().join(DEFAULT_CHECKPOINT_FILE),
        }
    }
}

impl IngestConfig {
    /// Create a configuration for the given index with defaults elsewhere
    pub fn new(index_url: impl Into<String>) -> Self {
        Self {
            index_url: index_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables and defaults
    ///
    /// Does not validate: the index URL is usually supplied afterwards on the
    /// command line.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(url) = std::env::var("MIRROR_INDEX_URL") {
            config.index_url = url;
        }
        if let Ok(url) = std::env::var("MIRROR_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Ok(url) = std::env::var("MIRROR_STATIC_BASE_URL") {
            config.static_base_url = url;
        }
        if let Ok(url) = std::env::var("MIRROR_EXPORT_BASE_URL") {
            config.export_base_url = url;
        }
        if let Ok(agent) = std::env::var("MIRROR_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Ok(contact) = std::env::var("MIRROR_USER_AGENT_CONTACT") {
            config.user_agent_contact = Some(contact);
        }
        config.credentials = Credentials::from_parts(
            std::env::var("MIRROR_API_USER").ok(),
            std::env::var("MIRROR_API_KEY").ok(),
        );
        config.pool_size = env_parse("MIRROR_POOL_SIZE", config.pool_size)?;
        config.checkpoint_interval =
            env_parse("MIRROR_CHECKPOINT_INTERVAL", config.checkpoint_interval)?;
        config.resolve_batch_size =
            env_parse("MIRROR_RESOLVE_BATCH_SIZE", config.resolve_batch_size)?;
        config.connect_timeout_secs =
            env_parse("MIRROR_CONNECT_TIMEOUT", config.connect_timeout_secs)?;
        config.request_timeout_secs =
            env_parse("MIRROR_REQUEST_TIMEOUT", config.request_timeout_secs)?;
        config.retry.max_attempts = env_parse("MIRROR_RETRY_ATTEMPTS", config.retry.max_attempts)?;
        config.retry.base_delay_ms = env_parse("MIRROR_RETRY_DELAY_MS", config.retry.base_delay_ms)?;
        if let Ok(policy) = std::env::var("MIRROR_FAILURE_POLICY") {
            config.failure_policy = policy.parse()?;
        }
        if let Ok(path) = std::env::var("MIRROR_CHECKPOINT_PATH") {
            config.checkpoint_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("index", &self.index_url),
            ("metadata API", &self.api_base_url),
            ("static content", &self.static_base_url),
            ("export", &self.export_base_url),
        ] {
            if url.trim().is_empty() {
                return Err(IngestError::config(format!("The {} base URL cannot be empty", name)));
            }
        }

        if self.pool_size == 0 {
            return Err(IngestError::config("pool_size must be greater than 0"));
        }

        if self.checkpoint_interval == 0 {
            return Err(IngestError::config("checkpoint_interval must be greater than 0"));
        }

        if self.resolve_batch_size == 0 || self.resolve_batch_size > MAX_RESOLVE_BATCH_SIZE {
            return Err(IngestError::config(format!(
                "resolve_batch_size must be between 1 and {} (got {})",
                MAX_RESOLVE_BATCH_SIZE, self.resolve_batch_size
            )));
        }

        if self.completion_queue_capacity == 0 {
            return Err(IngestError::config("completion_queue_capacity must be greater than 0"));
        }

        if self.retry.max_attempts == 0 {
            return Err(IngestError::config("retry.max_attempts must be at least 1"));
        }

        if let Some(contact) = &self.user_agent_contact {
            if contact.chars().any(|c| c.is_control() || c == '(' || c == ')') {
                return Err(IngestError::config(format!(
                    "user_agent_contact cannot contain parentheses or control characters: {:?}",
                    contact
                )));
            }
        }

        if self.credentials.is_none() {
            tracing::debug!("No API credentials configured - deleted items will not be resolved");
        }

        Ok(())
    }

    /// User-Agent header value, e.g. `IQDBMirror/0.1.0 (someuser)`
    pub fn user_agent_header(&self) -> String {
        match self.user_agent_contact.as_deref().map(str::trim) {
            Some(contact) if !contact.is_empty() => format!("{} ({})", self.user_agent, contact),
            _ => self.user_agent.clone(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IngestError::config(format!("Invalid {}={:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}
