//! Configuration management
//!
//! Everything is read from the environment (after loading `.env` when present)
//! on top of the `DEFAULT_*` constants below.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::db::DbConfig;

// ============================================================================
// Fetch Defaults
// ============================================================================

/// Attempts per logical request before giving up on transient failures.
pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay; doubles on every further attempt.
pub const DEFAULT_FETCH_BASE_DELAY_MS: u64 = 300;

/// Ceiling for the exponential backoff.
pub const DEFAULT_FETCH_MAX_DELAY_MS: u64 = 5_000;

/// Per-request timeout.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_USER_AGENT: &str = "jobfeed/0.1 (internship aggregator)";

// ============================================================================
// Ingestion Defaults
// ============================================================================

/// Concurrent detail fetches per batch.
pub const DEFAULT_BATCH_WIDTH: usize = 4;

/// Pause between detail batches of the same page.
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1_100;

/// Pause after each listing page request.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 1_000;

// ============================================================================
// Source Defaults
// ============================================================================

pub const DEFAULT_HH_BASE_URL: &str = "https://api.hh.ru";
/// Yekaterinburg
pub const DEFAULT_HH_AREA: &str = "3";
pub const DEFAULT_HH_QUERY: &str = "стажер OR стажировка OR internship";
pub const DEFAULT_HH_PAGE_SIZE: u32 = 50;

pub const DEFAULT_TRUDVSEM_BASE_URL: &str = "http://opendata.trudvsem.ru/api/v1";
/// Sverdlovsk region
pub const DEFAULT_TRUDVSEM_REGION: &str = "6600000000000";
pub const DEFAULT_TRUDVSEM_QUERY: &str = "стажировка";
pub const DEFAULT_TRUDVSEM_PAGE_SIZE: u32 = 100;

// ============================================================================
// Misc Defaults
// ============================================================================

pub const DEFAULT_SESSION_TTL_SECS: u64 = 3_600;

pub const DEFAULT_PURGE_DAYS: i32 = 7;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(skip)]
    pub database: DbConfig,
    pub fetch: FetchConfig,
    pub ingest: IngestConfig,
    pub sources: SourcesConfig,
    pub sessions: SessionConfig,
    pub retention: RetentionConfig,
}

/// HTTP fetch behaviour shared by every adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
    /// Egress proxies rotated on 403; empty means direct connections
    pub proxies: Vec<String>,
    pub user_agent: String,
}

/// Scheduling of a single source run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub batch_width: usize,
    pub batch_delay_ms: u64,
    pub page_delay_ms: u64,
    /// Safety cap on pages per run; `None` follows the source's own accounting
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub hh: HhConfig,
    pub trudvsem: TrudvsemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HhConfig {
    pub base_url: String,
    pub area: String,
    pub query: String,
    pub page_size: u32,
    /// Sent as `HH-User-Agent` on every request
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrudvsemConfig {
    pub base_url: String,
    pub region: String,
    pub query: String,
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub purge_days: i32,
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from `.env`, the environment, and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database: DbConfig::from_env()?,
            fetch: FetchConfig::from_env(),
            ingest: IngestConfig::from_env(),
            sources: SourcesConfig::from_env(),
            sessions: SessionConfig {
                ttl_secs: env_parse("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS),
            },
            retention: RetentionConfig {
                purge_days: env_parse("PURGE_DAYS", DEFAULT_PURGE_DAYS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("DB_MAX_CONNECTIONS must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "DB_MIN_CONNECTIONS ({}) cannot be greater than DB_MAX_CONNECTIONS ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        self.fetch.validate()?;
        self.ingest.validate()?;

        if self.sources.hh.page_size == 0 || self.sources.trudvsem.page_size == 0 {
            anyhow::bail!("Source page sizes must be greater than 0");
        }

        reqwest::header::HeaderValue::from_str(&self.sources.hh.user_agent)
            .map_err(|e| anyhow::anyhow!("Invalid HH_USER_AGENT: {}", e))?;

        if self.retention.purge_days < 0 {
            anyhow::bail!("PURGE_DAYS cannot be negative");
        }

        Ok(())
    }
}

impl FetchConfig {
    pub fn from_env() -> Self {
        Self {
            max_attempts: env_parse("FETCH_MAX_ATTEMPTS", DEFAULT_FETCH_MAX_ATTEMPTS),
            base_delay_ms: env_parse("FETCH_BASE_DELAY_MS", DEFAULT_FETCH_BASE_DELAY_MS),
            max_delay_ms: env_parse("FETCH_MAX_DELAY_MS", DEFAULT_FETCH_MAX_DELAY_MS),
            timeout_secs: env_parse("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS),
            proxies: std::env::var("FETCH_PROXIES")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            user_agent: env_string("FETCH_USER_AGENT", DEFAULT_USER_AGENT),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("FETCH_MAX_ATTEMPTS must be greater than 0");
        }

        if self.base_delay_ms > self.max_delay_ms {
            anyhow::bail!(
                "FETCH_BASE_DELAY_MS ({}) cannot exceed FETCH_MAX_DELAY_MS ({})",
                self.base_delay_ms,
                self.max_delay_ms
            );
        }

        if self.timeout_secs == 0 {
            anyhow::bail!("FETCH_TIMEOUT_SECS must be greater than 0");
        }

        for proxy in &self.proxies {
            url::Url::parse(proxy)
                .map_err(|e| anyhow::anyhow!("Invalid proxy URL '{}': {}", proxy, e))?;
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_FETCH_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_FETCH_MAX_DELAY_MS,
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            proxies: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self {
            batch_width: env_parse("INGEST_BATCH_WIDTH", DEFAULT_BATCH_WIDTH),
            batch_delay_ms: env_parse("INGEST_BATCH_DELAY_MS", DEFAULT_BATCH_DELAY_MS),
            page_delay_ms: env_parse("INGEST_PAGE_DELAY_MS", DEFAULT_PAGE_DELAY_MS),
            max_pages: std::env::var("INGEST_MAX_PAGES")
                .ok()
                .and_then(|s| s.trim().parse().ok()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_width == 0 {
            anyhow::bail!("INGEST_BATCH_WIDTH must be greater than 0");
        }

        if self.max_pages == Some(0) {
            anyhow::bail!("INGEST_MAX_PAGES must be greater than 0 when set");
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_width: DEFAULT_BATCH_WIDTH,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            page_delay_ms: DEFAULT_PAGE_DELAY_MS,
            max_pages: None,
        }
    }
}

impl SourcesConfig {
    pub fn from_env() -> Self {
        Self {
            hh: HhConfig {
                base_url: env_string("HH_BASE_URL", DEFAULT_HH_BASE_URL),
                area: env_string("HH_AREA", DEFAULT_HH_AREA),
                query: env_string("HH_QUERY", DEFAULT_HH_QUERY),
                page_size: env_parse("HH_PAGE_SIZE", DEFAULT_HH_PAGE_SIZE),
                user_agent: env_string("HH_USER_AGENT", DEFAULT_USER_AGENT),
            },
            trudvsem: TrudvsemConfig {
                base_url: env_string("TRUDVSEM_BASE_URL", DEFAULT_TRUDVSEM_BASE_URL),
                region: env_string("TRUDVSEM_REGION", DEFAULT_TRUDVSEM_REGION),
                query: env_string("TRUDVSEM_QUERY", DEFAULT_TRUDVSEM_QUERY),
                page_size: env_parse("TRUDVSEM_PAGE_SIZE", DEFAULT_TRUDVSEM_PAGE_SIZE),
            },
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            hh: HhConfig {
                base_url: DEFAULT_HH_BASE_URL.to_string(),
                area: DEFAULT_HH_AREA.to_string(),
                query: DEFAULT_HH_QUERY.to_string(),
                page_size: DEFAULT_HH_PAGE_SIZE,
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            trudvsem: TrudvsemConfig {
                base_url: DEFAULT_TRUDVSEM_BASE_URL.to_string(),
                region: DEFAULT_TRUDVSEM_REGION.to_string(),
                query: DEFAULT_TRUDVSEM_QUERY.to_string(),
                page_size: DEFAULT_TRUDVSEM_PAGE_SIZE,
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DbConfig::default(),
            fetch: FetchConfig::default(),
            ingest: IngestConfig::default(),
            sources: SourcesConfig::default(),
            sessions: SessionConfig {
                ttl_secs: DEFAULT_SESSION_TTL_SECS,
            },
            retention: RetentionConfig {
                purge_days: DEFAULT_PURGE_DAYS,
            },
        }
    }
}
