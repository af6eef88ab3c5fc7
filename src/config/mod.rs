use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Detail-page HTTP fetching
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Size of the detail fetch worker pool.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Scripted browser used for listing discovery
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    /// Items the listing renders per "load more" step.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_click_timeout_ms")]
    pub click_timeout_ms: u64,

    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    #[serde(default = "default_max_scroll_rounds")]
    pub max_scroll_rounds: usize,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default)]
    pub executable: Option<PathBuf>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Job coordination
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Scraped records accumulated before a write to storage.
    #[serde(default = "default_flush_size")]
    pub flush_size: usize,

    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// HTTP API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_per_page")]
    pub default_per_page: usize,
}

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BrowserConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn click_timeout(&self) -> Duration {
        Duration::from_millis(self.click_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://www.imdb.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}
fn default_concurrency() -> usize {
    10
}
fn default_page_size() -> usize {
    50
}
fn default_settle_ms() -> u64 {
    1000
}
fn default_click_timeout_ms() -> u64 {
    3000
}
fn default_navigation_timeout_secs() -> u64 {
    30
}
fn default_max_scroll_rounds() -> usize {
    200
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/movies.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_flush_size() -> usize {
    2
}
fn default_limit() -> usize {
    50
}
fn default_queue_capacity() -> usize {
    64
}
fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_per_page() -> usize {
    10
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            settle_ms: default_settle_ms(),
            click_timeout_ms: default_click_timeout_ms(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            max_scroll_rounds: default_max_scroll_rounds(),
            headless: true,
            executable: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flush_size: default_flush_size(),
            default_limit: default_limit(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            default_per_page: default_per_page(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("MOVIE_SCRAPER").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Invalid configuration ({}), using defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}
