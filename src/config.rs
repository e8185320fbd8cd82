use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, ScrapeError};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_log_config")]
    pub log_config: String,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// One-time password, only for accounts with two-factor login enabled
    #[serde(default)]
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Sustained request rate shared by every task of a crawl
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Requests admitted back-to-back before the rate applies
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Timeout for HTTP requests in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient failures on idempotent requests
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    /// Concurrent fetch-and-extract workers per crawl
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Login attempts, each with a fresh captcha
    #[serde(default = "default_login_attempts")]
    pub login_attempts: usize,

    /// Download jacket images along with song data
    #[serde(default = "default_false")]
    pub fetch_cover_art: bool,

    /// Also pull DANCERUSH STARDOM data for the account
    #[serde(default = "default_false")]
    pub dancerush: bool,
}

fn default_database_path() -> String { "eagate.db".to_string() }
fn default_log_config() -> String { "log4rs.yml".to_string() }
fn default_false() -> bool { false }
fn default_requests_per_second() -> u32 { 5 }
fn default_burst() -> u32 { 3 }
fn default_timeout() -> u64 { 30 }
fn default_max_retries() -> usize { 2 }
fn default_initial_retry_delay() -> u64 { 500 }
fn default_max_retry_delay() -> u64 { 8000 }
fn default_workers() -> usize { 16 }
fn default_login_attempts() -> usize { 3 }

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            burst: 3,
            timeout_secs: 30,
            max_retries: 2,
            initial_retry_delay_ms: 500,
            max_retry_delay_ms: 8000,
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            login_attempts: 3,
            fetch_cover_art: false,
            dancerush: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_config: default_log_config(),
            account: AccountConfig::default(),
            transport: TransportConfig::default(),
            crawl: CrawlConfig::default(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to
    /// defaults when it is missing, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_from(Path::new("config.toml"))?;
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::warn!("{} not found, using default configuration", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Config>(content).map_err(|e| ScrapeError::Config(e.to_string()))
    }

    fn apply_env(&mut self) {
        if let Ok(username) = std::env::var("EAGATE_USERNAME") {
            self.account.username = username;
        }
        if let Ok(password) = std::env::var("EAGATE_PASSWORD") {
            self.account.password = password;
        }
        if let Ok(otp) = std::env::var("EAGATE_OTP") {
            self.account.otp = Some(otp).filter(|o| !o.is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.account.username.trim().is_empty() {
            return Err(ScrapeError::Config("account.username is required".into()));
        }
        if self.transport.requests_per_second == 0 || self.transport.burst == 0 {
            return Err(ScrapeError::Config(
                "transport.requests_per_second and transport.burst must be positive".into(),
            ));
        }
        if self.crawl.workers == 0 {
            return Err(ScrapeError::Config("crawl.workers must be positive".into()));
        }
        Ok(())
    }
}

impl TransportConfig {
    /// Create the rate-limited transport described by this configuration
    pub fn create_transport(&self) -> Result<crate::http_client::RateLimitedTransport> {
        crate::http_client::RateLimitedTransport::with_config(self.clone())
    }
}
