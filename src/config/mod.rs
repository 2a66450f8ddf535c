mod file_config;

pub use file_config::FileConfig;

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 30;
pub const DEFAULT_UNREAD_POLL_INTERVAL_SEC: u64 = 30;
pub const DEFAULT_FEED_PAGE_SIZE: u32 = 12;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub api_base_url: String,
    pub request_timeout_sec: u64,
    pub unread_poll_interval_sec: u64,
    pub token_path: Option<PathBuf>,
    pub feed_page_size: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_sec: DEFAULT_REQUEST_TIMEOUT_SEC,
            unread_poll_interval_sec: DEFAULT_UNREAD_POLL_INTERVAL_SEC,
            token_path: None,
            feed_page_size: DEFAULT_FEED_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_sec: u64,
    pub unread_poll_interval_sec: u64,
    pub token_path: PathBuf,
    pub feed_page_size: u32,
}

impl ClientConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let api_base_url = file
            .api_base_url
            .unwrap_or_else(|| cli.api_base_url.clone());
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            bail!(
                "api_base_url must be an http(s) URL, got {:?}",
                api_base_url
            );
        }

        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        if request_timeout_sec == 0 {
            bail!("request_timeout_sec must be greater than zero");
        }

        let unread_poll_interval_sec = file
            .unread_poll_interval_sec
            .unwrap_or(cli.unread_poll_interval_sec);
        if unread_poll_interval_sec == 0 {
            bail!("unread_poll_interval_sec must be greater than zero");
        }

        let token_path = file
            .token_path
            .map(PathBuf::from)
            .or_else(|| cli.token_path.clone())
            .map_or_else(default_token_path, Ok)?;

        let feed_page_size = file.feed_page_size.unwrap_or(cli.feed_page_size).max(1);

        Ok(Self {
            api_base_url,
            request_timeout_sec,
            unread_poll_interval_sec,
            token_path,
            feed_page_size,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }

    pub fn unread_poll_interval(&self) -> Duration {
        Duration::from_secs(self.unread_poll_interval_sec)
    }
}

/// `$HOME/.techhub/token`
fn default_token_path() -> Result<PathBuf> {
    match std::env::var_os("HOME") {
        Some(home) => Ok(PathBuf::from(home).join(".techhub").join("token")),
        None => bail!("HOME is not set, pass --token-path or set token_path in the config file"),
    }
}
