use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Connection (can override CLI)
    pub api_base_url: Option<String>,
    pub request_timeout_sec: Option<u64>,

    // Client behaviour
    pub unread_poll_interval_sec: Option<u64>,
    pub token_path: Option<String>,
    pub feed_page_size: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
