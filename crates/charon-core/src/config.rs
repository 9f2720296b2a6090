use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Result, anyhow};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const API_URL_ENV: &str = "CHARON_API_URL";

const DEFAULT_REVEAL_DELAY_MS: u64 = 30;
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_SEARCH_MIN_CHARS: usize = 2;
const DEFAULT_SEARCH_LIMIT: usize = 5;
const DEFAULT_HIGHLIGHT_MS: u64 = 2000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub streaming: Option<bool>,
    pub reveal_delay_ms: Option<u64>,
    pub search_debounce_ms: Option<u64>,
    pub search_min_chars: Option<usize>,
    pub search_limit: Option<usize>,
    pub highlight_ms: Option<u64>,
    pub language: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Fully resolved configuration handed to the controllers
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub streaming: bool,
    pub reveal_delay: Duration,
    pub search_debounce: Duration,
    pub search_min_chars: usize,
    pub search_limit: usize,
    pub highlight: Duration,
    pub language: Option<String>,
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Config::new().settings()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_url: Some(DEFAULT_API_URL.to_string()),
            streaming: Some(false),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    /// Load the config, writing the defaults out on first run so there is a
    /// file to edit.
    pub fn load_or_init() -> Result<Self> {
        if Self::get_config_path()?.exists() {
            return Self::load();
        }
        let config = Self::new();
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// Resolve defaults, letting `CHARON_API_URL` win over the file.
    pub fn settings(&self) -> Settings {
        let api_url = std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Settings {
            api_url: api_url.trim_end_matches('/').to_string(),
            streaming: self.streaming.unwrap_or(false),
            reveal_delay: Duration::from_millis(
                self.reveal_delay_ms.unwrap_or(DEFAULT_REVEAL_DELAY_MS),
            ),
            search_debounce: Duration::from_millis(
                self.search_debounce_ms.unwrap_or(DEFAULT_SEARCH_DEBOUNCE_MS),
            ),
            search_min_chars: self.search_min_chars.unwrap_or(DEFAULT_SEARCH_MIN_CHARS).max(1),
            search_limit: self.search_limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1),
            highlight: Duration::from_millis(self.highlight_ms.unwrap_or(DEFAULT_HIGHLIGHT_MS)),
            language: self.language.clone().filter(|lang| lang != "en"),
            request_timeout: Duration::from_secs(
                self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("charon"))
    }

    /// Directory for the persisted transcript and the log file
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("charon"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
