//! Runtime configuration.
//!
//! Loaded from `<config dir>/chatrelay/config.yaml` when present, with
//! sensible defaults otherwise; a handful of environment variables override
//! file values, and CLI flags override both (applied in `main`).

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub chat: ChatDefaults,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit Chrome/Chromium binary; auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
    /// DevTools websocket of an already-running browser to attach to.
    pub ws_url: Option<String>,
    /// Profile directory; a stable one keeps the chat login alive.
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
}

/// Per-request defaults mirroring the original settings panel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChatDefaults {
    pub auto_login: bool,
    pub email: String,
    pub password: String,
    /// Force deep-reasoning mode on for every request.
    pub deepthink: bool,
    /// Force web-search mode on for every request.
    pub search: bool,
    /// Deliver prompts as attached text files instead of pasting.
    pub text_file_delivery: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_secs: 180,
        }
    }
}

impl Config {
    pub async fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("chatrelay");
                path.push("config.yaml");
                path
            }
        };

        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(&path)
                .await
                .context("Failed to read config file")?;
            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;
            info!("Loaded configuration from: {}", path.display());
            config
        } else {
            warn!("Config file not found, using defaults: {}", path.display());
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = env::var("CHATRELAY_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring non-numeric CHATRELAY_PORT: {port}"),
            }
        }
        if let Ok(ws_url) = env::var("CHATRELAY_WS_URL") {
            if !ws_url.trim().is_empty() {
                self.browser.ws_url = Some(ws_url);
            }
        }
        if let Ok(headless) = env::var("CHATRELAY_HEADLESS") {
            if let Ok(value) = headless.parse::<bool>() {
                self.browser.headless = value;
            }
        }
    }
}
