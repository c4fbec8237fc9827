// Settings File Support
//
// This module provides the settings store for wireview: the server URL, the
// custom headers sent with every message, and logging options.
// Supports TOML format with environment variable overrides.
// Settings are loaded from the XDG config directory: ~/.config/wireview/config.toml

use crate::mcp::Session;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// MCP server endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Headers added to every outgoing message
    pub custom_headers: BTreeMap<String, String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be parsed.
    /// If the file does not exist, returns default settings.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// result (after environment overrides) fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file from {:?}", path))?;
            let settings: Settings = toml::from_str(&content)
                .with_context(|| format!("Failed to parse settings file from {:?}", path))?;
            tracing::debug!("Loaded settings from {:?}", path);
            settings
        } else {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            Self::default()
        };

        let settings = settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Write the settings to `path`, creating parent directories
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings file to {:?}", path))?;

        tracing::info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Get the default settings file path
    ///
    /// Returns `~/.config/wireview/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "wireview", "wireview") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            // Fallback if XDG dirs cannot be determined
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("wireview")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the settings
    ///
    /// Environment variables take precedence over file values:
    /// - WIREVIEW_SERVER_URL
    /// - WIREVIEW_LOG_LEVEL
    /// - WIREVIEW_LOG_FORMAT
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("WIREVIEW_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server_url = Some(url);
            }
        }
        if let Ok(level) = std::env::var("WIREVIEW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("WIREVIEW_LOG_FORMAT") {
            self.logging.format = format;
        }
        self
    }

    /// Validate the settings
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or a logging option is unknown.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.server_url {
            validate_url(url)?;
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }

    /// Push the settings into a session
    ///
    /// Connects when a URL is configured and always replaces the custom
    /// headers, so headers removed from the settings stop being sent.
    pub fn apply(&self, session: &mut Session) {
        if let Some(url) = self.server_url.as_deref().filter(|u| !u.trim().is_empty()) {
            session.connect(url);
        }
        session.set_custom_headers(self.custom_headers.clone());
    }
}

/// Check that `url` is an absolute URL
pub fn validate_url(url: &str) -> Result<()> {
    reqwest::Url::parse(url).with_context(|| format!("Invalid server URL: {}", url))?;
    Ok(())
}

/// Parse a header set typed by the user
///
/// An empty (or whitespace) string means "no headers". Otherwise the text must
/// be a JSON object whose values are all strings.
pub fn parse_headers_json(text: &str) -> Result<BTreeMap<String, String>> {
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let value: serde_json::Value =
        serde_json::from_str(text).context("Invalid JSON format")?;
    let object = value
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("Headers must be a JSON object"))?;

    object
        .iter()
        .map(|(name, value)| match value.as_str() {
            Some(v) => Ok((name.clone(), v.to_string())),
            None => anyhow::bail!("All header values must be strings (header '{}')", name),
        })
        .collect()
}
