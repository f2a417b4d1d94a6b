//! Plugin system configuration.

use std::path::PathBuf;

/// Default plugin root, relative to the working directory.
pub const DEFAULT_PLUGIN_DIR: &str = "plugins";

/// Configuration for the plugin system.
#[derive(Debug, Clone)]
pub struct PluginSystemConfig {
    /// Directory holding one subdirectory per plugin (default: `plugins`).
    pub plugin_dir: PathBuf,
    /// Run discovery when the host boots (default: true).
    pub auto_discovery: bool,
    /// Run entry-point registration so plugins can add hooks (default: true).
    pub hooks_enabled: bool,
    /// Authors allowed to be installed. Empty means every author is allowed.
    pub allowed_authors: Vec<String>,
}

impl Default for PluginSystemConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from(DEFAULT_PLUGIN_DIR),
            auto_discovery: true,
            hooks_enabled: true,
            allowed_authors: Vec::new(),
        }
    }
}

impl PluginSystemConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self {
            plugin_dir: std::env::var("PLUGIN_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_PLUGIN_DIR)),
            auto_discovery: env_flag("PLUGIN_AUTO_DISCOVERY", true),
            hooks_enabled: env_flag("PLUGIN_HOOKS_ENABLED", true),
            allowed_authors: std::env::var("PLUGIN_ALLOWED_AUTHORS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
        }
    }

    /// Use a specific plugin directory, keeping the other settings.
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    /// Whether `author` may be installed under the configured allow-list.
    pub fn is_author_allowed(&self, author: &str) -> bool {
        self.allowed_authors.is_empty() || self.allowed_authors.iter().any(|a| a == author)
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => parse_flag(&v).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
