//! CLI command definitions and dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use crate::output;
use hookwork_plugin::{PluginAdmin, PluginError, PluginManager, PluginSystemConfig};

/// Hookwork: manage directory-based plugins
#[derive(Debug, Parser)]
#[command(name = "hookwork-admin", version, about, long_about = None)]
pub struct Cli {
    /// Plugin directory (overrides PLUGIN_DIR)
    #[arg(long, global = true)]
    pub plugin_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List every discovered plugin
    List,
    /// Show one plugin's manifest
    Show { name: String },
    /// Enable a plugin
    Enable { name: String },
    /// Disable a plugin
    Disable { name: String },
    /// Merge settings into a plugin's config
    Config {
        name: String,
        /// Setting as KEY=VALUE; VALUE is parsed as JSON, else taken as a string
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_setting, required = true)]
        settings: Vec<(String, Value)>,
    },
    /// Install a plugin from a source directory
    Install { source: PathBuf },
    /// Remove a plugin and its files
    Uninstall { name: String },
    /// List entry points of enabled plugins
    Providers,
}

impl Cli {
    /// Execute the CLI command. `Ok(false)` means the operation was refused.
    pub async fn execute(&self) -> Result<bool, PluginError> {
        let mut config = PluginSystemConfig::from_env();
        if let Some(dir) = &self.plugin_dir {
            config = config.with_plugin_dir(dir);
        }
        tracing::debug!(plugin_dir = %config.plugin_dir.display(), "using plugin directory");

        let manager = Arc::new(PluginManager::new(config));
        manager.discover_plugins().await?;
        let admin = PluginAdmin::new(manager);

        let success = match &self.command {
            Commands::List => output::print_response(&admin.list().await),
            Commands::Show { name } => output::print_response(&admin.show(name).await),
            Commands::Enable { name } => output::print_response(&admin.enable(name).await),
            Commands::Disable { name } => output::print_response(&admin.disable(name).await),
            Commands::Config { name, settings } => {
                let updates: Map<String, Value> = settings.iter().cloned().collect();
                output::print_response(&admin.update_config(name, updates).await)
            }
            Commands::Install { source } => output::print_response(&admin.install(source).await),
            Commands::Uninstall { name } => output::print_response(&admin.uninstall(name).await),
            Commands::Providers => output::print_response(&admin.providers().await),
        };

        Ok(success)
    }
}

/// Parse `KEY=VALUE`, reading VALUE as JSON when it is valid JSON.
fn parse_setting(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
