//! Hookwork Plugin System
//!
//! Directory-based plugins described by a `plugin.json` manifest, plus a
//! named hook registry for extending host behavior. Plugins are discovered
//! under a plugin root, enabled or disabled by rewriting their manifest,
//! installed from a source tree and uninstalled by removing their directory.
//! Enabled plugins contribute code through entry points the host resolves
//! from an explicit table.

pub mod admin;
pub mod config;
pub mod error;
pub mod hooks;
pub mod host;
pub mod manager;
pub mod manifest;
pub mod registry;

pub use admin::{AdminResponse, PluginAdmin};
pub use config::PluginSystemConfig;
pub use error::{CallbackError, ErrorKind, PluginError};
pub use hooks::{
    action, filter, ActionCallback, FilterCallback, HookRegistry, DEFAULT_PRIORITY,
};
pub use host::{
    BootFailure, BootReport, EntryPointTable, PluginContext, PluginEntryPoint, PluginHost,
};
pub use manager::PluginManager;
pub use manifest::{PluginDescriptor, MANIFEST_FILE};
pub use registry::PluginRegistry;
