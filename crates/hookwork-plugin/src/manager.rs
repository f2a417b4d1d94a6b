//! Plugin lifecycle manager: discovery, enable/disable, install, uninstall.
//!
//! The plugin directory on disk is the source of truth. Every state change
//! rewrites the plugin's manifest first and only then updates the in-memory
//! registry, so the registry can always be rebuilt by running discovery
//! again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::config::PluginSystemConfig;
use crate::error::PluginError;
use crate::manifest::{self, PluginDescriptor};
use crate::registry::PluginRegistry;

/// Prefix of the hidden directories installs are staged in.
const STAGING_PREFIX: &str = ".install-";

// ─── Helpers ────────────────────────────────────────────────────────────

/// Recursively copy a directory and its contents.
async fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), PluginError> {
    tokio::fs::create_dir_all(dest).await.map_err(|e| {
        PluginError::Installation(format!("failed to create dir {}: {e}", dest.display()))
    })?;

    let mut entries = tokio::fs::read_dir(src).await.map_err(|e| {
        PluginError::Installation(format!("failed to read dir {}: {e}", src.display()))
    })?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PluginError::Installation(format!("failed to read dir entry: {e}")))?
    {
        let entry_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry.file_type().await.map_err(|e| {
            PluginError::Installation(format!("failed to stat {}: {e}", entry_path.display()))
        })?;

        if file_type.is_dir() {
            Box::pin(copy_dir_recursive(&entry_path, &dest_path)).await?;
        } else if file_type.is_symlink()
            && tokio::fs::metadata(&entry_path)
                .await
                .is_ok_and(|meta| meta.is_dir())
        {
            // Links to directories are left out. Links to files are copied
            // as regular files; a dangling link fails the copy below.
            tracing::warn!(path = %entry_path.display(), "skipping symlinked directory");
        } else {
            tokio::fs::copy(&entry_path, &dest_path)
                .await
                .map_err(|e| {
                    PluginError::Installation(format!(
                        "failed to copy {}: {e}",
                        entry_path.display()
                    ))
                })?;
        }
    }

    Ok(())
}

/// Declared dependencies of `descriptor` that are not in `registry`.
fn missing_dependencies(registry: &PluginRegistry, descriptor: &PluginDescriptor) -> Vec<String> {
    descriptor
        .dependencies
        .iter()
        .filter(|dep| !registry.contains(dep))
        .cloned()
        .collect()
}

/// Held while one plugin name is being mutated.
///
/// Dropping it releases the name's mutex and forgets the mutex once no other
/// task holds or waits on it, so the lock table only tracks names in use.
struct NameGuard<'a> {
    locks: &'a std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.name);
        }
    }
}

// ─── Manager ────────────────────────────────────────────────────────────

/// Owns the plugin registry and keeps it in step with the plugin directory.
///
/// Reads share the registry lock; mutations of one plugin name are
/// serialized through a per-name mutex so concurrent toggles cannot lose
/// updates. The registry lock is never held across filesystem I/O.
pub struct PluginManager {
    config: PluginSystemConfig,
    registry: RwLock<PluginRegistry>,
    /// Plugin name → mutex serializing mutations of that plugin.
    name_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PluginManager {
    pub fn new(config: PluginSystemConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(PluginRegistry::new()),
            name_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PluginSystemConfig {
        &self.config
    }

    /// Root directory holding one subdirectory per plugin.
    pub fn plugin_dir(&self) -> &Path {
        &self.config.plugin_dir
    }

    /// Serialize mutations of `name` until the returned guard drops.
    async fn lock_name(&self, name: &str) -> NameGuard<'_> {
        let lock = {
            let mut locks = self
                .name_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks.entry(name.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        NameGuard {
            locks: &self.name_locks,
            name: name.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_name_locks(&self) -> usize {
        self.name_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn plugin_path(&self, name: &str) -> Option<PathBuf> {
        self.registry.read().await.get(name).map(|d| d.path.clone())
    }

    // ── Discovery ───────────────────────────────────────────────────

    /// Scan the plugin directory and register every plugin not yet known.
    ///
    /// A missing root is created and yields an empty registry. Hidden
    /// entries and plain files are ignored. A subdirectory whose manifest
    /// is missing, invalid, or names a different plugin is logged and
    /// skipped. Plugins already registered keep their in-memory state.
    ///
    /// Returns every registered plugin in discovery order.
    pub async fn discover_plugins(&self) -> Result<Vec<PluginDescriptor>, PluginError> {
        let root = self.plugin_dir();
        tokio::fs::create_dir_all(root).await?;

        let mut candidates = Vec::new();
        let mut entries = tokio::fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "skipping non-utf8 plugin directory");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_dir() => candidates.push((name, entry.path())),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                }
            }
        }
        candidates.sort();

        let mut discovered = Vec::new();
        for (name, dir) in candidates {
            let _guard = self.lock_name(&name).await;

            if self.registry.read().await.contains(&name) {
                continue;
            }

            let descriptor = match manifest::read_manifest(&dir).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(
                        plugin_dir = %dir.display(),
                        error = %e,
                        "skipping plugin with unusable manifest"
                    );
                    continue;
                }
            };

            if descriptor.name != name {
                tracing::warn!(
                    plugin_dir = %dir.display(),
                    manifest_name = %descriptor.name,
                    "skipping plugin whose manifest name does not match its directory"
                );
                continue;
            }

            if !descriptor.has_semver_version() {
                tracing::debug!(
                    plugin_name = %name,
                    version = %descriptor.version,
                    "plugin version is not semver"
                );
            }

            tracing::info!(
                plugin_name = %name,
                version = %descriptor.version,
                enabled = descriptor.enabled,
                "plugin discovered"
            );
            self.registry.write().await.insert(descriptor);
            discovered.push(name);
        }

        let registry = self.registry.read().await;
        for name in &discovered {
            if let Some(descriptor) = registry.get(name) {
                let missing = missing_dependencies(&registry, descriptor);
                if !missing.is_empty() {
                    tracing::warn!(
                        plugin_name = %name,
                        missing = ?missing,
                        "plugin declares dependencies that are not installed"
                    );
                }
            }
        }

        Ok(registry.iter().cloned().collect())
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub async fn get_plugin(&self, name: &str) -> Option<PluginDescriptor> {
        self.registry.read().await.get(name).cloned()
    }

    /// All registered plugins in discovery order.
    pub async fn get_plugins(&self) -> Vec<PluginDescriptor> {
        self.registry.read().await.iter().cloned().collect()
    }

    pub async fn get_enabled_plugins(&self) -> Vec<PluginDescriptor> {
        self.registry.read().await.enabled().cloned().collect()
    }

    /// Entry-point identifiers of enabled plugins that declare one,
    /// in discovery order.
    pub async fn get_service_providers(&self) -> Vec<String> {
        self.registry
            .read()
            .await
            .enabled()
            .filter_map(|d| d.entry_point.clone())
            .collect()
    }

    /// Declared dependencies of `name` that are not registered.
    ///
    /// Returns `None` for an unknown plugin.
    pub async fn unmet_dependencies(&self, name: &str) -> Option<Vec<String>> {
        let registry = self.registry.read().await;
        let descriptor = registry.get(name)?;
        Some(missing_dependencies(&registry, descriptor))
    }

    // ── State changes ───────────────────────────────────────────────

    /// Enable a plugin. Returns `Ok(false)` if the name is not registered.
    pub async fn enable_plugin(&self, name: &str) -> Result<bool, PluginError> {
        self.set_enabled(name, true).await
    }

    /// Disable a plugin. Returns `Ok(false)` if the name is not registered.
    pub async fn disable_plugin(&self, name: &str) -> Result<bool, PluginError> {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, PluginError> {
        let updated = self
            .rewrite_manifest(name, |d| d.enabled = enabled)
            .await?;
        if updated.is_some() {
            if enabled {
                tracing::info!(plugin_name = %name, "plugin enabled");
            } else {
                tracing::info!(plugin_name = %name, "plugin disabled");
            }
        }
        Ok(updated.is_some())
    }

    /// Merge `updates` into the plugin's `config` object and persist it.
    ///
    /// Keys in `updates` overwrite existing keys; other keys are kept.
    /// Returns `Ok(false)` if the name is not registered.
    pub async fn update_plugin_config(
        &self,
        name: &str,
        updates: Map<String, Value>,
    ) -> Result<bool, PluginError> {
        let keys: Vec<String> = updates.keys().cloned().collect();
        let updated = self
            .rewrite_manifest(name, move |d| d.config.extend(updates))
            .await?;
        if updated.is_some() {
            tracing::info!(plugin_name = %name, keys = ?keys, "plugin config updated");
        }
        Ok(updated.is_some())
    }

    /// Read-modify-write the manifest of a registered plugin, then refresh
    /// its registry entry. `None` means the plugin is not registered.
    ///
    /// A manifest that now names a different plugin is left untouched on
    /// disk and reported as invalid.
    async fn rewrite_manifest<F>(
        &self,
        name: &str,
        mutate: F,
    ) -> Result<Option<PluginDescriptor>, PluginError>
    where
        F: FnOnce(&mut PluginDescriptor),
    {
        let _guard = self.lock_name(name).await;

        let Some(dir) = self.plugin_path(name).await else {
            return Ok(None);
        };

        let updated = manifest::update_manifest(&dir, |d| {
            if d.name != name {
                return Err(PluginError::InvalidManifest(format!(
                    "manifest in {} now names '{}', expected '{name}'",
                    dir.display(),
                    d.name
                )));
            }
            mutate(d);
            Ok(())
        })
        .await?;

        self.registry.write().await.replace(updated.clone());
        Ok(Some(updated))
    }

    // ── Install / uninstall ─────────────────────────────────────────

    /// Install the plugin found in `source` into the plugin directory.
    ///
    /// The source tree is copied into a hidden staging directory inside the
    /// plugin root and renamed into place only once the copy is complete.
    /// On any failure the staging directory is removed and nothing is
    /// registered.
    pub async fn install_plugin(&self, source: &Path) -> Result<PluginDescriptor, PluginError> {
        tracing::info!(source = %source.display(), "starting plugin installation");

        let candidate = manifest::read_manifest(source).await?;
        manifest::validate_plugin_name(&candidate.name)?;
        if !self.config.is_author_allowed(&candidate.author) {
            return Err(PluginError::AuthorNotAllowed(candidate.author));
        }

        let name = candidate.name;
        let _guard = self.lock_name(&name).await;

        if self.registry.read().await.contains(&name) {
            return Err(PluginError::AlreadyExists(name));
        }

        let root = self.plugin_dir();
        let target = root.join(&name);
        if tokio::fs::try_exists(&target).await? {
            return Err(PluginError::AlreadyExists(name));
        }

        tokio::fs::create_dir_all(root).await?;
        let canonical_root = tokio::fs::canonicalize(root).await?;
        let canonical_source = tokio::fs::canonicalize(source).await?;
        if canonical_root.starts_with(&canonical_source) {
            return Err(PluginError::Installation(format!(
                "source {} contains the plugin directory",
                source.display()
            )));
        }

        // Dropping the TempDir removes the staging tree on every early return.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)
            .map_err(|e| PluginError::Installation(format!("failed to create staging dir: {e}")))?;

        copy_dir_recursive(source, staging.path()).await?;

        tokio::fs::rename(staging.path(), &target)
            .await
            .map_err(|e| {
                PluginError::Installation(format!(
                    "failed to move plugin into {}: {e}",
                    target.display()
                ))
            })?;
        drop(staging);

        let installed = match manifest::read_manifest(&target).await {
            Ok(d) => d,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&target).await;
                return Err(e);
            }
        };

        self.registry.write().await.insert(installed.clone());

        tracing::info!(
            plugin_name = %installed.name,
            version = %installed.version,
            path = %target.display(),
            "plugin installed successfully"
        );

        Ok(installed)
    }

    /// Delete a plugin's directory and forget it.
    ///
    /// Returns `Ok(false)` if the name is not registered. A directory that is
    /// already gone is not an error.
    pub async fn uninstall_plugin(&self, name: &str) -> Result<bool, PluginError> {
        let _guard = self.lock_name(name).await;

        let Some(dir) = self.plugin_path(name).await else {
            return Ok(false);
        };

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(plugin_name = %name, "plugin directory already removed");
            }
            Err(e) => {
                return Err(PluginError::Installation(format!(
                    "failed to remove plugin files: {e}"
                )));
            }
        }

        self.registry.write().await.remove(name);

        tracing::info!(plugin_name = %name, path = %dir.display(), "plugin uninstalled");

        Ok(true)
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
