//! Plugin host: resolves entry points of enabled plugins and boots them.
//!
//! A plugin's manifest names an entry point by identifier. The host keeps
//! an [`EntryPointTable`] mapping identifiers to factories, so a plugin can
//! only run code the host binary was built with.
//!
//! Boot is two-phase: every resolved entry point's `register` runs before
//! any `boot`, so a plugin's `boot` can rely on hooks registered by the
//! others.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CallbackError, PluginError};
use crate::hooks::HookRegistry;
use crate::manager::PluginManager;
use crate::manifest::PluginDescriptor;

// ─── Entry points ───────────────────────────────────────────────────────

/// Code a plugin contributes to the host.
pub trait PluginEntryPoint: Send + Sync {
    /// Register hooks and filters. Runs for every plugin before any `boot`.
    fn register(&self, ctx: &PluginContext) -> Result<(), CallbackError>;

    /// Finish start-up once every plugin has registered.
    fn boot(&self, _ctx: &PluginContext) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// What an entry point gets to see of the host.
#[derive(Clone)]
pub struct PluginContext {
    descriptor: PluginDescriptor,
    hooks: Arc<HookRegistry>,
}

impl PluginContext {
    pub fn new(descriptor: PluginDescriptor, hooks: Arc<HookRegistry>) -> Self {
        Self { descriptor, hooks }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// The plugin's own `config` object from its manifest.
    pub fn config(&self) -> &Map<String, Value> {
        &self.descriptor.config
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}

type EntryPointFactory = Box<dyn Fn() -> Box<dyn PluginEntryPoint> + Send + Sync>;

/// Entry-point identifier → factory.
#[derive(Default)]
pub struct EntryPointTable {
    factories: HashMap<String, EntryPointFactory>,
}

impl EntryPointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `id`, replacing any previous one.
    pub fn register<F, E>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> E + Send + Sync + 'static,
        E: PluginEntryPoint + 'static,
    {
        self.factories.insert(
            id.into(),
            Box::new(move || Box::new(factory()) as Box<dyn PluginEntryPoint>),
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Instantiate the entry point registered under `id`.
    pub fn resolve(&self, id: &str) -> Result<Box<dyn PluginEntryPoint>, PluginError> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| PluginError::NotFound(format!("entry point '{id}'")))
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for EntryPointTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPointTable")
            .field("ids", &self.ids())
            .finish()
    }
}

// ─── Host ───────────────────────────────────────────────────────────────

/// An entry point that returned an error during boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootFailure {
    pub plugin: String,
    pub error: String,
}

/// Outcome of [`PluginHost::boot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootReport {
    /// Plugins whose `register` and `boot` both succeeded.
    pub booted: Vec<String>,
    /// Plugins whose entry point identifier is not in the table.
    pub unresolved: Vec<String>,
    pub failed: Vec<BootFailure>,
}

pub struct PluginHost {
    manager: Arc<PluginManager>,
    hooks: Arc<HookRegistry>,
    entry_points: EntryPointTable,
}

impl PluginHost {
    pub fn new(
        manager: Arc<PluginManager>,
        hooks: Arc<HookRegistry>,
        entry_points: EntryPointTable,
    ) -> Self {
        Self {
            manager,
            hooks,
            entry_points,
        }
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Discover plugins (if enabled) and run the entry points of every
    /// enabled plugin that declares one.
    ///
    /// A failing entry point is logged and reported; it does not stop the
    /// others. Only discovery errors on the plugin root are returned.
    pub async fn boot(&self) -> Result<BootReport, PluginError> {
        let config = self.manager.config();
        if config.auto_discovery {
            self.manager.discover_plugins().await?;
        }

        let mut report = BootReport::default();
        let mut resolved = Vec::new();
        for descriptor in self.manager.get_enabled_plugins().await {
            let Some(id) = descriptor.entry_point.clone() else {
                continue;
            };
            match self.entry_points.resolve(&id) {
                Ok(entry_point) => {
                    let ctx = PluginContext::new(descriptor, self.hooks.clone());
                    resolved.push((ctx, entry_point));
                }
                Err(_) => {
                    tracing::warn!(
                        plugin_name = %descriptor.name,
                        entry_point = %id,
                        "plugin entry point is not known to this host"
                    );
                    report.unresolved.push(descriptor.name);
                }
            }
        }

        if !config.hooks_enabled {
            tracing::info!(
                skipped = resolved.len(),
                "hooks disabled, plugin entry points not run"
            );
            return Ok(report);
        }

        let mut registered = Vec::with_capacity(resolved.len());
        for (ctx, entry_point) in resolved {
            match entry_point.register(&ctx) {
                Ok(()) => registered.push((ctx, entry_point)),
                Err(e) => report.failed.push(failure(&ctx, "register", e)),
            }
        }

        for (ctx, entry_point) in registered {
            match entry_point.boot(&ctx) {
                Ok(()) => {
                    tracing::info!(plugin_name = %ctx.name(), "plugin booted");
                    report.booted.push(ctx.descriptor.name);
                }
                Err(e) => report.failed.push(failure(&ctx, "boot", e)),
            }
        }

        tracing::info!(
            booted = report.booted.len(),
            unresolved = report.unresolved.len(),
            failed = report.failed.len(),
            "plugin host booted"
        );

        Ok(report)
    }
}

fn failure(ctx: &PluginContext, phase: &str, err: CallbackError) -> BootFailure {
    tracing::error!(
        plugin_name = %ctx.name(),
        phase = %phase,
        error = %err,
        "plugin entry point failed"
    );
    BootFailure {
        plugin: ctx.name().to_string(),
        error: format!("{phase} failed: {err}"),
    }
}

impl fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHost")
            .field("manager", &self.manager)
            .field("hooks", &self.hooks)
            .field("entry_points", &self.entry_points)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginSystemConfig;
    use crate::hooks::{filter, DEFAULT_PRIORITY};
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;

    /// Appends `[name]` to `content.render`, reading its suffix from config.
    struct Signature;

    impl PluginEntryPoint for Signature {
        fn register(&self, ctx: &PluginContext) -> Result<(), CallbackError> {
            let suffix = ctx
                .config()
                .get("suffix")
                .and_then(Value::as_str)
                .unwrap_or(ctx.name())
                .to_string();
            ctx.hooks().add_filter(
                "content.render",
                filter(move |value, _| {
                    Ok(json!(format!("{}[{suffix}]", value.as_str().unwrap_or_default())))
                }),
                DEFAULT_PRIORITY,
            );
            Ok(())
        }
    }

    /// Records which phase ran for which plugin.
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl PluginEntryPoint for Recorder {
        fn register(&self, ctx: &PluginContext) -> Result<(), CallbackError> {
            self.0.lock().unwrap().push(format!("register:{}", ctx.name()));
            Ok(())
        }

        fn boot(&self, ctx: &PluginContext) -> Result<(), CallbackError> {
            self.0.lock().unwrap().push(format!("boot:{}", ctx.name()));
            Ok(())
        }
    }

    struct Broken;

    impl PluginEntryPoint for Broken {
        fn register(&self, _ctx: &PluginContext) -> Result<(), CallbackError> {
            Err("missing database table".into())
        }
    }

    async fn write_plugin(root: &Path, name: &str, entry_point: Option<&str>, enabled: bool) {
        let dir = root.join(name);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let manifest = json!({
            "name": name,
            "version": "1.0.0",
            "description": "test",
            "enabled": enabled,
            "entryPoint": entry_point,
            "config": { "suffix": name.to_uppercase() },
        });
        tokio::fs::write(dir.join("plugin.json"), manifest.to_string())
            .await
            .unwrap();
    }

    fn host(root: &Path, config: PluginSystemConfig, table: EntryPointTable) -> PluginHost {
        let manager = Arc::new(PluginManager::new(config.with_plugin_dir(root)));
        PluginHost::new(manager, Arc::new(HookRegistry::new()), table)
    }

    #[test]
    fn test_table_resolve_unknown() {
        let table = EntryPointTable::new();
        let err = table.resolve("nope").err().unwrap();
        assert!(matches!(err, PluginError::NotFound(_)));
    }

    #[test]
    fn test_table_ids_sorted() {
        let mut table = EntryPointTable::new();
        table.register("b::provider", || Signature);
        table.register("a::provider", || Signature);
        assert!(table.contains("a::provider"));
        assert_eq!(table.ids(), vec!["a::provider", "b::provider"]);
    }

    #[tokio::test]
    async fn test_boot_registers_hooks_from_entry_points() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "alpha", Some("sig"), true).await;
        write_plugin(tmp.path(), "beta", Some("sig"), true).await;
        write_plugin(tmp.path(), "off", Some("sig"), false).await;
        write_plugin(tmp.path(), "plain", None, true).await;

        let mut table = EntryPointTable::new();
        table.register("sig", || Signature);
        let host = host(tmp.path(), PluginSystemConfig::default(), table);

        let report = host.boot().await.unwrap();
        assert_eq!(report.booted, vec!["alpha", "beta"]);
        assert!(report.unresolved.is_empty());
        assert!(report.failed.is_empty());

        let out = host
            .hooks()
            .apply_filters("content.render", json!("post"), &[])
            .unwrap();
        assert_eq!(out, json!("post[ALPHA][BETA]"));
    }

    #[tokio::test]
    async fn test_boot_runs_register_before_boot() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "one", Some("rec"), true).await;
        write_plugin(tmp.path(), "two", Some("rec"), true).await;

        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = log.clone();
        let mut table = EntryPointTable::new();
        table.register("rec", move || Recorder(shared.clone()));

        host(tmp.path(), PluginSystemConfig::default(), table)
            .boot()
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["register:one", "register:two", "boot:one", "boot:two"]
        );
    }

    #[tokio::test]
    async fn test_boot_reports_unresolved_and_failed() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "broken", Some("broken"), true).await;
        write_plugin(tmp.path(), "good", Some("sig"), true).await;
        write_plugin(tmp.path(), "stranger", Some("who::knows"), true).await;

        let mut table = EntryPointTable::new();
        table.register("sig", || Signature);
        table.register("broken", || Broken);

        let report = host(tmp.path(), PluginSystemConfig::default(), table)
            .boot()
            .await
            .unwrap();

        assert_eq!(report.booted, vec!["good"]);
        assert_eq!(report.unresolved, vec!["stranger"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].plugin, "broken");
        assert!(report.failed[0].error.contains("missing database table"));
    }

    #[tokio::test]
    async fn test_boot_with_hooks_disabled_runs_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "alpha", Some("sig"), true).await;

        let mut table = EntryPointTable::new();
        table.register("sig", || Signature);
        let config = PluginSystemConfig {
            hooks_enabled: false,
            ..PluginSystemConfig::default()
        };
        let host = host(tmp.path(), config, table);

        let report = host.boot().await.unwrap();
        assert!(report.booted.is_empty());
        assert!(!host.hooks().has_filter("content.render"));
        assert_eq!(host.manager().get_plugins().await.len(), 1);
    }

    #[tokio::test]
    async fn test_boot_without_auto_discovery_skips_scan() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "alpha", Some("sig"), true).await;

        let mut table = EntryPointTable::new();
        table.register("sig", || Signature);
        let config = PluginSystemConfig {
            auto_discovery: false,
            ..PluginSystemConfig::default()
        };
        let host = host(tmp.path(), config, table);

        let report = host.boot().await.unwrap();
        assert_eq!(report, BootReport::default());

        host.manager().discover_plugins().await.unwrap();
        let report = host.boot().await.unwrap();
        assert_eq!(report.booted, vec!["alpha"]);
    }
}
