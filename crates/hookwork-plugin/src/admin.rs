//! Administrative operations with structured responses.
//!
//! Each operation maps to one [`PluginManager`] call and never returns an
//! error: failures become an [`AdminResponse`] with `success == false` and
//! an [`ErrorKind`] a web layer or CLI can turn into a status.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ErrorKind, PluginError};
use crate::manager::PluginManager;
use crate::manifest::PluginDescriptor;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl<T> AdminResponse<T> {
    fn ok(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            error_kind: None,
        }
    }

    fn fail(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_kind: Some(kind),
        }
    }

    fn not_found(name: &str) -> Self {
        Self::fail(format!("Plugin '{name}' not found."), ErrorKind::NotFound)
    }

    fn error(action: &str, err: &PluginError) -> Self {
        Self::fail(
            format!("An error occurred while {action} the plugin: {err}"),
            err.kind(),
        )
    }

    /// HTTP status matching this response.
    pub fn status(&self) -> u16 {
        match self.error_kind {
            None => 200,
            Some(ErrorKind::Validation) => 400,
            Some(ErrorKind::NotFound) => 404,
            Some(ErrorKind::Conflict) => 409,
            Some(ErrorKind::Io) | Some(ErrorKind::Callback) => 500,
        }
    }
}

/// Admin facade over a shared [`PluginManager`].
#[derive(Debug, Clone)]
pub struct PluginAdmin {
    manager: Arc<PluginManager>,
}

impl PluginAdmin {
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    pub async fn list(&self) -> AdminResponse<Vec<PluginDescriptor>> {
        let plugins = self.manager.get_plugins().await;
        AdminResponse::ok(
            format!("{} plugin(s) registered.", plugins.len()),
            Some(plugins),
        )
    }

    pub async fn show(&self, name: &str) -> AdminResponse<PluginDescriptor> {
        match self.manager.get_plugin(name).await {
            Some(plugin) => AdminResponse::ok(format!("Plugin '{name}'."), Some(plugin)),
            None => AdminResponse::not_found(name),
        }
    }

    pub async fn enable(&self, name: &str) -> AdminResponse<()> {
        match self.manager.enable_plugin(name).await {
            Ok(true) => AdminResponse::ok(format!("Plugin '{name}' has been enabled."), None),
            Ok(false) => AdminResponse::not_found(name),
            Err(e) => {
                tracing::error!(plugin_name = %name, error = %e, "failed to enable plugin");
                AdminResponse::error("enabling", &e)
            }
        }
    }

    pub async fn disable(&self, name: &str) -> AdminResponse<()> {
        match self.manager.disable_plugin(name).await {
            Ok(true) => AdminResponse::ok(format!("Plugin '{name}' has been disabled."), None),
            Ok(false) => AdminResponse::not_found(name),
            Err(e) => {
                tracing::error!(plugin_name = %name, error = %e, "failed to disable plugin");
                AdminResponse::error("disabling", &e)
            }
        }
    }

    /// Merge `updates` into the plugin's config; responds with the new config.
    pub async fn update_config(
        &self,
        name: &str,
        updates: Map<String, Value>,
    ) -> AdminResponse<Map<String, Value>> {
        match self.manager.update_plugin_config(name, updates).await {
            Ok(true) => {
                let config = self.manager.get_plugin(name).await.map(|d| d.config);
                AdminResponse::ok(format!("Plugin '{name}' configuration updated."), config)
            }
            Ok(false) => AdminResponse::not_found(name),
            Err(e) => {
                tracing::error!(plugin_name = %name, error = %e, "failed to update plugin config");
                AdminResponse::error("configuring", &e)
            }
        }
    }

    pub async fn install(&self, source: &Path) -> AdminResponse<PluginDescriptor> {
        match self.manager.install_plugin(source).await {
            Ok(plugin) => AdminResponse::ok(
                format!("Plugin '{}' installed successfully.", plugin.name),
                Some(plugin),
            ),
            Err(e) => {
                tracing::error!(source = %source.display(), error = %e, "failed to install plugin");
                AdminResponse::error("installing", &e)
            }
        }
    }

    pub async fn uninstall(&self, name: &str) -> AdminResponse<()> {
        match self.manager.uninstall_plugin(name).await {
            Ok(true) => AdminResponse::ok(format!("Plugin '{name}' has been uninstalled."), None),
            Ok(false) => AdminResponse::not_found(name),
            Err(e) => {
                tracing::error!(plugin_name = %name, error = %e, "failed to uninstall plugin");
                AdminResponse::error("uninstalling", &e)
            }
        }
    }

    /// Entry points of enabled plugins.
    pub async fn providers(&self) -> AdminResponse<Vec<String>> {
        let providers = self.manager.get_service_providers().await;
        AdminResponse::ok(
            format!("{} service provider(s).", providers.len()),
            Some(providers),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginSystemConfig;
    use serde_json::json;

    async fn admin_with_demo(root: &Path) -> PluginAdmin {
        let dir = root.join("demo");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("plugin.json"),
            json!({
                "name": "demo",
                "version": "1.0.0",
                "description": "d",
                "entryPoint": "demo::provider"
            })
            .to_string(),
        )
        .await
        .unwrap();

        let manager = PluginManager::new(PluginSystemConfig::default().with_plugin_dir(root));
        manager.discover_plugins().await.unwrap();
        PluginAdmin::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn test_enable_disable_messages() {
        let tmp = tempfile::tempdir().unwrap();
        let admin = admin_with_demo(tmp.path()).await;

        let resp = admin.disable("demo").await;
        assert!(resp.success);
        assert_eq!(resp.message, "Plugin 'demo' has been disabled.");
        assert_eq!(resp.status(), 200);

        let resp = admin.enable("demo").await;
        assert!(resp.success);
        assert_eq!(resp.message, "Plugin 'demo' has been enabled.");
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let admin = admin_with_demo(tmp.path()).await;

        for resp in [
            admin.enable("ghost").await,
            admin.disable("ghost").await,
            admin.uninstall("ghost").await,
        ] {
            assert!(!resp.success);
            assert_eq!(resp.error_kind, Some(ErrorKind::NotFound));
            assert_eq!(resp.status(), 404);
        }

        let resp = admin.show("ghost").await;
        assert!(resp.data.is_none());
        assert_eq!(resp.message, "Plugin 'ghost' not found.");
    }

    #[tokio::test]
    async fn test_show_list_and_providers() {
        let tmp = tempfile::tempdir().unwrap();
        let admin = admin_with_demo(tmp.path()).await;

        let resp = admin.show("demo").await;
        assert_eq!(resp.data.unwrap().version, "1.0.0");

        let resp = admin.list().await;
        assert_eq!(resp.data.unwrap().len(), 1);

        let resp = admin.providers().await;
        assert_eq!(resp.data.unwrap(), vec!["demo::provider"]);
    }

    #[tokio::test]
    async fn test_update_config_returns_merged_config() {
        let tmp = tempfile::tempdir().unwrap();
        let admin = admin_with_demo(tmp.path()).await;

        let mut updates = Map::new();
        updates.insert("theme".into(), json!("dark"));
        let resp = admin.update_config("demo", updates).await;

        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["theme"], json!("dark"));
    }

    #[tokio::test]
    async fn test_install_failure_carries_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let admin = admin_with_demo(&tmp.path().join("plugins")).await;

        let resp = admin.install(&tmp.path().join("plugins/demo")).await;
        assert!(!resp.success);
        assert_eq!(resp.error_kind, Some(ErrorKind::Conflict));
        assert_eq!(resp.status(), 409);

        let resp = admin.install(&tmp.path().join("nowhere")).await;
        assert_eq!(resp.error_kind, Some(ErrorKind::Validation));
        assert!(resp.message.starts_with("An error occurred while installing"));
    }

    #[tokio::test]
    async fn test_uninstall_then_list() {
        let tmp = tempfile::tempdir().unwrap();
        let admin = admin_with_demo(tmp.path()).await;

        let resp = admin.uninstall("demo").await;
        assert_eq!(resp.message, "Plugin 'demo' has been uninstalled.");
        assert!(admin.list().await.data.unwrap().is_empty());
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let ok: AdminResponse<()> = AdminResponse::ok("done", None);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, json!({ "success": true, "message": "done" }));

        let fail: AdminResponse<()> = AdminResponse::fail("nope", ErrorKind::Conflict);
        let json = serde_json::to_value(&fail).unwrap();
        assert_eq!(json["error_kind"], json!("conflict"));
    }
}
