//! Plugin manifest parsing, validation and persistence.
//!
//! Every plugin directory carries a `plugin.json` describing the plugin.
//! Only `name`, `version` and `description` are required; everything else
//! defaults, and keys this crate does not know about are kept and written
//! back untouched.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::error::PluginError;

/// File name of the manifest inside a plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

/// In-memory form of a plugin manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Identifier the host resolves to run plugin-specific registration.
    #[serde(default)]
    pub entry_point: Option<String>,
    /// Older manifests name the entry point `service_provider`. Folded into
    /// `entry_point` by [`PluginDescriptor::parse`] and never written back.
    #[serde(default, rename = "service_provider", skip_serializing)]
    legacy_service_provider: Option<String>,
    /// Declared only; load order and presence are not enforced.
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requires: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub autoload: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub permissions: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hooks: Vec<Value>,
    /// Top-level keys not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Plugin directory. Derived from where the manifest was read, never persisted.
    #[serde(skip)]
    pub path: PathBuf,
}

fn default_enabled() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Validate a plugin name as kebab-case: `^[a-z][a-z0-9]*(-[a-z0-9]+)*$`,
/// at most 64 characters.
pub fn validate_plugin_name(name: &str) -> Result<(), PluginError> {
    let len = name.len();
    if !(1..=64).contains(&len) {
        return Err(PluginError::InvalidManifest(format!(
            "plugin name must be 1-64 characters, got {len}"
        )));
    }

    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(PluginError::InvalidManifest(format!(
            "plugin name must start with a lowercase letter: '{name}'"
        )));
    }

    if let Some(ch) = name
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
    {
        return Err(PluginError::InvalidManifest(format!(
            "plugin name contains invalid character '{ch}'"
        )));
    }

    if name.ends_with('-') || name.contains("--") {
        return Err(PluginError::InvalidManifest(format!(
            "plugin name is not kebab-case: '{name}'"
        )));
    }

    Ok(())
}

impl PluginDescriptor {
    /// Parse and validate a manifest from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, PluginError> {
        let mut descriptor: PluginDescriptor = serde_json::from_slice(bytes)
            .map_err(|e| PluginError::InvalidManifest(format!("malformed manifest: {e}")))?;
        // `entryPoint` wins when both keys are present.
        let legacy = descriptor.legacy_service_provider.take();
        if descriptor.entry_point.is_none() {
            descriptor.entry_point = legacy;
        }
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check that the required fields are present and non-empty.
    pub fn validate(&self) -> Result<(), PluginError> {
        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("description", &self.description),
        ] {
            if value.trim().is_empty() {
                return Err(PluginError::InvalidManifest(format!(
                    "missing required field '{field}'"
                )));
            }
        }
        Ok(())
    }

    /// Encode as pretty-printed JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PluginError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Whether `version` parses as semver. Versions are not required to.
    pub fn has_semver_version(&self) -> bool {
        semver::Version::parse(&self.version).is_ok()
    }

    /// Location of this plugin's manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.path)
    }
}

/// Location of the manifest inside `dir`.
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Read and parse the manifest of the plugin living in `dir`.
pub async fn read_manifest(dir: &Path) -> Result<PluginDescriptor, PluginError> {
    let path = manifest_path(dir);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PluginError::ManifestMissing(path));
        }
        Err(e) => return Err(e.into()),
    };

    let mut descriptor = PluginDescriptor::parse(&bytes)?;
    descriptor.path = dir.to_path_buf();
    Ok(descriptor)
}

/// Persist `descriptor` as the manifest of `dir`.
///
/// The bytes go to a temporary file in the same directory which is then
/// renamed over `plugin.json`, so readers see either the old or the new
/// manifest, never a partial one.
pub async fn write_manifest(dir: &Path, descriptor: &PluginDescriptor) -> Result<(), PluginError> {
    let bytes = descriptor.to_bytes()?;
    let tmp_path = dir.join(format!(".{MANIFEST_FILE}.{}.tmp", uuid::Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, manifest_path(dir)).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    Ok(())
}

/// Read-modify-write the manifest of `dir`, returning the stored descriptor.
///
/// If `mutate` fails nothing is written and its error is returned.
pub async fn update_manifest<F>(dir: &Path, mutate: F) -> Result<PluginDescriptor, PluginError>
where
    F: FnOnce(&mut PluginDescriptor) -> Result<(), PluginError>,
{
    let mut descriptor = read_manifest(dir).await?;
    mutate(&mut descriptor)?;
    descriptor.validate()?;
    write_manifest(dir, &descriptor).await?;
    Ok(descriptor)
}
