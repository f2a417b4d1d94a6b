//! Plugin system error types.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Error returned by a hook or filter callback.
///
/// Dispatch hands it back to the caller exactly as the callback produced it.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("manifest not found: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("author not allowed: {0}")]
    AuthorNotAllowed(String),

    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("plugin already exists: {0}")]
    AlreadyExists(String),

    #[error("installation error: {0}")]
    Installation(String),

    #[error("callback error: {0}")]
    Callback(#[source] CallbackError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`PluginError`].
///
/// Lets an outer layer (HTTP handler, CLI) choose a status without
/// matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Io,
    Callback,
}

impl PluginError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidManifest(_) | Self::ManifestMissing(_) | Self::AuthorNotAllowed(_) => {
                ErrorKind::Validation
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::Conflict,
            Self::Installation(_) | Self::Io(_) | Self::Serialization(_) => ErrorKind::Io,
            Self::Callback(_) => ErrorKind::Callback,
        }
    }
}

impl From<CallbackError> for PluginError {
    fn from(err: CallbackError) -> Self {
        Self::Callback(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    // ── Display messages ──────────────────────────────────────────────

    #[test]
    fn test_display_invalid_manifest() {
        let err = PluginError::InvalidManifest("missing field 'version'".into());
        assert_eq!(
            err.to_string(),
            "invalid manifest: missing field 'version'"
        );
    }

    #[test]
    fn test_display_manifest_missing() {
        let err = PluginError::ManifestMissing(PathBuf::from("/tmp/demo/plugin.json"));
        assert_eq!(
            err.to_string(),
            "manifest not found: /tmp/demo/plugin.json"
        );
    }

    #[test]
    fn test_display_not_found() {
        let err = PluginError::NotFound("my-plugin".into());
        assert_eq!(err.to_string(), "plugin not found: my-plugin");
    }

    #[test]
    fn test_display_already_exists() {
        let err = PluginError::AlreadyExists("my-plugin".into());
        assert_eq!(err.to_string(), "plugin already exists: my-plugin");
    }

    #[test]
    fn test_display_author_not_allowed() {
        let err = PluginError::AuthorNotAllowed("mallory".into());
        assert_eq!(err.to_string(), "author not allowed: mallory");
    }

    // ── Kinds ─────────────────────────────────────────────────────────

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            PluginError::InvalidManifest("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            PluginError::ManifestMissing(PathBuf::from("x")).kind(),
            ErrorKind::Validation
        );
        assert_eq!(PluginError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            PluginError::AlreadyExists("x".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            PluginError::Installation("x".into()).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            PluginError::Callback("boom".into()).kind(),
            ErrorKind::Callback
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }

    // ── From conversions ──────────────────────────────────────────────

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let err: PluginError = io_err.into();
        assert!(matches!(err, PluginError::Io(_)));
        assert!(err.to_string().contains("file missing"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("bad json{{{").unwrap_err();
        let err: PluginError = json_err.into();
        assert!(matches!(err, PluginError::Serialization(_)));
    }

    #[test]
    fn test_from_callback_error_keeps_source() {
        use std::error::Error;
        let cb: CallbackError = "render failed".into();
        let err: PluginError = cb.into();
        assert!(matches!(err, PluginError::Callback(_)));
        assert_eq!(err.source().unwrap().to_string(), "render failed");
    }

    #[test]
    fn test_error_source_string_variants() {
        use std::error::Error;
        let err = PluginError::NotFound("demo".into());
        assert!(err.source().is_none());
    }
}
