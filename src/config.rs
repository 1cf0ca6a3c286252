//! # Plugin Configuration
//!
//! Plugin-level settings loaded from environment variables.
//!
//! Argo CD runs the plugin inside the repo-server sidecar, so everything that is
//! not per-application comes from the sidecar's environment.

use crate::constants::{DEFAULT_ALLOWED_NAMESPACES_ANNOTATION, DEFAULT_KEY_MARKER};
use std::path::PathBuf;
use std::time::Duration;

/// Plugin-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Annotation on a secret listing namespaces allowed to read it cross-namespace
    pub allowed_namespaces_annotation: String,
    /// Marker token used in kustomization comments to reference an SSH key
    pub key_marker: String,
    /// strongbox binary (name looked up on PATH, or absolute path)
    pub strongbox_binary: PathBuf,
    /// kustomize binary (name looked up on PATH, or absolute path)
    pub kustomize_binary: PathBuf,
    /// Overall deadline for a single invocation (seconds), unset means no deadline
    pub timeout_secs: Option<u64>,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    /// Argo CD only surfaces plugin logs when a command fails, hence ERROR
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            allowed_namespaces_annotation: DEFAULT_ALLOWED_NAMESPACES_ANNOTATION.to_string(),
            key_marker: DEFAULT_KEY_MARKER.to_string(),
            strongbox_binary: PathBuf::from("strongbox"),
            kustomize_binary: PathBuf::from("kustomize"),
            timeout_secs: None,
            log_level: "ERROR".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl PluginConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            allowed_namespaces_annotation: env_var_or_default_str(
                "STRONGBOX_ALLOWED_NAMESPACES_ANNOTATION",
                DEFAULT_ALLOWED_NAMESPACES_ANNOTATION,
            ),
            key_marker: env_var_or_default_str("STRONGBOX_PLUGIN_KEY_MARKER", DEFAULT_KEY_MARKER),
            strongbox_binary: PathBuf::from(env_var_or_default_str(
                "STRONGBOX_BINARY",
                "strongbox",
            )),
            kustomize_binary: PathBuf::from(env_var_or_default_str(
                "KUSTOMIZE_BINARY",
                "kustomize",
            )),
            timeout_secs: std::env::var("STRONGBOX_PLUGIN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0),
            log_level: env_var_or_default_str("LOG_LEVEL", "ERROR"),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
        }
    }

    /// Get the invocation deadline, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PluginConfig::default();
        assert_eq!(
            config.allowed_namespaces_annotation,
            "argocd-strongbox.plugin.io/allowed-namespaces"
        );
        assert_eq!(config.key_marker, "argocd-strongbox-plugin");
        assert_eq!(config.strongbox_binary, PathBuf::from("strongbox"));
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_timeout_duration() {
        let config = PluginConfig {
            timeout_secs: Some(90),
            ..PluginConfig::default()
        };
        assert_eq!(config.timeout(), Some(Duration::from_secs(90)));
    }
}
