//! # Observability
//!
//! Tracing subscriber setup.
//!
//! Logs go to stderr: Argo CD reads the rendered manifests from stdout and only
//! shows stderr when a plugin command fails.

use crate::config::PluginConfig;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured log level.
pub fn init_tracing(config: &PluginConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    // A subscriber may already be installed when running under a test harness
    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already initialized: {e}");
    }
}

fn default_directive(level: &str) -> String {
    let level = match level.to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" => "warn",
        _ => "error",
    };
    format!("strongbox_plugin={level},argocd_strongbox_plugin={level}")
}
