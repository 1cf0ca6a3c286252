//! # Errors
//!
//! Error type shared by every plugin component.
//!
//! Each variant carries the entity it concerns (secret coordinates, file path,
//! tool name) so the fully wrapped message printed at exit is enough for an
//! operator to act on. Nothing is retried; Argo CD re-runs the plugin.

use std::path::PathBuf;
use thiserror::Error;

/// Broad classification of a [`PluginError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    ContentSafety,
    Parse,
    Config,
    ExternalTool,
    Io,
    SecretStore,
    Decryption,
    Cancelled,
}

impl ErrorKind {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::ContentSafety => "content-safety",
            ErrorKind::Parse => "parse",
            ErrorKind::Config => "config",
            ErrorKind::ExternalTool => "external-tool",
            ErrorKind::Io => "io",
            ErrorKind::SecretStore => "secret-store",
            ErrorKind::Decryption => "decryption",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unable to get secret {namespace}/{name}: not found")]
    NotFound { namespace: String, name: String },

    #[error(
        "secret \"{namespace}/{name}\" cannot be used in namespace \"{working_namespace}\", \
         the destination namespace must be listed in the '{annotation}' annotation"
    )]
    Forbidden {
        namespace: String,
        name: String,
        working_namespace: String,
        annotation: String,
    },

    #[error("{subject} has encrypted data for the key {key}")]
    ContentSafety { subject: String, key: String },

    #[error("unable to parse {}: line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{0}")]
    Config(String),

    #[error("error running {tool}: {output}")]
    ExternalTool { tool: String, output: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to get secret {namespace}/{name}: {message}")]
    SecretStore {
        namespace: String,
        name: String,
        message: String,
    },

    #[error("unable to decrypt {}: {message}", path.display())]
    Decryption { path: PathBuf, message: String },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },
}

impl PluginError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PluginError::NotFound { .. } => ErrorKind::NotFound,
            PluginError::Forbidden { .. } => ErrorKind::Forbidden,
            PluginError::ContentSafety { .. } => ErrorKind::ContentSafety,
            PluginError::Parse { .. } => ErrorKind::Parse,
            PluginError::Config(_) => ErrorKind::Config,
            PluginError::ExternalTool { .. } => ErrorKind::ExternalTool,
            PluginError::Io { .. } => ErrorKind::Io,
            PluginError::SecretStore { .. } => ErrorKind::SecretStore,
            PluginError::Decryption { .. } => ErrorKind::Decryption,
            PluginError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PluginError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = PluginError> = std::result::Result<T, E>;

/// Attach context to raw `std::io` failures
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| PluginError::io(f(), source))
    }
}
