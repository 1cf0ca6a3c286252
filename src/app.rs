//! # Application Identity
//!
//! Types describing the Argo CD application being rendered and the secrets it
//! points at.

use std::fmt;

/// The tenant whose source tree is being processed
///
/// Immutable for the lifetime of one plugin invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationContext {
    pub name: String,
    pub destination_namespace: String,
}

impl ApplicationContext {
    pub fn new(name: impl Into<String>, destination_namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destination_namespace: destination_namespace.into(),
        }
    }
}

/// Pointer to a piece of key material stored in a Kubernetes secret
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretReference {
    /// Namespace override, `None` (or empty) means the application's destination namespace
    pub namespace: Option<String>,
    pub name: String,
    /// Data key inside the secret, when the consumer needs a single value
    pub key: Option<String>,
}

impl SecretReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.trim().is_empty()).then_some(namespace);
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Namespace the secret is read from, given the working namespace
    pub fn effective_namespace<'a>(&'a self, working_namespace: &'a str) -> &'a str {
        match self.namespace.as_deref().map(str::trim) {
            Some(ns) if !ns.is_empty() => ns,
            _ => working_namespace,
        }
    }

    /// True when both references resolve to the same secret object
    pub fn same_secret(&self, other: &SecretReference, working_namespace: &str) -> bool {
        self.name == other.name
            && self.effective_namespace(working_namespace)
                == other.effective_namespace(working_namespace)
    }

    /// Whether a secret name has been configured at all
    pub fn is_configured(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

impl fmt::Display for SecretReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => write!(f, "{ns}/{}", self.name),
            _ => write!(f, "{}", self.name),
        }
    }
}
