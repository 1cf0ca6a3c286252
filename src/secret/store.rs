//! # Secret Store
//!
//! Read-only access to Kubernetes secrets.
//!
//! The resolver only ever needs `get(namespace, name)`, so the store is a narrow
//! trait: the plugin uses [`KubeSecretStore`] in-cluster and tests use
//! [`InMemorySecretStore`].

use crate::error::{PluginError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use zeroize::Zeroize;

/// Raw secret as returned by the store, before any policy is applied
#[derive(Clone, Default)]
pub struct StoredSecret {
    pub namespace: String,
    pub name: String,
    pub data: BTreeMap<String, Vec<u8>>,
    pub annotations: BTreeMap<String, String>,
}

impl StoredSecret {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSecret")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .field("annotations", &self.annotations)
            .finish()
    }
}

impl Drop for StoredSecret {
    fn drop(&mut self) {
        for value in self.data.values_mut() {
            value.zeroize();
        }
    }
}

impl From<Secret> for StoredSecret {
    fn from(secret: Secret) -> Self {
        let data = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.0))
            .collect();
        Self {
            namespace: secret.metadata.namespace.unwrap_or_default(),
            name: secret.metadata.name.unwrap_or_default(),
            data,
            annotations: secret.metadata.annotations.unwrap_or_default(),
        }
    }
}

/// Read-only secret lookup
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret
    ///
    /// Returns [`PluginError::NotFound`] when the secret does not exist and
    /// [`PluginError::SecretStore`] for any other failure.
    async fn get(&self, namespace: &str, name: &str) -> Result<StoredSecret>;
}

/// Secret store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<StoredSecret> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        match secrets.get(name).await {
            Ok(secret) => {
                debug!(namespace, name, "fetched secret");
                let mut stored = StoredSecret::from(secret);
                if stored.namespace.is_empty() {
                    stored.namespace = namespace.to_string();
                }
                Ok(stored)
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Err(PluginError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(PluginError::SecretStore {
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Fixed set of secrets held in memory
///
/// Counts lookups so callers can assert the store was (or was not) consulted.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: BTreeMap<(String, String), StoredSecret>,
    lookups: AtomicUsize,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_secret(mut self, secret: StoredSecret) -> Self {
        self.secrets
            .insert((secret.namespace.clone(), secret.name.clone()), secret);
        self
    }

    /// Number of `get` calls served so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<StoredSecret> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| PluginError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
