//! # Secret Resolution
//!
//! Namespace-scoped secret lookup with cross-namespace authorization and a
//! content-safety check.
//!
//! A secret living outside the application's destination namespace may only be
//! read when the destination namespace is listed in the allow-list annotation on
//! that secret. A secret is never handed to a consumer while any of its values
//! is still ciphertext.

pub mod store;

pub use store::{InMemorySecretStore, KubeSecretStore, SecretStore, StoredSecret};

use crate::app::SecretReference;
use crate::decrypt::detect::starts_with_ciphertext_marker;
use crate::error::{PluginError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A secret that passed authorization and the content-safety check
pub struct AuthorizedSecret {
    inner: StoredSecret,
}

impl AuthorizedSecret {
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.inner.data.get(key).map(Vec::as_slice)
    }

    pub fn data(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.inner.data
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.inner.annotations
    }
}

impl fmt::Debug for AuthorizedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedSecret")
            .field("secret", &self.inner)
            .finish()
    }
}

/// Resolves [`SecretReference`]s against a [`SecretStore`]
///
/// Constructed once per invocation and passed to every component that needs
/// key material.
#[derive(Clone)]
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
    allowed_namespaces_annotation: String,
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretResolver")
            .field(
                "allowed_namespaces_annotation",
                &self.allowed_namespaces_annotation,
            )
            .finish_non_exhaustive()
    }
}

impl SecretResolver {
    pub fn new(store: Arc<dyn SecretStore>, allowed_namespaces_annotation: impl Into<String>) -> Self {
        Self {
            store,
            allowed_namespaces_annotation: allowed_namespaces_annotation.into(),
        }
    }

    /// Fetch the referenced secret on behalf of `working_namespace`
    ///
    /// # Errors
    /// - [`PluginError::NotFound`] when the secret does not exist
    /// - [`PluginError::ContentSafety`] when any value is still ciphertext
    /// - [`PluginError::Forbidden`] when the secret lives in another namespace
    ///   that does not list `working_namespace` in its allow-list annotation
    pub async fn resolve(
        &self,
        working_namespace: &str,
        reference: &SecretReference,
    ) -> Result<AuthorizedSecret> {
        let namespace = reference.effective_namespace(working_namespace);
        debug!(namespace, name = %reference.name, "resolving secret");

        let secret = self.store.get(namespace, &reference.name).await?;

        verify_secret_not_encrypted(namespace, &secret)?;

        if namespace != working_namespace && !self.namespace_allowed(&secret, working_namespace) {
            warn!(
                namespace,
                name = %reference.name,
                working_namespace,
                annotation = %self.allowed_namespaces_annotation,
                "cross-namespace secret access denied"
            );
            return Err(PluginError::Forbidden {
                namespace: namespace.to_string(),
                name: reference.name.clone(),
                working_namespace: working_namespace.to_string(),
                annotation: self.allowed_namespaces_annotation.clone(),
            });
        }

        Ok(AuthorizedSecret { inner: secret })
    }

    fn namespace_allowed(&self, secret: &StoredSecret, working_namespace: &str) -> bool {
        secret
            .annotations
            .get(&self.allowed_namespaces_annotation)
            .is_some_and(|allowed| {
                allowed
                    .split(',')
                    .any(|candidate| candidate.trim() == working_namespace)
            })
    }
}

/// Error out if at least one value of the secret is still encrypted
fn verify_secret_not_encrypted(namespace: &str, secret: &StoredSecret) -> Result<()> {
    for (key, value) in &secret.data {
        if starts_with_ciphertext_marker(value) {
            return Err(PluginError::ContentSafety {
                subject: format!("secret {namespace}/{}", secret.name),
                key: key.clone(),
            });
        }
    }
    Ok(())
}
