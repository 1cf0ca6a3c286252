//! # Decryption
//!
//! Decrypts a checked-out application source tree before it is rendered.
//!
//! Two kinds of ciphertext are supported side by side:
//! - strongbox keyring (symmetric), handled by the strongbox binary
//! - age identities (asymmetric), decrypted in-process
//!
//! Nothing is fetched from the cluster unless the tree actually contains
//! ciphertext. Partial decryption is not rolled back: the working directory is
//! exclusive to one invocation and discarded afterwards.

pub mod detect;
pub mod identity;
pub mod strongbox;

use crate::app::{ApplicationContext, SecretReference};
use crate::constants::{
    DEFAULT_IDENTITY_KEY, DEFAULT_KEYRING_KEY, STRONGBOX_IDENTITY_FILENAME,
    STRONGBOX_KEYRING_FILENAME,
};
use crate::error::Result;
use crate::secret::{AuthorizedSecret, SecretResolver};
use crate::tree;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key material fetched for one invocation
///
/// Empty values are treated as absent. Wiped on drop.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pub keyring: Option<Vec<u8>>,
    pub identity: Option<Vec<u8>>,
}

impl KeyMaterial {
    fn from_secrets(
        keyring_secret: &AuthorizedSecret,
        keyring_key: &str,
        identity_secret: &AuthorizedSecret,
        identity_key: &str,
    ) -> Self {
        Self {
            keyring: non_empty(keyring_secret.get(keyring_key)),
            identity: non_empty(identity_secret.get(identity_key)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keyring.is_none() && self.identity.is_none()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("keyring", &self.keyring.is_some())
            .field("identity", &self.identity.is_some())
            .finish()
    }
}

fn non_empty(value: Option<&[u8]>) -> Option<Vec<u8>> {
    value.filter(|v| !v.is_empty()).map(<[u8]>::to_vec)
}

/// Runs the ciphertext gate, fetches key material and decrypts a source tree
#[derive(Debug, Clone)]
pub struct DecryptionOrchestrator {
    resolver: SecretResolver,
    strongbox_binary: PathBuf,
}

impl DecryptionOrchestrator {
    pub fn new(resolver: SecretResolver, strongbox_binary: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            strongbox_binary: strongbox_binary.into(),
        }
    }

    /// Decrypt every strongbox and age ciphertext under `root`
    ///
    /// The keyring is read from `keyring_ref.key` (default `.strongbox_keyring`)
    /// and the identities from `identity_ref.key` (default `.strongbox_identity`).
    ///
    /// # Errors
    /// Resolver errors are returned unchanged. Tool and decryption failures name
    /// the path that failed.
    pub async fn decrypt(
        &self,
        root: &Path,
        app: &ApplicationContext,
        keyring_ref: &SecretReference,
        identity_ref: &SecretReference,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !detect::has_ciphertext(root)? {
            debug!(root = %root.display(), "no encrypted files found, skipping decryption");
            return Ok(());
        }

        let material = self.resolve_material(app, keyring_ref, identity_ref).await?;
        if material.is_empty() {
            warn!(
                app = %app.name,
                keyring = %keyring_ref,
                identity = %identity_ref,
                "encrypted files found but no keyring or identity is configured"
            );
            return Ok(());
        }

        if let Some(keyring) = &material.keyring {
            let keyring_path = root.join(STRONGBOX_KEYRING_FILENAME);
            tree::write_private_file(&keyring_path, keyring)?;
            strongbox::decrypt_recursive(&self.strongbox_binary, root, &keyring_path, cancel)
                .await?;
        }

        if let Some(identities) = &material.identity {
            let identity_path = root.join(STRONGBOX_IDENTITY_FILENAME);
            tree::write_private_file(&identity_path, identities)?;
            let count = identity::decrypt_recursive(root, identities, cancel)?;
            info!(app = %app.name, files = count, "age decryption finished");
        }

        Ok(())
    }

    async fn resolve_material(
        &self,
        app: &ApplicationContext,
        keyring_ref: &SecretReference,
        identity_ref: &SecretReference,
    ) -> Result<KeyMaterial> {
        let namespace = app.destination_namespace.as_str();
        let keyring_key = keyring_ref.key.as_deref().unwrap_or(DEFAULT_KEYRING_KEY);
        let identity_key = identity_ref.key.as_deref().unwrap_or(DEFAULT_IDENTITY_KEY);

        let keyring_secret = self.resolve_configured(namespace, keyring_ref).await?;
        if keyring_ref.same_secret(identity_ref, namespace) {
            return Ok(match &keyring_secret {
                Some(secret) => KeyMaterial::from_secrets(secret, keyring_key, secret, identity_key),
                None => KeyMaterial::default(),
            });
        }

        let identity_secret = self.resolve_configured(namespace, identity_ref).await?;
        Ok(KeyMaterial {
            keyring: keyring_secret
                .as_ref()
                .and_then(|secret| non_empty(secret.get(keyring_key))),
            identity: identity_secret
                .as_ref()
                .and_then(|secret| non_empty(secret.get(identity_key))),
        })
    }

    async fn resolve_configured(
        &self,
        namespace: &str,
        reference: &SecretReference,
    ) -> Result<Option<AuthorizedSecret>> {
        if !reference.is_configured() {
            return Ok(None);
        }
        self.resolver.resolve(namespace, reference).await.map(Some)
    }
}
