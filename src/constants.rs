//! # Constants
//!
//! Shared constants used throughout the plugin.
//!
//! Names and defaults that Argo CD applications reference from their plugin
//! environment live here so they can be documented in one place. Values that
//! operators may need to change are overridable via [`crate::config::PluginConfig`].

/// Line prefix of a file (or secret value) encrypted with a strongbox keyring
pub const STRONGBOX_ENCRYPTED_PREFIX: &[u8] = b"# STRONGBOX ENCRYPTED RESOURCE";

/// First line of an age ASCII-armored ciphertext
pub const AGE_ARMOR_HEADER: &[u8] = b"-----BEGIN AGE ENCRYPTED FILE-----";

/// Number of leading bytes inspected when looking for a ciphertext marker
pub const CIPHERTEXT_SNIFF_LEN: usize = 100;

/// Version control metadata directory, never walked
pub const GIT_DIR: &str = ".git";

/// Directory holding the synthesized SSH config and identity files
pub const SSH_DIR: &str = ".ssh";

/// Reserved key in the git SSH secret holding `known_hosts` content
pub const KNOWN_HOSTS_KEY: &str = "known_hosts";

/// Keyring file written into the application source directory
pub const STRONGBOX_KEYRING_FILENAME: &str = ".strongbox_keyring";

/// Age identity file written into the application source directory
pub const STRONGBOX_IDENTITY_FILENAME: &str = ".strongbox_identity";

/// Default name of the secret holding the strongbox keyring
pub const DEFAULT_KEYRING_SECRET_NAME: &str = "argocd-strongbox-keyring";

/// Default key inside the keyring secret holding the keyring itself
pub const DEFAULT_KEYRING_KEY: &str = STRONGBOX_KEYRING_FILENAME;

/// Default key inside the keyring secret holding age identities
pub const DEFAULT_IDENTITY_KEY: &str = STRONGBOX_IDENTITY_FILENAME;

/// Default annotation listing namespaces allowed to read a secret from another namespace
pub const DEFAULT_ALLOWED_NAMESPACES_ANNOTATION: &str =
    "argocd-strongbox.plugin.io/allowed-namespaces";

/// Default marker token used in kustomization comments to reference an SSH key
pub const DEFAULT_KEY_MARKER: &str = "argocd-strongbox-plugin";

/// Kustomization file names recognised by kustomize
pub const KUSTOMIZATION_FILENAMES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// Environment variable the SSH command is exported through
pub const GIT_SSH_COMMAND_ENV: &str = "GIT_SSH_COMMAND";
