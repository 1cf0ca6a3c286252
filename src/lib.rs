//! # Argo CD Strongbox Plugin
//!
//! Library behind the `argocd-strongbox-plugin` binary.
//!
//! Before kustomize renders an application the plugin:
//!
//! 1. **Resolves key material** from Kubernetes secrets, enforcing the
//!    cross-namespace allow-list annotation ([`secret`])
//! 2. **Decrypts** strongbox (keyring) and age (identity) ciphertext in the
//!    source tree ([`decrypt`])
//! 3. **Provisions SSH keys** per remote base so several keys can reach the same
//!    host ([`git_ssh`])
//! 4. **Renders and scans** the manifests, refusing to emit a `Secret` that still
//!    carries ciphertext ([`kustomize`], [`output`])
//!
//! Tests are included in the module files.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod decrypt;
pub mod error;
pub mod git_ssh;
pub mod kustomize;
pub mod observability;
pub mod output;
pub mod process;
pub mod secret;
mod tree;

pub use error::{ErrorKind, PluginError, Result};
