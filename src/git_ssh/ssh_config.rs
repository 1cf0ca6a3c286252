//! # SSH Client Configuration
//!
//! Synthesizes the `ssh_config` that maps keyed host aliases back to their
//! real hosts and identity files.

use super::rewrite::keyed_host;
use crate::error::{PluginError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Build the ssh config for the written identity files and the aliases the
/// kustomization files referenced
///
/// With exactly one identity a single `Host *` block is emitted, whatever was
/// referenced. Otherwise every referenced alias gets its own block and must
/// have an identity file. Identities nobody referenced are left out.
pub fn construct_ssh_config(
    identity_files: &BTreeMap<String, PathBuf>,
    keyed_domains: &BTreeMap<String, String>,
) -> Result<String> {
    if identity_files.len() == 1 {
        if let Some(path) = identity_files.values().next() {
            return Ok(format!(
                "Host *\n    IdentitiesOnly yes\n    IdentityFile {}\n    User git\n",
                path.display()
            ));
        }
    }

    let mut blocks = Vec::with_capacity(keyed_domains.len());
    for (alias, domain) in keyed_domains {
        let path = identity_files.get(alias).ok_or_else(|| {
            PluginError::Config(format!(
                "unable to find path for key:{alias}, please make sure all referenced keys are added to git ssh secret"
            ))
        })?;

        blocks.push(format!(
            "Host {}\n    HostName {domain}\n    IdentitiesOnly yes\n    IdentityFile {}\n    User git\n",
            keyed_host(alias, domain),
            path.display()
        ));
    }

    if blocks.is_empty() {
        return Err(PluginError::Config(
            "keys are not referenced, please reference keys on remote base url in kustomize file"
                .to_string(),
        ));
    }

    Ok(blocks.join("\n"))
}
