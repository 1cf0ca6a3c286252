//! # Git SSH Multiplexer
//!
//! Lets kustomize fetch private remote bases over SSH with a different key per
//! repository, even when several repositories live on the same host.
//!
//! ## How it works
//!
//! 1. Every private key in the git SSH secret is written to `<root>/.ssh/<key>`
//! 2. Annotated remote base URLs in kustomization files are rewritten to point at
//!    a keyed alias (`ssh://key_a_github_com/...`)
//! 3. An `ssh_config` maps each alias back to the real host and its key
//! 4. The returned `GIT_SSH_COMMAND` makes git use only that config
//!
//! Without a configured secret git still gets an SSH command, one that refuses
//! every system key, so misconfigured private bases fail loudly.

pub mod rewrite;
pub mod ssh_config;

pub use rewrite::RepoBaseRewriter;
pub use ssh_config::construct_ssh_config;

use crate::app::{ApplicationContext, SecretReference};
use crate::constants::{GIT_SSH_COMMAND_ENV, KNOWN_HOSTS_KEY, KUSTOMIZATION_FILENAMES, SSH_DIR};
use crate::error::{IoContext, PluginError, Result};
use crate::secret::SecretResolver;
use crate::tree;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zeroize::Zeroize;

const DEFAULT_SSH_COMMAND: &str = "ssh -q -F none -o IdentitiesOnly=yes -o IdentityFile=/dev/null -o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no";
const NO_KNOWN_HOSTS_OPTIONS: &str = "-o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no";
const SSH_CONFIG_FILENAME: &str = "config";

/// The SSH command git must use, exported as `GIT_SSH_COMMAND`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand(String);

impl SshCommand {
    /// Command that ignores every key on the system
    pub fn locked_down() -> Self {
        Self(DEFAULT_SSH_COMMAND.to_string())
    }

    fn with_config(config: &Path, known_hosts: Option<&Path>) -> Self {
        let known_hosts = match known_hosts {
            Some(path) => format!("-o UserKnownHostsFile={}", path.display()),
            None => NO_KNOWN_HOSTS_OPTIONS.to_string(),
        };
        Self(format!("ssh -q -F {} {known_hosts}", config.display()))
    }

    /// Value of the `GIT_SSH_COMMAND` variable
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SshCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{GIT_SSH_COMMAND_ENV}={}", self.0)
    }
}

/// Find every kustomization file under `root`, skipping `.git` and `.ssh`
///
/// Paths are returned sorted and de-duplicated.
pub fn find_kustomize_files(root: &Path) -> Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    for entry in tree::regular_files(root, &[SSH_DIR]) {
        let entry = entry?;
        let is_kustomization = entry
            .file_name()
            .to_str()
            .is_some_and(|name| KUSTOMIZATION_FILENAMES.contains(&name));
        if is_kustomization {
            files.insert(entry.into_path());
        }
    }
    Ok(files)
}

/// Rewrite every kustomization file under `root` once and merge the aliases
/// they bound
///
/// A file is only written back when at least one URL in it was rewritten. An
/// alias may be used by several files but always for the same host.
pub fn process_kustomize_files(
    root: &Path,
    rewriter: &RepoBaseRewriter,
) -> Result<BTreeMap<String, String>> {
    let mut keyed_domains = BTreeMap::new();

    for path in find_kustomize_files(root)? {
        let content = std::fs::read_to_string(&path)
            .io_context(|| format!("unable to read {}", path.display()))?;
        let (count, rewritten) = rewriter.rewrite_into(&content, &path, &mut keyed_domains)?;
        if count == 0 {
            continue;
        }

        tree::write_private_file(&path, rewritten.as_bytes())?;
        debug!(path = %path.display(), urls = count, "rewrote remote bases");
    }

    Ok(keyed_domains)
}

/// Provisions SSH credentials for one application source tree
#[derive(Debug, Clone)]
pub struct GitSshMultiplexer {
    resolver: SecretResolver,
    rewriter: RepoBaseRewriter,
}

impl GitSshMultiplexer {
    pub fn new(resolver: SecretResolver, key_marker: &str) -> Result<Self> {
        Ok(Self {
            resolver,
            rewriter: RepoBaseRewriter::new(key_marker)?,
        })
    }

    /// Write keys and ssh config under `<root>/.ssh` and rewrite kustomization
    /// files, returning the SSH command git must use
    ///
    /// An unconfigured `ssh_secret` yields [`SshCommand::locked_down`] and
    /// leaves the tree untouched. Cancellation is checked before the secret is
    /// fetched and again before anything is written.
    pub async fn setup_git_ssh(
        &self,
        root: &Path,
        app: &ApplicationContext,
        ssh_secret: &SecretReference,
        cancel: &CancellationToken,
    ) -> Result<SshCommand> {
        if !ssh_secret.is_configured() {
            debug!(app = %app.name, "no git ssh secret configured");
            return Ok(SshCommand::locked_down());
        }

        ensure_not_cancelled(cancel)?;
        let secret = self
            .resolver
            .resolve(&app.destination_namespace, ssh_secret)
            .await?;
        ensure_not_cancelled(cancel)?;

        let ssh_dir = root.join(SSH_DIR);
        tree::create_private_dir(&ssh_dir)?;

        let mut identity_files = BTreeMap::new();
        let mut known_hosts = None;
        for (key, value) in secret.data() {
            validate_key_name(key)?;
            let path = ssh_dir.join(key);

            if key == KNOWN_HOSTS_KEY {
                tree::write_private_file(&path, value)?;
                known_hosts = Some(path);
                continue;
            }

            // ssh silently ignores a private key without a trailing newline
            let mut contents = value.clone();
            if !contents.ends_with(b"\n") {
                contents.push(b'\n');
            }
            let written = tree::write_private_file(&path, &contents);
            contents.zeroize();
            written?;
            identity_files.insert(key.clone(), path);
        }

        let keyed_domains = process_kustomize_files(root, &self.rewriter)?;
        let config = construct_ssh_config(&identity_files, &keyed_domains)?;
        let config_path = ssh_dir.join(SSH_CONFIG_FILENAME);
        tree::write_private_file(&config_path, config.as_bytes())?;

        info!(
            app = %app.name,
            secret = %ssh_secret,
            keys = identity_files.len(),
            aliases = keyed_domains.len(),
            "🔑 git ssh configured"
        );
        Ok(SshCommand::with_config(&config_path, known_hosts.as_deref()))
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PluginError::Cancelled {
            operation: "git ssh setup".to_string(),
        });
    }
    Ok(())
}

/// Secret keys become file names under `.ssh`
fn validate_key_name(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key == SSH_CONFIG_FILENAME
        || key.contains(['/', '\\']);
    if invalid {
        return Err(PluginError::Config(format!(
            "git ssh secret key {key:?} cannot be used as a key file name"
        )));
    }
    Ok(())
}
