//! # Plugin CLI
//!
//! Commands invoked by the Argo CD repo-server for one application.
//!
//! ## Usage
//!
//! ```bash
//! # init: decrypt every encrypted file under the application source directory
//! argocd-strongbox-plugin decrypt
//!
//! # generate: render manifests with kustomize
//! argocd-strongbox-plugin generate
//! ```
//!
//! Argo CD sets `ARGOCD_APP_NAME` and `ARGOCD_APP_NAMESPACE` for every plugin
//! command, and exposes the plugin env configured on an Application with an
//! `ARGOCD_ENV_` prefix.

use crate::app::{ApplicationContext, SecretReference};
use crate::config::PluginConfig;
use crate::constants::{DEFAULT_IDENTITY_KEY, DEFAULT_KEYRING_KEY, DEFAULT_KEYRING_SECRET_NAME};
use crate::decrypt::DecryptionOrchestrator;
use crate::git_ssh::GitSshMultiplexer;
use crate::kustomize::{KustomizeBuilder, DOCUMENT_SEPARATOR};
use crate::secret::SecretResolver;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Version string including the git hash and build time stamped by build.rs
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_DATETIME"),
    ")"
);

/// Argo CD config management plugin for strongbox encrypted applications
#[derive(Debug, Parser)]
#[command(name = "argocd-strongbox-plugin", version = VERSION, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decrypt all encrypted files under the application source directory
    Decrypt(DecryptArgs),
    /// Run kustomize build to generate kube manifests
    Generate(GenerateArgs),
}

/// Set by Argo CD for every plugin command
#[derive(Debug, Clone, Args)]
pub struct AppArgs {
    /// Name of the application
    #[arg(long, env = "ARGOCD_APP_NAME")]
    pub app_name: String,

    /// Destination namespace of the application
    #[arg(long, env = "ARGOCD_APP_NAMESPACE")]
    pub app_namespace: String,

    /// Application source directory (defaults to the current directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

impl AppArgs {
    fn context(&self) -> ApplicationContext {
        ApplicationContext::new(&self.app_name, &self.app_namespace)
    }

    fn source_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("unable to get current working dir"),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct DecryptArgs {
    #[command(flatten)]
    pub app: AppArgs,

    /// Secret holding the strongbox keyring and/or age identities
    #[arg(
        long,
        env = "ARGOCD_ENV_STRONGBOX_SECRET_NAME",
        default_value = DEFAULT_KEYRING_SECRET_NAME
    )]
    pub secret_name: String,

    /// Namespace of the keyring secret (defaults to the destination namespace)
    #[arg(long, env = "ARGOCD_ENV_STRONGBOX_SECRET_NAMESPACE")]
    pub secret_namespace: Option<String>,

    /// Key of the keyring secret holding a strongbox keyring
    #[arg(
        long,
        env = "ARGOCD_ENV_STRONGBOX_KEYRING_KEY",
        default_value = DEFAULT_KEYRING_KEY
    )]
    pub keyring_key: String,

    /// Key of the keyring secret holding age identities
    #[arg(
        long,
        env = "ARGOCD_ENV_STRONGBOX_IDENTITY_KEY",
        default_value = DEFAULT_IDENTITY_KEY
    )]
    pub identity_key: String,
}

impl DecryptArgs {
    fn secret(&self, key: &str) -> SecretReference {
        SecretReference::new(&self.secret_name)
            .in_namespace(self.secret_namespace.clone().unwrap_or_default())
            .with_key(key)
    }
}

#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub app: AppArgs,

    /// Secret holding the private keys (and optional known_hosts) for remote bases
    #[arg(long, env = "ARGOCD_ENV_STRONGBOX_GIT_SSH_SECRET_NAME")]
    pub git_ssh_secret_name: Option<String>,

    /// Namespace of the git ssh secret (defaults to the destination namespace)
    #[arg(long, env = "ARGOCD_ENV_STRONGBOX_GIT_SSH_SECRET_NAMESPACE")]
    pub git_ssh_secret_namespace: Option<String>,
}

impl GenerateArgs {
    fn git_ssh_secret(&self) -> SecretReference {
        match &self.git_ssh_secret_name {
            Some(name) => SecretReference::new(name)
                .in_namespace(self.git_ssh_secret_namespace.clone().unwrap_or_default()),
            None => SecretReference::default(),
        }
    }
}

impl Cli {
    /// Run the selected command, writing rendered manifests to `out`
    pub async fn execute(
        &self,
        config: &PluginConfig,
        resolver: SecretResolver,
        cancel: &CancellationToken,
        out: &mut impl Write,
    ) -> Result<()> {
        match &self.command {
            Commands::Decrypt(args) => run_decrypt(args, config, resolver, cancel).await,
            Commands::Generate(args) => {
                let manifests = run_generate(args, config, resolver, cancel).await?;
                out.write_all(&manifests)
                    .context("unable to write manifests")?;
                out.write_all(DOCUMENT_SEPARATOR.as_bytes())
                    .context("unable to write manifests")?;
                out.flush().context("unable to write manifests")
            }
        }
    }
}

/// `decrypt` command
pub async fn run_decrypt(
    args: &DecryptArgs,
    config: &PluginConfig,
    resolver: SecretResolver,
    cancel: &CancellationToken,
) -> Result<()> {
    let root = args.app.source_dir()?;
    let app = args.app.context();

    DecryptionOrchestrator::new(resolver, &config.strongbox_binary)
        .decrypt(
            &root,
            &app,
            &args.secret(&args.keyring_key),
            &args.secret(&args.identity_key),
            cancel,
        )
        .await
        .with_context(|| format!("unable to decrypt application {}", app.name))?;

    info!(app = %app.name, "✅ decrypt finished");
    Ok(())
}

/// `generate` command
pub async fn run_generate(
    args: &GenerateArgs,
    config: &PluginConfig,
    resolver: SecretResolver,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let root = args.app.source_dir()?;
    let app = args.app.context();

    let git_ssh = GitSshMultiplexer::new(resolver, &config.key_marker)?;
    let manifests = KustomizeBuilder::new(git_ssh, &config.kustomize_binary, &config.strongbox_binary)
        .ensure_build(&root, &app, &args.git_ssh_secret(), cancel)
        .await
        .with_context(|| format!("unable to generate manifests for application {}", app.name))?;

    info!(app = %app.name, bytes = manifests.len(), "✅ generate finished");
    Ok(manifests)
}
