//! # Argo CD Strongbox Plugin
//!
//! Config management plugin run by the Argo CD repo-server for applications
//! whose sources contain strongbox or age encrypted files.
//!
//! ## Commands
//!
//! - `decrypt` (plugin `init`): decrypts the application source directory in
//!   place using the keyring/identities stored in a Kubernetes secret
//! - `generate`: renders manifests with `kustomize build`, provisioning per-repo
//!   SSH keys for private remote bases, and refuses to emit ciphertext
//!
//! Manifests are written to stdout, logs to stderr. Any failure exits 1 after
//! logging the full error chain.

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::process::ExitCode;
use std::sync::Arc;
use strongbox_plugin::cli::Cli;
use strongbox_plugin::config::PluginConfig;
use strongbox_plugin::observability::init_tracing;
use strongbox_plugin::secret::{KubeSecretStore, SecretResolver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = PluginConfig::from_env();
    init_tracing(&config);

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("app terminated: {e:#}");
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, config: &PluginConfig) -> Result<()> {
    // kube's rustls transport needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let cancel = CancellationToken::new();
    spawn_cancellation(cancel.clone(), config);

    let client = Client::try_default()
        .await
        .context("unable to create kubernetes client")?;
    let resolver = SecretResolver::new(
        Arc::new(KubeSecretStore::new(client)),
        &config.allowed_namespaces_annotation,
    );

    let mut stdout = std::io::stdout().lock();
    cli.execute(config, resolver, &cancel, &mut stdout).await
}

/// Cancel `token` on SIGINT, SIGTERM or when the configured deadline passes
fn spawn_cancellation(token: CancellationToken, config: &PluginConfig) {
    let timeout = config.timeout();

    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = shutdown_signal() => warn!("signal received, cancelling"),
            () = deadline => warn!(?timeout, "deadline exceeded, cancelling"),
        }
        token.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
