//! # Strongbox Keyring Decryption
//!
//! Symmetric decryption is delegated to the strongbox binary, which rewrites
//! every file it can decrypt under the given directory.

use crate::error::Result;
use crate::process;
use std::path::Path;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run `strongbox -keyring <keyring> -decrypt -recursive <root>`
pub async fn decrypt_recursive(
    binary: &Path,
    root: &Path,
    keyring_path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut cmd = Command::new(process::locate(binary)?);
    cmd.arg("-keyring")
        .arg(keyring_path)
        .arg("-decrypt")
        .arg("-recursive")
        .arg(root);

    let output = process::run("strongbox", cmd, cancel).await?;
    info!(
        root = %root.display(),
        duration_ms = output.duration.as_millis(),
        "strongbox keyring decryption finished"
    );
    Ok(())
}

/// Run `strongbox -git-config` so git filters decrypt files fetched by kustomize
pub async fn setup_git_config(
    binary: &Path,
    root: &Path,
    env: &[(String, String)],
    cancel: &CancellationToken,
) -> Result<()> {
    let mut cmd = Command::new(process::locate(binary)?);
    cmd.arg("-git-config")
        .current_dir(root)
        .env_clear()
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    process::run("strongbox -git-config", cmd, cancel).await?;
    Ok(())
}
