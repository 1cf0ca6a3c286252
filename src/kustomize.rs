//! # Kustomize Integration
//!
//! Renders an application source tree with `kustomize build` and scans the
//! result for leaked ciphertext.
//!
//! ## Build environment
//!
//! kustomize runs with a cleared environment:
//!
//! - `HOME` is the source directory, so neither ssh nor git pick up system keys
//!   or config
//! - `PATH` is inherited
//! - `GIT_SSH_COMMAND` comes from [`GitSshMultiplexer::setup_git_ssh`]
//! - `STRONGBOX_HOME` is set when a keyring or identity was written, after
//!   `strongbox -git-config` installed the git filters, so remote bases are
//!   decrypted on checkout
//!
//! A tree without any kustomization file is rendered by concatenating its YAML
//! files.

use crate::app::{ApplicationContext, SecretReference};
use crate::constants::{
    GIT_SSH_COMMAND_ENV, SSH_DIR, STRONGBOX_IDENTITY_FILENAME, STRONGBOX_KEYRING_FILENAME,
};
use crate::decrypt::strongbox;
use crate::error::{IoContext, Result};
use crate::git_ssh::rewrite::is_ssh_remote_line;
use crate::git_ssh::{find_kustomize_files, GitSshMultiplexer, SshCommand};
use crate::output::check_secrets;
use crate::process;
use crate::tree;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Document separator appended after every rendered file
pub const DOCUMENT_SEPARATOR: &str = "\n---\n";

/// Concatenate every `*.yaml` / `*.yml` file under `root`, each followed by a
/// document separator
///
/// Files are read in path order; `.git` and `.ssh` are skipped.
pub fn find_and_read_yaml_files(root: &Path) -> Result<Vec<u8>> {
    let mut paths = BTreeSet::new();
    for entry in tree::regular_files(root, &[SSH_DIR]) {
        let entry = entry?;
        let is_yaml = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if is_yaml {
            paths.insert(entry.into_path());
        }
    }

    let mut content = Vec::new();
    for path in paths {
        let data =
            std::fs::read(&path).io_context(|| format!("unable to read file {}", path.display()))?;
        content.extend_from_slice(&data);
        content.extend_from_slice(DOCUMENT_SEPARATOR.as_bytes());
    }
    Ok(content)
}

/// True when any of the kustomization files references a remote base over SSH
pub fn has_ssh_remote_base_url<'a>(files: impl IntoIterator<Item = &'a PathBuf>) -> Result<bool> {
    for path in files {
        let content = std::fs::read_to_string(path)
            .io_context(|| format!("unable to read {}", path.display()))?;
        if content.contains("ssh://") || content.lines().any(is_ssh_remote_line) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Environment for kustomize and the strongbox git filters
pub fn build_env(root: &Path, ssh_command: &SshCommand) -> Vec<(String, String)> {
    let mut env = vec![
        ("HOME".to_string(), root.display().to_string()),
        (
            "PATH".to_string(),
            std::env::var("PATH").unwrap_or_default(),
        ),
        (GIT_SSH_COMMAND_ENV.to_string(), ssh_command.value().to_string()),
    ];
    if has_strongbox_material(root) {
        env.push(("STRONGBOX_HOME".to_string(), root.display().to_string()));
    }
    env
}

fn has_strongbox_material(root: &Path) -> bool {
    root.join(STRONGBOX_KEYRING_FILENAME).exists()
        || root.join(STRONGBOX_IDENTITY_FILENAME).exists()
}

/// Renders application source trees
#[derive(Debug, Clone)]
pub struct KustomizeBuilder {
    git_ssh: GitSshMultiplexer,
    kustomize_binary: PathBuf,
    strongbox_binary: PathBuf,
}

impl KustomizeBuilder {
    pub fn new(
        git_ssh: GitSshMultiplexer,
        kustomize_binary: impl Into<PathBuf>,
        strongbox_binary: impl Into<PathBuf>,
    ) -> Self {
        Self {
            git_ssh,
            kustomize_binary: kustomize_binary.into(),
            strongbox_binary: strongbox_binary.into(),
        }
    }

    /// Render `root` and return manifests that passed [`check_secrets`]
    pub async fn ensure_build(
        &self,
        root: &Path,
        app: &ApplicationContext,
        ssh_secret: &SecretReference,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let kustomizations = find_kustomize_files(root)?;
        if kustomizations.is_empty() {
            debug!(root = %root.display(), "no kustomization found, concatenating yaml files");
            let manifests = find_and_read_yaml_files(root)?;
            check_secrets(&manifests)?;
            return Ok(manifests);
        }

        let ssh_command = if has_ssh_remote_base_url(&kustomizations)? {
            self.git_ssh
                .setup_git_ssh(root, app, ssh_secret, cancel)
                .await?
        } else {
            SshCommand::locked_down()
        };

        let env = build_env(root, &ssh_command);
        if has_strongbox_material(root) {
            strongbox::setup_git_config(&self.strongbox_binary, root, &env, cancel).await?;
        }

        self.run_kustomize_build(root, &env, cancel).await
    }

    /// Run `kustomize build .` in `root` with exactly `env`
    pub async fn run_kustomize_build(
        &self,
        root: &Path,
        env: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let mut cmd = Command::new(process::locate(&self.kustomize_binary)?);
        cmd.arg("build")
            .arg(".")
            .current_dir(root)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let output = process::run("kustomize", cmd, cancel).await?;
        info!(
            root = %root.display(),
            duration_ms = output.duration.as_millis(),
            "kustomize command finished"
        );

        check_secrets(&output.stdout)?;
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_KEY_MARKER;
    use crate::error::ErrorKind;
    use crate::secret::{InMemorySecretStore, SecretResolver};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const ANNOTATION: &str = "argocd-strongbox.plugin.io/allowed-namespaces";

    mod yaml_fallback_tests {
        use super::*;

        #[test]
        fn test_concatenates_yaml_in_path_order() {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join("b")).unwrap();
            fs::create_dir_all(dir.path().join(".git")).unwrap();
            fs::write(dir.path().join("a.yaml"), "kind: A").unwrap();
            fs::write(dir.path().join("b/c.yml"), "kind: C").unwrap();
            fs::write(dir.path().join("b/notes.txt"), "ignored").unwrap();
            fs::write(dir.path().join(".git/x.yaml"), "ignored").unwrap();

            let out = find_and_read_yaml_files(dir.path()).unwrap();
            assert_eq!(
                String::from_utf8(out).unwrap(),
                "kind: A\n---\nkind: C\n---\n"
            );
        }

        #[test]
        fn test_empty_tree() {
            let dir = TempDir::new().unwrap();
            assert!(find_and_read_yaml_files(dir.path()).unwrap().is_empty());
        }
    }

    mod remote_base_tests {
        use super::*;

        fn kustomization(content: &str) -> (TempDir, PathBuf) {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("kustomization.yaml");
            fs::write(&path, content).unwrap();
            (dir, path)
        }

        #[test]
        fn test_ssh_scheme() {
            let (_dir, path) = kustomization("resources:\n  - ssh://github.com/org/repo\n");
            assert!(has_ssh_remote_base_url([&path]).unwrap());
        }

        #[test]
        fn test_scp_like() {
            let (_dir, path) = kustomization("resources:\n  - git@github.com:org/repo.git\n");
            assert!(has_ssh_remote_base_url([&path]).unwrap());
        }

        #[test]
        fn test_https_only() {
            let (_dir, path) =
                kustomization("resources:\n  - https://github.com/org/repo\n  - app/\n");
            assert!(!has_ssh_remote_base_url([&path]).unwrap());
        }
    }

    #[test]
    fn test_build_env() {
        let dir = TempDir::new().unwrap();
        let env = build_env(dir.path(), &SshCommand::locked_down());
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["HOME", "PATH", "GIT_SSH_COMMAND"]);
        assert_eq!(env[0].1, dir.path().display().to_string());

        fs::write(dir.path().join(".strongbox_identity"), "id").unwrap();
        let env = build_env(dir.path(), &SshCommand::locked_down());
        assert_eq!(env[3], ("STRONGBOX_HOME".to_string(), dir.path().display().to_string()));
    }

    #[cfg(unix)]
    mod build_tests {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn builder(bin: &Path, kustomize_body: &str) -> KustomizeBuilder {
            let resolver = SecretResolver::new(Arc::new(InMemorySecretStore::new()), ANNOTATION);
            KustomizeBuilder::new(
                GitSshMultiplexer::new(resolver, DEFAULT_KEY_MARKER).unwrap(),
                script(bin, "kustomize", kustomize_body),
                script(bin, "strongbox", "echo \"$STRONGBOX_HOME\" > \"$(dirname \"$0\")/strongbox-home\"\n"),
            )
        }

        #[tokio::test]
        async fn test_runs_kustomize_with_clean_env() {
            let bin = TempDir::new().unwrap();
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("kustomization.yaml"), "resources: []\n").unwrap();

            let out = builder(
                bin.path(),
                "echo \"args=$*\"\necho \"home=$HOME\"\necho \"ssh=$GIT_SSH_COMMAND\"\necho \"other=${CARGO:-unset}\"\n",
            )
            .ensure_build(
                dir.path(),
                &ApplicationContext::new("app", "bar"),
                &SecretReference::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

            let out = String::from_utf8(out).unwrap();
            assert!(out.contains("args=build ."));
            assert!(out.contains(&format!("home={}", dir.path().display())));
            assert!(out.contains("ssh=ssh -q -F none"));
            assert!(out.contains("other=unset"));
            assert!(!bin.path().join("strongbox-home").exists());
        }

        #[tokio::test]
        async fn test_strongbox_git_config_when_material_present() {
            let bin = TempDir::new().unwrap();
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("kustomization.yaml"), "resources: []\n").unwrap();
            fs::write(dir.path().join(".strongbox_keyring"), "keyentries: []\n").unwrap();

            builder(bin.path(), "echo 'kind: ConfigMap'\n")
                .ensure_build(
                    dir.path(),
                    &ApplicationContext::new("app", "bar"),
                    &SecretReference::default(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            let home = fs::read_to_string(bin.path().join("strongbox-home")).unwrap();
            assert_eq!(home.trim(), dir.path().display().to_string());
        }

        #[tokio::test]
        async fn test_ciphertext_in_output_fails() {
            let bin = TempDir::new().unwrap();
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("kustomization.yaml"), "resources: []\n").unwrap();

            let err = builder(
                bin.path(),
                "printf 'kind: Secret\\nmetadata:\\n  name: s\\nstringData:\\n  k: \"# STRONGBOX ENCRYPTED RESOURCE\"\\n'\n",
            )
            .ensure_build(
                dir.path(),
                &ApplicationContext::new("app", "bar"),
                &SecretReference::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ContentSafety);
        }

        #[tokio::test]
        async fn test_kustomize_failure() {
            let bin = TempDir::new().unwrap();
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("kustomization.yaml"), "resources: []\n").unwrap();

            let err = builder(bin.path(), "echo 'accumulating resources failed' >&2\nexit 1\n")
                .ensure_build(
                    dir.path(),
                    &ApplicationContext::new("app", "bar"),
                    &SecretReference::default(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ExternalTool);
            assert!(err.to_string().contains("accumulating resources failed"));
        }

        #[tokio::test]
        async fn test_without_kustomization_concatenates_yaml() {
            let bin = TempDir::new().unwrap();
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("deploy.yaml"), "kind: Deployment").unwrap();

            let out = builder(bin.path(), "exit 1\n")
                .ensure_build(
                    dir.path(),
                    &ApplicationContext::new("app", "bar"),
                    &SecretReference::default(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            assert_eq!(out, b"kind: Deployment\n---\n");
        }
    }
}
