//! # Decryption Integration Tests
//!
//! Exercises the secret resolver, ciphertext gate and age decryption together
//! through the public API.

mod common;

use common::*;
use std::sync::Arc;
use strongbox_plugin::app::{ApplicationContext, SecretReference};
use strongbox_plugin::decrypt::detect::has_ciphertext;
use strongbox_plugin::decrypt::DecryptionOrchestrator;
use strongbox_plugin::secret::{InMemorySecretStore, StoredSecret};
use strongbox_plugin::ErrorKind;
use tokio_util::sync::CancellationToken;

fn keyring() -> SecretReference {
    SecretReference::new("argocd-strongbox-keyring")
}

#[test]
fn test_has_ciphertext_detects_both_markers() {
    let identity = age::x25519::Identity::generate();

    let clean = source_tree(&[("app/deploy.yaml", "kind: Deployment\n")]);
    assert!(!has_ciphertext(clean.path()).unwrap());

    let strongbox = source_tree(&[("app/secret.yaml", STRONGBOX_CIPHERTEXT)]);
    assert!(has_ciphertext(strongbox.path()).unwrap());

    let aged = source_tree(&[(
        "nested/deeper/secret.yaml",
        &age_encrypt("a: b\n", &identity.to_public()),
    )]);
    assert!(has_ciphertext(aged.path()).unwrap());
}

#[test]
fn test_has_ciphertext_only_reads_file_head() {
    let padding = "x".repeat(200);
    let tree = source_tree(&[(
        "late.yaml",
        &format!("{padding}\n# STRONGBOX ENCRYPTED RESOURCE\n"),
    )]);
    assert!(!has_ciphertext(tree.path()).unwrap());
}

#[tokio::test]
async fn test_cross_namespace_identity_decrypts_tree() {
    let identity = age::x25519::Identity::generate();
    let tree = source_tree(&[
        ("kustomization.yaml", "resources:\n  - secret.yaml\n"),
        ("secret.yaml", &age_encrypt("apiVersion: v1\nkind: Secret\n", &identity.to_public())),
    ]);
    let store = Arc::new(
        InMemorySecretStore::new().with_secret(
            StoredSecret::new("shared", "argocd-strongbox-keyring")
                .with_annotation(ALLOWED_NAMESPACES_ANNOTATION, "team-a, bar")
                .with_data(".strongbox_identity", identity_file(&[&identity])),
        ),
    );
    let reference = keyring().in_namespace("shared");

    DecryptionOrchestrator::new(resolver(Arc::clone(&store)), "strongbox")
        .decrypt(
            tree.path(),
            &ApplicationContext::new("app", "bar"),
            &reference,
            &reference,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(store.lookups(), 1);
    assert_eq!(read(tree.path(), "secret.yaml"), "apiVersion: v1\nkind: Secret\n");
    assert!(!has_ciphertext(tree.path()).unwrap());
}

#[tokio::test]
async fn test_cross_namespace_without_annotation_is_forbidden() {
    let identity = age::x25519::Identity::generate();
    let tree = source_tree(&[("secret.yaml", &age_encrypt("a: b\n", &identity.to_public()))]);
    let store = Arc::new(InMemorySecretStore::new().with_secret(
        StoredSecret::new("shared", "argocd-strongbox-keyring")
            .with_data(".strongbox_identity", identity_file(&[&identity])),
    ));
    let reference = keyring().in_namespace("shared");

    let err = DecryptionOrchestrator::new(resolver(store), "strongbox")
        .decrypt(
            tree.path(),
            &ApplicationContext::new("app", "bar"),
            &reference,
            &reference,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(!tree.path().join(".strongbox_identity").exists());
}

#[tokio::test]
async fn test_unconfigured_keyring_with_identity_only() {
    let identity = age::x25519::Identity::generate();
    let tree = source_tree(&[("secret.yaml", &age_encrypt("a: b\n", &identity.to_public()))]);
    let store = Arc::new(InMemorySecretStore::new().with_secret(
        StoredSecret::new("bar", "age-identities")
            .with_data("identities.txt", identity_file(&[&identity])),
    ));

    DecryptionOrchestrator::new(resolver(Arc::clone(&store)), "strongbox")
        .decrypt(
            tree.path(),
            &ApplicationContext::new("app", "bar"),
            &SecretReference::new(""),
            &SecretReference::new("age-identities").with_key("identities.txt"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(store.lookups(), 1);
    assert_eq!(read(tree.path(), "secret.yaml"), "a: b\n");
    assert!(!tree.path().join(".strongbox_keyring").exists());
}
