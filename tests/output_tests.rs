//! # Output Scanner Integration Tests
//!
//! Rendered streams resembling real `kustomize build` output.

mod common;

use base64::{engine::general_purpose, Engine as _};
use common::*;
use strongbox_plugin::output::check_secrets;
use strongbox_plugin::ErrorKind;

fn secret_doc(name: &str, key: &str, value: &[u8]) -> String {
    format!(
        "apiVersion: v1\nkind: Secret\nmetadata:\n  name: {name}\n  namespace: bar\ntype: Opaque\ndata:\n  {key}: {}\n",
        general_purpose::STANDARD.encode(value)
    )
}

#[test]
fn test_decrypted_stream_passes() {
    let stream = [
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n".to_string(),
        secret_doc("db", "password", b"hunter2"),
    ]
    .join("---\n");
    check_secrets(stream.as_bytes()).unwrap();
}

#[test]
fn test_strongbox_ciphertext_anywhere_in_stream() {
    let stream = [
        secret_doc("ok", "password", b"hunter2"),
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n".to_string(),
        secret_doc("leaked", "db.yaml", STRONGBOX_CIPHERTEXT.as_bytes()),
    ]
    .join("---\n");

    let err = check_secrets(stream.as_bytes()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContentSafety);
    assert!(err.to_string().contains("bar/leaked"));
    assert!(err.to_string().contains("db.yaml"));
}

#[test]
fn test_age_ciphertext_in_data() {
    let identity = age::x25519::Identity::generate();
    let ciphertext = age_encrypt("password: hunter2\n", &identity.to_public());
    let stream = secret_doc("leaked", "values", ciphertext.as_bytes());

    let err = check_secrets(stream.as_bytes()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContentSafety);
}
