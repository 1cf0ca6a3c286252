//! Common fixtures for the plugin integration tests
//!
//! Builds throwaway application source trees and age ciphertext.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use age::secrecy::ExposeSecret;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use strongbox_plugin::secret::{InMemorySecretStore, SecretResolver};
use tempfile::TempDir;

pub const ALLOWED_NAMESPACES_ANNOTATION: &str = "argocd-strongbox.plugin.io/allowed-namespaces";

pub const STRONGBOX_CIPHERTEXT: &str =
    "# STRONGBOX ENCRYPTED RESOURCE ; See https://github.com/uw-labs/strongbox\nc2VjcmV0\n";

/// Source tree populated with `(relative path, content)` pairs
pub fn source_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        write(dir.path(), path, content);
    }
    dir
}

pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).unwrap()
}

pub fn resolver(store: Arc<InMemorySecretStore>) -> SecretResolver {
    SecretResolver::new(store, ALLOWED_NAMESPACES_ANNOTATION)
}

/// Identity file content, as stored under `.strongbox_identity`
pub fn identity_file(identities: &[&age::x25519::Identity]) -> String {
    let mut out = String::new();
    for identity in identities {
        out.push_str("# public key: ");
        out.push_str(&identity.to_public().to_string());
        out.push('\n');
        out.push_str(identity.to_string().expose_secret());
        out.push('\n');
    }
    out
}

/// ASCII-armored age ciphertext of `plaintext` for `recipient`
pub fn age_encrypt(plaintext: &str, recipient: &age::x25519::Recipient) -> String {
    let encryptor =
        age::Encryptor::with_recipients(std::iter::once(recipient as &dyn age::Recipient))
            .unwrap();
    let mut encrypted = Vec::new();
    let mut writer = encryptor
        .wrap_output(
            age::armor::ArmoredWriter::wrap_output(&mut encrypted, age::armor::Format::AsciiArmor)
                .unwrap(),
        )
        .unwrap();
    writer.write_all(plaintext.as_bytes()).unwrap();
    writer.finish().unwrap().finish().unwrap();
    String::from_utf8(encrypted).unwrap()
}
