//! # Age Identity Decryption
//!
//! In-place decryption of ASCII-armored age files using one or more identities.
//!
//! Each candidate file is rewritten on the same open handle: read, decrypt,
//! truncate, seek to start, write. Path and permissions are preserved.

use crate::constants::AGE_ARMOR_HEADER;
use crate::error::{IoContext, PluginError, Result};
use crate::tree;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zeroize::Zeroize;

/// Decrypt every armored age file under `root` with the identities in `identity_data`
///
/// Returns the number of files rewritten. Files already rewritten stay
/// rewritten if a later file fails.
pub fn decrypt_recursive(
    root: &Path,
    identity_data: &[u8],
    cancel: &CancellationToken,
) -> Result<usize> {
    let identity_file = age::IdentityFile::from_buffer(identity_data).map_err(|e| {
        PluginError::Config(format!("unable to read age identities: {e}"))
    })?;
    let identities = identity_file
        .into_identities()
        .map_err(|e| PluginError::Config(format!("unable to parse age identities: {e}")))?;
    if identities.is_empty() {
        return Err(PluginError::Config(
            "age identity data does not contain any identity".to_string(),
        ));
    }
    let identities: Vec<&dyn age::Identity> = identities
        .iter()
        .map(|identity| &**identity as &dyn age::Identity)
        .collect();

    let mut decrypted = 0;
    for entry in tree::regular_files(root, &[]) {
        let entry = entry?;
        if cancel.is_cancelled() {
            return Err(PluginError::Cancelled {
                operation: "age decryption".to_string(),
            });
        }
        if decrypt_file_in_place(entry.path(), &identities)? {
            debug!(path = %entry.path().display(), "decrypted age file");
            decrypted += 1;
        }
    }
    Ok(decrypted)
}

/// Decrypt `path` in place if it starts with the age armor header
///
/// Returns `false` (file untouched) for anything else.
fn decrypt_file_in_place(path: &Path, identities: &[&dyn age::Identity]) -> Result<bool> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .io_context(|| format!("unable to open {}", path.display()))?;

    if !starts_with_armor_header(&mut file, path)? {
        return Ok(false);
    }

    file.seek(SeekFrom::Start(0))
        .io_context(|| format!("unable to seek {}", path.display()))?;
    let mut ciphertext = Vec::new();
    file.read_to_end(&mut ciphertext)
        .io_context(|| format!("unable to read {}", path.display()))?;

    let mut plaintext = decrypt_armored(&ciphertext, identities).map_err(|message| {
        PluginError::Decryption {
            path: path.to_path_buf(),
            message,
        }
    })?;

    file.set_len(0)
        .io_context(|| format!("unable to truncate {}", path.display()))?;
    file.seek(SeekFrom::Start(0))
        .io_context(|| format!("unable to seek {}", path.display()))?;
    let written = file
        .write_all(&plaintext)
        .io_context(|| format!("unable to write {}", path.display()));
    plaintext.zeroize();
    written?;

    Ok(true)
}

fn starts_with_armor_header(file: &mut File, path: &Path) -> Result<bool> {
    let mut head = Vec::with_capacity(AGE_ARMOR_HEADER.len());
    file.take(AGE_ARMOR_HEADER.len() as u64)
        .read_to_end(&mut head)
        .io_context(|| format!("unable to read {}", path.display()))?;
    Ok(head == AGE_ARMOR_HEADER)
}

fn decrypt_armored(
    ciphertext: &[u8],
    identities: &[&dyn age::Identity],
) -> std::result::Result<Vec<u8>, String> {
    let reader = age::armor::ArmoredReader::new(ciphertext);
    let decryptor = age::Decryptor::new(reader).map_err(|e| e.to_string())?;

    let mut plaintext = Vec::new();
    let mut stream = decryptor
        .decrypt(identities.iter().copied())
        .map_err(|e| e.to_string())?;
    stream
        .read_to_end(&mut plaintext)
        .map_err(|e| e.to_string())?;
    Ok(plaintext)
}
