//! # Ciphertext Detection
//!
//! Cheap checks for strongbox and age ciphertext markers.
//!
//! Markers are compared as byte prefixes/substrings, never as regexes.

use crate::constants::{AGE_ARMOR_HEADER, CIPHERTEXT_SNIFF_LEN, STRONGBOX_ENCRYPTED_PREFIX};
use crate::error::{IoContext, Result};
use crate::tree;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// True when `value` begins with either ciphertext marker
pub fn starts_with_ciphertext_marker(value: &[u8]) -> bool {
    value.starts_with(STRONGBOX_ENCRYPTED_PREFIX) || value.starts_with(AGE_ARMOR_HEADER)
}

/// True when either marker appears anywhere in `chunk`
pub fn contains_ciphertext_marker(chunk: &[u8]) -> bool {
    contains(chunk, STRONGBOX_ENCRYPTED_PREFIX) || contains(chunk, AGE_ARMOR_HEADER)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Report whether any regular file under `root` carries a ciphertext marker
///
/// Only the first [`CIPHERTEXT_SNIFF_LEN`] bytes of each file are read. The
/// walk stops at the first hit; `.git` is never descended into.
pub fn has_ciphertext(root: &Path) -> Result<bool> {
    for entry in tree::regular_files(root, &[]) {
        let entry = entry?;
        if file_head_has_marker(entry.path())? {
            debug!(path = %entry.path().display(), "found encrypted file");
            return Ok(true);
        }
    }
    Ok(false)
}

fn file_head_has_marker(path: &Path) -> Result<bool> {
    let file = File::open(path).io_context(|| format!("unable to open {}", path.display()))?;

    let mut head = Vec::with_capacity(CIPHERTEXT_SNIFF_LEN);
    file.take(CIPHERTEXT_SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .io_context(|| format!("unable to read {}", path.display()))?;

    Ok(contains_ciphertext_marker(&head))
}
