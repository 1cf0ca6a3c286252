//! # Source Tree Walking
//!
//! Shared directory walk used by ciphertext detection, in-place decryption and
//! kustomization discovery. Version control metadata is never descended into.
//! Also home to the owner-only file helpers used for key material.

use crate::constants::GIT_DIR;
use crate::error::{IoContext, PluginError, Result};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Iterate over every regular file under `root`, skipping `.git` and any extra
/// directory names given in `skip_dirs`
///
/// Walk errors (including files vanishing mid-walk) are yielded, not swallowed.
pub(crate) fn regular_files<'a>(
    root: &Path,
    skip_dirs: &'a [&'a str],
) -> impl Iterator<Item = Result<DirEntry>> + 'a {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(move |entry| !is_skipped_dir(entry, skip_dirs))
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(Ok(entry)),
            Ok(_) => None,
            Err(e) => Some(Err(walk_error(e))),
        })
}

/// Write `contents` to `path` readable by the owner only (0600 on unix)
///
/// Permissions are reset even when the file already existed.
pub(crate) fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .io_context(|| format!("unable to create {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .io_context(|| format!("unable to set permissions on {}", path.display()))?;
    }

    file.write_all(contents)
        .io_context(|| format!("unable to write {}", path.display()))
}

/// Create `path` (and parents) accessible by the owner only (0700 on unix)
pub(crate) fn create_private_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .io_context(|| format!("unable to create directory {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .io_context(|| format!("unable to set permissions on {}", path.display()))?;
    }
    Ok(())
}

fn is_skipped_dir(entry: &DirEntry, skip_dirs: &[&str]) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name == GIT_DIR || skip_dirs.contains(&name))
}

fn walk_error(e: walkdir::Error) -> PluginError {
    let context = match e.path() {
        Some(path) => format!("unable to walk {}", path.display()),
        None => "unable to walk source tree".to_string(),
    };
    PluginError::io(context, std::io::Error::from(e))
}
