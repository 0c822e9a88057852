use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Returns `parent/base` if nothing exists there, otherwise the first of
/// `base2`, `base3`, ... that is free.
///
/// Only checks at the moment of the call; another process creating the same
/// name afterwards is not detected.
pub fn next_available(parent: &Path, base: &str) -> PathBuf {
    let candidate = parent.join(base);
    if !exists(&candidate) {
        return candidate;
    }
    (2u64..)
        .map(|n| parent.join(format!("{}{}", base, n)))
        .find(|p| !exists(p))
        .unwrap_or(candidate)
}

pub fn create_versioned_dir(parent: &Path, base: &str) -> io::Result<PathBuf> {
    let dir = next_available(parent, base);
    fs::create_dir(&dir)?;
    Ok(dir)
}

fn exists(path: &Path) -> bool {
    // symlink_metadata so dangling links still count as taken
    fs::symlink_metadata(path).is_ok()
}
