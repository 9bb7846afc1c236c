use anyhow::{bail, Result};
use path_absolutize::Absolutize;
use std::fs;
use std::path::{Path, PathBuf};

use super::paths::split_normalized_segments;

/// Normalize a host path to an absolute path without resolving symlinks.
pub fn normalize_abs_path(p: &Path) -> Result<PathBuf> {
    Ok(p.absolutize()?.to_path_buf())
}

/// Map a requested relative path onto a file under `root`.
/// The request is validated segment by segment, the result must stay inside
/// `root`, and no component below `root` (directory or file) may be a symlink.
pub fn resolve_under_root(root: &Path, requested: &str) -> Result<PathBuf> {
    let segments = split_normalized_segments(requested)?;
    let root_abs = normalize_abs_path(root)?;
    let mut candidate = root_abs.clone();
    for seg in &segments {
        candidate.push(seg);
        if is_symlink(&candidate) {
            bail!("symlinks are not served");
        }
    }
    let candidate = normalize_abs_path(&candidate)?;
    if !is_prefix_path(&candidate, &root_abs) {
        bail!("requested path escapes the protected root");
    }
    Ok(candidate)
}

pub(crate) fn is_symlink(p: &Path) -> bool {
    match fs::symlink_metadata(p) {
        Ok(m) => m.file_type().is_symlink(),
        Err(_) => false,
    }
}

pub(crate) fn is_prefix_path(path: &Path, prefix: &Path) -> bool {
    // Compare component-wise to avoid false positives like /data/x vs /data2
    if cfg!(windows) {
        let pr = path.components().next();
        let rr = prefix.components().next();
        if pr != rr { return false; }
    }
    path.starts_with(prefix)
}
