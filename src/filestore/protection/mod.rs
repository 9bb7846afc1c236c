//! Server-level protection artifacts for upload directories.
//!
//! A directory is PROTECTED while the rule file of the currently selected
//! server flavor exists inside it. `create_protection` moves it to PROTECTED
//! (rewriting the file in place when it already is), `delete_protection` back
//! to UNPROTECTED; deleting an absent artifact is a successful no-op. Writes go
//! through a temporary file renamed into place, so readers never observe a
//! partially written rule set. Concurrent calls for one directory are
//! last-writer-wins.

pub mod apache;
pub mod flavor;
pub mod nginx;

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use atomic_write_file::AtomicWriteFile;
use tracing::{debug, info, warn};

pub use flavor::{probe_for, EnvServerProbe, ProtectionStrategy, ServerProbe, SoftwareStringProbe};

use super::host_path::{is_prefix_path, normalize_abs_path};
use crate::config::{EffectiveProtection, LockFileTypes, Settings};

/// Object type used in rewrite targets when the caller names none.
pub const DEFAULT_OBJECT_TYPE: &str = "attachment";

/// Object types travel into rule files verbatim, so only `[a-z0-9_-]+` is accepted.
pub fn is_valid_object_type(object_type: &str) -> bool {
    !object_type.is_empty()
        && object_type.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// Which requests a rule applies to. Extension lists are pre-joined as `a|b|c`.
pub(crate) enum Coverage {
    All,
    Only(String),
    AllExcept(String),
}

/// Everything a renderer needs for one directory.
pub(crate) struct RuleContext<'a> {
    pub protection: &'a EffectiveProtection,
    pub object_type: &'a str,
    /// Directory path relative to the upload root, '/'-terminated, or empty.
    pub file_prefix: String,
}

impl RuleContext<'_> {
    /// Rewrite target up to (not including) the captured file name.
    pub fn delivery_target(&self) -> String {
        format!(
            "{}{}?object_type={}&file={}",
            self.protection.home_path, self.protection.delivery_script, self.object_type, self.file_prefix
        )
    }

    /// An empty extension list falls back to covering everything.
    pub fn coverage(&self) -> Coverage {
        let exts = self.protection.file_types.join("|");
        match self.protection.lock_file_types {
            _ if exts.is_empty() => Coverage::All,
            LockFileTypes::All => Coverage::All,
            LockFileTypes::Selected => Coverage::Only(exts),
            LockFileTypes::NotSelected => Coverage::AllExcept(exts),
        }
    }
}

pub struct FileProtection {
    settings: Arc<Settings>,
    probe: Arc<dyn ServerProbe>,
}

impl FileProtection {
    pub fn new(settings: Arc<Settings>, probe: Arc<dyn ServerProbe>) -> Self {
        Self { settings, probe }
    }

    /// Use the probe implied by `settings.server_software`.
    pub fn from_settings(settings: Arc<Settings>) -> Self {
        let probe = probe_for(&settings);
        Self::new(settings, probe)
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// Strategy for this moment; re-evaluated on every call.
    pub fn strategy(&self) -> ProtectionStrategy {
        ProtectionStrategy::select(self.probe.as_ref())
    }

    /// Protect `dir` (the upload directory when `None`). `false` when no
    /// directory is known or the artifact cannot be written.
    pub fn create_protection(&self, dir: Option<&Path>, object_type: Option<&str>) -> bool {
        let Some(dir) = self.target_dir(dir) else {
            warn!(target: "filewarden::protection", "create_protection skipped: no directory given and upload_dir is not configured");
            return false;
        };
        let strategy = self.strategy();
        match self.write_artifact(strategy, dir, object_type.unwrap_or(DEFAULT_OBJECT_TYPE)) {
            Ok(path) => {
                info!(target: "filewarden::protection", "{} protection written to {}", strategy.as_str(), path.display());
                true
            }
            Err(e) => {
                warn!(target: "filewarden::protection", "cannot protect {}: {:#}", dir.display(), e);
                false
            }
        }
    }

    /// Remove the artifact from `dir` (the upload directory when `None`).
    /// Removing an absent artifact succeeds.
    pub fn delete_protection(&self, dir: Option<&Path>) -> bool {
        let Some(dir) = self.target_dir(dir) else {
            warn!(target: "filewarden::protection", "delete_protection skipped: no directory given and upload_dir is not configured");
            return false;
        };
        let strategy = self.strategy();
        let path = dir.join(strategy.file_name());
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(target: "filewarden::protection", "{} protection removed from {}", strategy.as_str(), dir.display());
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(target: "filewarden::protection", "no {} artifact in {}", strategy.as_str(), dir.display());
                true
            }
            Err(e) => {
                warn!(target: "filewarden::protection", "cannot remove {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Whether the current strategy's artifact exists in `dir` (upload directory when `None`).
    pub fn is_protected(&self, dir: Option<&Path>) -> bool {
        match self.target_dir(dir) {
            Some(dir) => dir.join(self.strategy().file_name()).is_file(),
            None => false,
        }
    }

    /// Bring the upload directory in line with `lock_file`.
    pub fn sync(&self) -> bool {
        if self.settings.lock_file {
            self.create_protection(None, None)
        } else {
            self.delete_protection(None)
        }
    }

    fn target_dir<'a>(&'a self, dir: Option<&'a Path>) -> Option<&'a Path> {
        dir.or(self.settings.upload_dir.as_deref())
    }

    fn write_artifact(&self, strategy: ProtectionStrategy, dir: &Path, object_type: &str) -> Result<PathBuf> {
        if !is_valid_object_type(object_type) {
            bail!("invalid object type '{}'", object_type);
        }
        if !dir.is_dir() {
            bail!("not a directory");
        }
        let protection = self.settings.protection_for(dir);
        let rule = RuleContext { protection: &protection, object_type, file_prefix: self.file_prefix(dir) };
        let content = match strategy {
            ProtectionStrategy::Apache => apache::render(&rule),
            ProtectionStrategy::Nginx => {
                let root = protection.site_root.as_deref().ok_or_else(|| anyhow!("site_root is required for nginx rules"))?;
                nginx::render(&rule, &url_location(root, dir)?)
            }
        };
        let path = dir.join(strategy.file_name());
        write_atomically(&path, content.as_bytes())?;
        Ok(path)
    }

    fn file_prefix(&self, dir: &Path) -> String {
        let Some(upload) = self.settings.upload_dir.as_deref() else { return String::new() };
        match (normalize_abs_path(upload), normalize_abs_path(dir)) {
            (Ok(upload), Ok(dir)) if is_prefix_path(&dir, &upload) => {
                dir.strip_prefix(&upload).map(slash_joined).unwrap_or_default()
            }
            _ => String::new(),
        }
    }
}

/// URL path of `dir` below the site root, e.g. `/wp-content/uploads/`.
pub(crate) fn url_location(site_root: &Path, dir: &Path) -> Result<String> {
    let root = normalize_abs_path(site_root)?;
    let dir = normalize_abs_path(dir)?;
    let rel = dir.strip_prefix(&root).with_context(|| format!("{} is outside site_root {}", dir.display(), root.display()))?;
    let location = format!("/{}", slash_joined(rel));
    if let Some(c) = location.chars().find(|&c| breaks_nginx_token(c)) {
        bail!("{:?} in {} cannot be used in an nginx location", c, location);
    }
    Ok(location)
}

/// Characters that end or quote a bare nginx configuration token.
fn breaks_nginx_token(c: char) -> bool {
    c.is_whitespace() || c.is_control() || matches!(c, '{' | '}' | ';' | '"' | '\'' | '\\' | '#' | '$')
}

/// Normal components joined with '/', each followed by '/'.
fn slash_joined(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(format!("{}/", s.to_string_lossy())),
            _ => None,
        })
        .collect()
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = AtomicWriteFile::open(path).with_context(|| format!("staging {}", path.display()))?;
    file.write_all(bytes)?;
    file.commit().with_context(|| format!("committing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "protection_tests.rs"]
mod tests;
