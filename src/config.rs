//! Runtime settings: a JSON settings file, environment overrides on top, and
//! per-directory protection overrides resolved into an `EffectiveProtection`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How the body of a non-image download is transferred.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadType {
    /// Whole file in one copy operation.
    #[default]
    #[serde(alias = "normal")]
    Bulk,
    /// Fixed 1024-byte reads, extending the time budget between chunks.
    #[serde(alias = "fopen")]
    Chunked,
}

impl std::str::FromStr for DownloadType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bulk" | "normal" => Ok(DownloadType::Bulk),
            "chunked" | "fopen" => Ok(DownloadType::Chunked),
            other => anyhow::bail!("unknown download type '{}'", other),
        }
    }
}

/// Which files a protection artifact covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockFileTypes {
    #[default]
    All,
    /// Only the extensions in `locked_file_types`.
    Selected,
    /// Everything except the extensions in `not_locked_file_types`.
    NotSelected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MimeDetectorKind {
    /// Content sniffing of the file's leading bytes.
    Signature,
    /// Lookup in the system `mime.types` database.
    MimeTypesFile,
    /// Lookup in `Settings::mime_types`.
    ExtensionTable,
}

fn default_home_path() -> String { "/".to_string() }
fn default_delivery_script() -> String { "protected-file".to_string() }
fn default_locked_file_types() -> String { "zip,rar,tar,gz,pdf".to_string() }
fn default_not_locked_file_types() -> String { "gif,jpg,jpeg,png,webp".to_string() }
fn default_mime_types_file() -> PathBuf { PathBuf::from("/etc/mime.types") }
fn default_http_port() -> u16 { 8088 }
fn default_access_header() -> String { "x-access-granted".to_string() }

fn default_mime_detection() -> Vec<MimeDetectorKind> {
    vec![MimeDetectorKind::Signature, MimeDetectorKind::MimeTypesFile, MimeDetectorKind::ExtensionTable]
}

fn default_image_extensions() -> Vec<String> {
    ["gif", "jpg", "jpeg", "png", "webp", "bmp", "svg", "ico"].iter().map(|s| s.to_string()).collect()
}

pub fn default_mime_types() -> BTreeMap<String, String> {
    [
        ("txt", "text/plain"),
        ("csv", "text/csv"),
        ("htm", "text/html"),
        ("html", "text/html"),
        ("css", "text/css"),
        ("js", "application/javascript"),
        ("json", "application/json"),
        ("xml", "application/xml"),
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
        ("gz", "application/gzip"),
        ("tar", "application/x-tar"),
        ("rar", "application/x-rar-compressed"),
        ("doc", "application/msword"),
        ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        ("xls", "application/vnd.ms-excel"),
        ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        ("ppt", "application/vnd.ms-powerpoint"),
        ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
        ("odt", "application/vnd.oasis.opendocument.text"),
        ("gif", "image/gif"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("png", "image/png"),
        ("webp", "image/webp"),
        ("svg", "image/svg+xml"),
        ("bmp", "image/bmp"),
        ("ico", "image/x-icon"),
        ("mp3", "audio/mpeg"),
        ("wav", "audio/wav"),
        ("ogg", "audio/ogg"),
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),
        ("mov", "video/quicktime"),
        ("avi", "video/x-msvideo"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Global settings. Every field has a default so partial JSON files load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Protected upload root; protection calls without a directory act here.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
    /// Document root of the site, used to derive Nginx location paths.
    #[serde(default)]
    pub site_root: Option<PathBuf>,
    /// URL path of the site home, e.g. "/" or "/blog/".
    #[serde(default = "default_home_path")]
    pub home_path: String,
    /// Delivery endpoint, relative to `home_path`.
    #[serde(default = "default_delivery_script")]
    pub delivery_script: String,

    #[serde(default)]
    pub lock_file: bool,
    /// When true, rules rewrite direct hits to the delivery endpoint; otherwise they deny outright.
    #[serde(default)]
    pub permalinks_active: bool,
    #[serde(default)]
    pub lock_file_types: LockFileTypes,
    /// Comma separated extension list.
    #[serde(default = "default_locked_file_types")]
    pub locked_file_types: String,
    /// Comma separated extension list.
    #[serde(default = "default_not_locked_file_types")]
    pub not_locked_file_types: String,
    #[serde(default)]
    pub directory_overrides: BTreeMap<PathBuf, ProtectionOverride>,

    #[serde(default)]
    pub download_type: DownloadType,
    #[serde(default = "default_mime_types")]
    pub mime_types: BTreeMap<String, String>,
    #[serde(default = "default_mime_detection")]
    pub mime_detection: Vec<MimeDetectorKind>,
    #[serde(default = "default_mime_types_file")]
    pub mime_types_file: PathBuf,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    /// Extend the execution budget before every chunk of a chunked download.
    #[serde(default)]
    pub safe_mode: bool,
    /// Per-request time budget in seconds; unlimited when absent.
    #[serde(default)]
    pub execution_time_limit: Option<u64>,

    /// Overrides the `SERVER_SOFTWARE` probe when set.
    #[serde(default)]
    pub server_software: Option<String>,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Request header a fronting proxy sets once it has authorized the request.
    #[serde(default = "default_access_header")]
    pub access_header: String,
    /// Group ids (e.g. `role|editor`) allowed to download. When non-empty this
    /// replaces the proxy header check.
    #[serde(default)]
    pub allowed_groups: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_dir: None,
            site_root: None,
            home_path: default_home_path(),
            delivery_script: default_delivery_script(),
            lock_file: false,
            permalinks_active: false,
            lock_file_types: LockFileTypes::All,
            locked_file_types: default_locked_file_types(),
            not_locked_file_types: default_not_locked_file_types(),
            directory_overrides: BTreeMap::new(),
            download_type: DownloadType::Bulk,
            mime_types: default_mime_types(),
            mime_detection: default_mime_detection(),
            mime_types_file: default_mime_types_file(),
            image_extensions: default_image_extensions(),
            safe_mode: false,
            execution_time_limit: None,
            server_software: None,
            http_port: default_http_port(),
            access_header: default_access_header(),
            allowed_groups: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("parsing settings json")
    }

    /// Load from `path` when given (defaults otherwise), then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading settings file {}", p.display()))?;
                Self::from_json_str(&raw)?
            }
            None => Self::default(),
        };
        settings.apply_env_overrides(|k| std::env::var(k).ok())?;
        Ok(settings)
    }

    /// Overlay `FILEWARDEN_*` variables (and `SERVER_SOFTWARE`) read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FILEWARDEN_UPLOAD_DIR") {
            self.upload_dir = if v.trim().is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some(v) = lookup("FILEWARDEN_SITE_ROOT") {
            self.site_root = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FILEWARDEN_HTTP_PORT") {
            self.http_port = v.trim().parse().with_context(|| format!("FILEWARDEN_HTTP_PORT='{}'", v))?;
        }
        if let Some(v) = lookup("FILEWARDEN_LOCK_FILE") {
            self.lock_file = parse_bool(&v).with_context(|| format!("FILEWARDEN_LOCK_FILE='{}'", v))?;
        }
        if let Some(v) = lookup("FILEWARDEN_DOWNLOAD_TYPE") {
            self.download_type = v.parse()?;
        }
        if self.server_software.is_none() {
            self.server_software = lookup("SERVER_SOFTWARE");
        }
        Ok(())
    }

    /// The protection view for `dir`, with any per-directory override applied.
    pub fn protection_for(&self, dir: &Path) -> EffectiveProtection {
        EffectiveProtection::from_layers(self, self.directory_overrides.get(dir))
    }

    pub fn is_image_name(&self, file_name: &str) -> bool {
        match file_extension(file_name) {
            Some(ext) => self.image_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)),
            None => false,
        }
    }
}

/// Per-directory overrides for rule content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProtectionOverride {
    #[serde(default)]
    pub permalinks_active: Option<bool>,
    #[serde(default)]
    pub lock_file_types: Option<LockFileTypes>,
    #[serde(default)]
    pub locked_file_types: Option<String>,
    #[serde(default)]
    pub not_locked_file_types: Option<String>,
}

/// Fully resolved protection options used when rendering a rule file.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveProtection {
    pub permalinks_active: bool,
    pub lock_file_types: LockFileTypes,
    /// Cleaned extension list matching `lock_file_types` (empty for `All`).
    pub file_types: Vec<String>,
    pub home_path: String,
    pub delivery_script: String,
    pub site_root: Option<PathBuf>,
}

impl EffectiveProtection {
    pub fn from_layers(settings: &Settings, dir: Option<&ProtectionOverride>) -> Self {
        let permalinks_active = dir.and_then(|d| d.permalinks_active).unwrap_or(settings.permalinks_active);
        let lock_file_types = dir.and_then(|d| d.lock_file_types).unwrap_or(settings.lock_file_types);
        let locked = dir
            .and_then(|d| d.locked_file_types.clone())
            .unwrap_or_else(|| settings.locked_file_types.clone());
        let not_locked = dir
            .and_then(|d| d.not_locked_file_types.clone())
            .unwrap_or_else(|| settings.not_locked_file_types.clone());

        let file_types = match lock_file_types {
            LockFileTypes::All => Vec::new(),
            LockFileTypes::Selected => clean_file_types(&locked),
            LockFileTypes::NotSelected => clean_file_types(&not_locked),
        };

        Self {
            permalinks_active,
            lock_file_types,
            file_types,
            home_path: normalize_home_path(&settings.home_path),
            delivery_script: settings.delivery_script.trim_matches('/').to_string(),
            site_root: settings.site_root.clone(),
        }
    }
}

/// Split a comma separated extension list, dropping dots, blanks and anything
/// that is not a plain alphanumeric extension.
pub fn clean_file_types(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
        .collect();
    out.dedup();
    out
}

/// Lowercased extension after the final '.', if the name has one.
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn normalize_home_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() { "/".to_string() } else { format!("/{}/", trimmed) }
}

pub(crate) fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("not a boolean: '{}'", other),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
