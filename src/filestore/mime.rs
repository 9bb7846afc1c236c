//! Content-type detection: an ordered chain of detectors, each of which may
//! decline, ending in the generic binary type.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::{file_extension, MimeDetectorKind, Settings};

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Bytes read from the head of a file for signature sniffing.
const SNIFF_LEN: usize = 512;

pub trait MimeDetector: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Classify `path`, or `None` when this detector cannot tell (or is unavailable).
    fn detect(&self, path: &Path) -> Option<String>;
}

/// Magic-number sniffing over the first bytes of the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureDetector;

impl SignatureDetector {
    pub fn sniff(head: &[u8]) -> Option<&'static str> {
        if head.is_empty() {
            return None;
        }
        const MAGIC: &[(&[u8], &str)] = &[
            (b"\x89PNG\r\n\x1a\n", "image/png"),
            (b"\xff\xd8\xff", "image/jpeg"),
            (b"GIF87a", "image/gif"),
            (b"GIF89a", "image/gif"),
            (b"II*\x00", "image/tiff"),
            (b"MM\x00*", "image/tiff"),
            (b"\x00\x00\x01\x00", "image/x-icon"),
            (b"%PDF-", "application/pdf"),
            (b"PK\x03\x04", "application/zip"),
            (b"PK\x05\x06", "application/zip"),
            (b"PK\x07\x08", "application/zip"),
            (b"\x1f\x8b", "application/gzip"),
            (b"Rar!\x1a\x07", "application/x-rar-compressed"),
            (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
            (b"ID3", "audio/mpeg"),
            (b"OggS", "audio/ogg"),
            (b"fLaC", "audio/flac"),
            (b"\x1a\x45\xdf\xa3", "video/webm"),
        ];
        for &(magic, mime) in MAGIC {
            if head.starts_with(magic) {
                return Some(mime);
            }
        }
        if head.len() >= 12 && head.starts_with(b"RIFF") {
            match &head[8..12] {
                b"WEBP" => return Some("image/webp"),
                b"WAVE" => return Some("audio/wav"),
                b"AVI " => return Some("video/x-msvideo"),
                _ => {}
            }
        }
        if head.len() >= 12 && &head[4..8] == b"ftyp" {
            return Some(if &head[8..12] == b"qt  " { "video/quicktime" } else { "video/mp4" });
        }
        sniff_text(head)
    }
}

fn sniff_text(head: &[u8]) -> Option<&'static str> {
    if head.contains(&0) {
        return None;
    }
    // A multi-byte sequence cut off by the sniff window is still text.
    if let Err(e) = std::str::from_utf8(head) {
        if e.error_len().is_some() {
            return None;
        }
    }
    let lower = String::from_utf8_lossy(head).trim_start().to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        Some("text/html")
    } else if lower.starts_with("<svg") || (lower.starts_with("<?xml") && lower.contains("<svg")) {
        Some("image/svg+xml")
    } else if lower.starts_with("<?xml") {
        Some("application/xml")
    } else {
        Some("text/plain")
    }
}

impl MimeDetector for SignatureDetector {
    fn name(&self) -> &'static str { "signature" }

    fn detect(&self, path: &Path) -> Option<String> {
        let mut file = File::open(path).ok()?;
        let mut head = Vec::with_capacity(SNIFF_LEN);
        file.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut head).ok()?;
        Self::sniff(&head).map(str::to_string)
    }
}

/// Lookup through a system `mime.types` database (`type ext ext ...` per line).
/// Unavailable, and therefore declining, when the database cannot be read.
#[derive(Debug)]
pub struct MimeTypesFile {
    path: PathBuf,
    table: OnceCell<Option<HashMap<String, String>>>,
}

impl MimeTypesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), table: OnceCell::new() }
    }

    pub fn parse(raw: &str) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for line in raw.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let mut parts = line.split_whitespace();
            let Some(mime) = parts.next() else { continue };
            if !mime.contains('/') {
                continue;
            }
            for ext in parts {
                out.entry(ext.to_ascii_lowercase()).or_insert_with(|| mime.to_string());
            }
        }
        out
    }

    fn table(&self) -> Option<&HashMap<String, String>> {
        self.table
            .get_or_init(|| match std::fs::read_to_string(&self.path) {
                Ok(raw) => Some(Self::parse(&raw)),
                Err(e) => {
                    debug!(target: "filewarden::delivery", "mime.types unavailable at {}: {}", self.path.display(), e);
                    None
                }
            })
            .as_ref()
    }
}

impl MimeDetector for MimeTypesFile {
    fn name(&self) -> &'static str { "mime_types_file" }

    fn detect(&self, path: &Path) -> Option<String> {
        let table = self.table()?;
        let ext = file_extension(&path.file_name()?.to_string_lossy())?;
        table.get(&ext).cloned()
    }
}

/// Lookup in the configured extension table.
#[derive(Debug, Clone, Default)]
pub struct ExtensionTable {
    table: BTreeMap<String, String>,
}

impl ExtensionTable {
    pub fn new(table: BTreeMap<String, String>) -> Self {
        let table = table.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();
        Self { table }
    }
}

impl MimeDetector for ExtensionTable {
    fn name(&self) -> &'static str { "extension_table" }

    fn detect(&self, path: &Path) -> Option<String> {
        let ext = file_extension(&path.file_name()?.to_string_lossy())?;
        self.table.get(&ext).cloned()
    }
}

/// Ordered detectors; the first one that answers wins.
#[derive(Default)]
pub struct MimeDetectorChain {
    detectors: Vec<Box<dyn MimeDetector>>,
}

impl MimeDetectorChain {
    pub fn new() -> Self { Self { detectors: Vec::new() } }

    pub fn register<D>(&mut self, detector: D)
    where
        D: MimeDetector + 'static,
    {
        self.detectors.push(Box::new(detector));
    }

    /// Build the chain in the order `settings.mime_detection` lists.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut chain = Self::new();
        for kind in &settings.mime_detection {
            match kind {
                MimeDetectorKind::Signature => chain.register(SignatureDetector),
                MimeDetectorKind::MimeTypesFile => chain.register(MimeTypesFile::new(settings.mime_types_file.clone())),
                MimeDetectorKind::ExtensionTable => chain.register(ExtensionTable::new(settings.mime_types.clone())),
            }
        }
        chain
    }

    pub fn detectors(&self) -> &[Box<dyn MimeDetector>] {
        &self.detectors
    }

    pub fn resolve(&self, path: &Path) -> String {
        for detector in &self.detectors {
            if let Some(mime) = detector.detect(path) {
                debug!(target: "filewarden::delivery", "mime {} for {} via {}", mime, path.display(), detector.name());
                return mime;
            }
        }
        debug!(target: "filewarden::delivery", "no detector matched {}; using {}", path.display(), OCTET_STREAM);
        OCTET_STREAM.to_string()
    }
}

#[cfg(test)]
#[path = "mime_tests.rs"]
mod tests;
