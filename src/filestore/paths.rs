use anyhow::{bail, Result};
use unicode_normalization::UnicodeNormalization;

/// Normalize a UTF-8 string to NFC.
pub fn normalize_nfc(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// Validate a requested file path relative to the protected root:
/// - segments separated by '/', no backslashes
/// - NUL not allowed
/// - no leading/trailing '/', no empty segments
/// - no '.' or '..' segments
pub fn validate_request_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("requested path cannot be empty");
    }
    if path.contains('\u{0000}') {
        bail!("requested path cannot contain NUL characters");
    }
    if path.contains('\\') {
        bail!("backslashes are not allowed in requested paths");
    }
    if path.starts_with('/') || path.ends_with('/') {
        bail!("leading or trailing '/' is not allowed in requested paths");
    }
    for seg in path.split('/') {
        if seg.is_empty() {
            bail!("empty segment in requested path");
        }
        if seg == "." || seg == ".." {
            bail!("segments '.' and '..' are not allowed");
        }
    }
    Ok(())
}

/// Split a requested path into NFC-normalized segments. Validation is performed first.
pub fn split_normalized_segments(path: &str) -> Result<Vec<String>> {
    validate_request_path(path)?;
    let n = normalize_nfc(path);
    Ok(n.split('/').map(|s| s.to_string()).collect())
}
