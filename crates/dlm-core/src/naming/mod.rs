//! URL validation and target path resolution.
//!
//! A job may be added with an explicit file path, an existing directory, or
//! nothing at all. In the latter two cases the file name is taken from the
//! probe's `Content-Disposition`, else from the last URL path segment, and
//! sanitized before it touches the filesystem.

mod disposition;
mod sanitize;

pub use disposition::disposition_file_name;
pub use sanitize::sanitize_file_name;

use std::path::{Path, PathBuf};

use crate::error::{DlmError, Result};

/// Used when neither the URL nor the server suggests a usable name.
pub const FALLBACK_FILE_NAME: &str = "download.bin";

/// Accepts only absolute http/https URLs with a host.
pub fn validate_url(raw: &str) -> Result<url::Url> {
    let invalid = |reason: String| DlmError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(parsed)
}

/// Last non-empty path segment of `url`, percent-decoded where possible.
pub fn file_name_from_url(url: &url::Url) -> Option<String> {
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = disposition::percent_decode(last);
    match decoded.as_str() {
        "" | "." | ".." => None,
        _ => Some(decoded),
    }
}

/// Picks a safe file name: disposition hint first, then the URL path.
pub fn derive_file_name(url: &url::Url, content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(disposition_file_name)
        .map(|n| sanitize_file_name(&n))
        .filter(|n| !n.is_empty())
        .or_else(|| {
            file_name_from_url(url)
                .map(|n| sanitize_file_name(&n))
                .filter(|n| !n.is_empty())
        })
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Resolves where a new job writes its bytes.
///
/// An empty `requested` path means `default_dir`; a path naming an existing
/// directory gets the derived file name appended; anything else is used as is.
pub fn resolve_target_path(
    requested: &str,
    url: &url::Url,
    content_disposition: Option<&str>,
    default_dir: &Path,
) -> PathBuf {
    let requested = requested.trim();
    let dir = if requested.is_empty() {
        Some(default_dir.to_path_buf())
    } else {
        let p = PathBuf::from(requested);
        p.is_dir().then_some(p)
    };
    match dir {
        Some(dir) => dir.join(derive_file_name(url, content_disposition)),
        None => PathBuf::from(requested),
    }
}

/// Display name for a target path: its final component.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
