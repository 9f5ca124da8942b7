//! Filesystem-safe names and download URL checks.
//!
//! Identifiers come straight from remote APIs (DOIs, titles, arXiv ids) and
//! end up as directory names, so every path component built from them goes
//! through [`sanitize_path_component`].

use thiserror::Error;

/// Longest component most filesystems accept, in bytes
const MAX_COMPONENT_BYTES: usize = 255;

/// Validation error types
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL contains potentially dangerous characters")]
    DangerousUrl,
}

/// Make a string safe to use as a single path component.
///
/// Path separators, characters reserved on Windows and control characters
/// become `_`. Trailing dots and spaces are stripped. Names that would still
/// resolve to the current or parent directory, or nothing at all, become `_`.
pub fn sanitize_path_component(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_end_matches(['.', ' ']);

    match trimmed {
        "" | "." | ".." => "_".to_string(),
        name => truncate_to_boundary(name, MAX_COMPONENT_BYTES).to_string(),
    }
}

fn truncate_to_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Check that a URL pulled out of an API response is safe to download.
///
/// Only absolute http(s) URLs without embedded line breaks are accepted.
pub fn validate_download_url(url: &str) -> Result<String, ValidationError> {
    let url = url.trim();

    if url.is_empty() {
        return Err(ValidationError::InvalidUrl("empty URL".to_string()));
    }

    if url.contains('\n') || url.contains('\r') || url.contains('\0') {
        return Err(ValidationError::DangerousUrl);
    }

    let parsed = url::Url::parse(url).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(ValidationError::InvalidUrl(format!(
            "invalid scheme: {}",
            other
        ))),
    }
}
