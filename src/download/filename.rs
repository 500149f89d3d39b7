//! Destination filename derivation for downloaded documents.
//!
//! Filenames must be stable per URL: the idempotent skip-if-present check
//! relies on a rerun deriving the same name, so there is no unique-suffix
//! scheme here.

use url::Url;

/// Derives the destination filename from a document URL.
///
/// Uses the last non-empty path segment, percent-decoded and sanitized for
/// filesystem safety. URLs without a usable segment fall back to a stable
/// host-derived name.
#[must_use]
pub(crate) fn filename_from_url(url: &Url) -> String {
    if let Some(segments) = url.path_segments() {
        if let Some(last) = segments.filter(|s| !s.is_empty()).next_back() {
            let decoded = urlencoding::decode(last)
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_else(|_| last.to_string());
            let sanitized = sanitize_filename(&decoded);
            if !sanitized.trim_matches('_').is_empty() {
                return sanitized;
            }
        }
    }

    let host = url.host_str().unwrap_or("document");
    sanitize_filename(&format!("{}.pdf", host.replace('.', "-")))
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems and rewrites
/// dot-only segments so the result can never escape the output directory.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }
    if matches!(sanitized.as_str(), "." | "..") {
        return sanitized.chars().map(|_| '_').collect();
    }
    sanitized
}
