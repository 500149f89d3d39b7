//! Structured extraction of document links and pagination controls.
//!
//! All HTML inspection goes through `scraper`'s DOM querying. Matching on
//! raw markup text would couple extraction to attribute ordering and
//! whitespace, so it is deliberately absent here.

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::DiscoveryError;
use crate::store::DocumentReference;

/// Text fragments identifying a next-page control.
const NEXT_NEEDLES: [&str; 4] = ["next", ">", "\u{203a}", "\u{bb}"];

/// Extracts document references from a rendered listing page.
///
/// An anchor counts as a reference iff its href, resolved against
/// `base_url`, ends with `suffix` (case-insensitive). Relative hrefs that
/// cannot be resolved are skipped.
pub(crate) fn extract_references(
    html: &str,
    base_url: &str,
    results_selector: &str,
    suffix: &str,
    page: u32,
) -> Result<Vec<DocumentReference>, DiscoveryError> {
    let anchor_selector = parse_selector(&format!("{results_selector} a"))?;
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    let suffix = suffix.to_lowercase();

    let mut references = Vec::new();
    for anchor in document.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_href(base.as_ref(), href) else {
            debug!(href, "skipping unresolvable href");
            continue;
        };
        if resolved.as_str().to_lowercase().ends_with(&suffix) {
            references.push(DocumentReference::with_origin(resolved, page));
        }
    }
    Ok(references)
}

/// Whether the pagination container holds an enabled next-page control.
///
/// A control qualifies when its text contains one of the next-page needles
/// and, for buttons, the `disabled` attribute is absent.
pub(crate) fn has_enabled_next(
    html: &str,
    pagination_selector: &str,
) -> Result<bool, DiscoveryError> {
    let control_selector = parse_selector(&format!(
        "{pagination_selector} button, {pagination_selector} a"
    ))?;
    let document = Html::parse_document(html);

    for control in document.select(&control_selector) {
        let text = control.text().collect::<String>().trim().to_lowercase();
        if !NEXT_NEEDLES.iter().any(|needle| text.contains(needle)) {
            continue;
        }
        if control.value().name() == "button" && control.value().attr("disabled").is_some() {
            continue;
        }
        return Ok(true);
    }
    Ok(false)
}

fn parse_selector(selector: &str) -> Result<Selector, DiscoveryError> {
    Selector::parse(selector).map_err(|e| DiscoveryError::selector(selector, e.to_string()))
}

fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(Into::into),
        None => Url::parse(href).ok().map(Into::into),
    }
}
