//! Pagination-traversal state machine over a listing/search session.
//!
//! [`PaginatedDiscovery`] drives one listing or search session page by page,
//! extracting document references per page, subject to an optional page
//! range. Traversal follows a fixed state machine:
//!
//! ```text
//! NotStarted -> Navigated -> GateChecked -> Searched
//!     -> ExtractingPage(n) -> { ExtractingPage(n+1) | Done }
//! ```
//!
//! Advancing to the next page requires an enabled next-page control *and* a
//! successful click; otherwise traversal terminates. Discovery degrades
//! gracefully per page: a results container that never appears yields an
//! empty page, never a failed run.

mod extract;

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::session::{AcquisitionSession, NavigableSession, SessionError};
use crate::store::{DocumentReference, ReferenceStore, StoreError};

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The underlying browser session failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A configured CSS selector is invalid.
    #[error("invalid selector '{selector}': {message}")]
    Selector {
        /// The selector that failed to parse.
        selector: String,
        /// Parser diagnostic.
        message: String,
    },

    /// A query was supplied but the search controls never appeared.
    #[error("search controls unavailable at {url}")]
    SearchUnavailable {
        /// The listing root that was navigated to.
        url: String,
    },

    /// Persisting a page of references failed. Fatal: data integrity cannot
    /// be guaranteed past a dropped page.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DiscoveryError {
    /// Creates a selector error.
    pub fn selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Creates a search-unavailable error.
    pub fn search_unavailable(url: impl Into<String>) -> Self {
        Self::SearchUnavailable { url: url.into() }
    }
}

/// Inclusive page bound for a discovery run.
///
/// `end = None` means "until no next page". Parsed from `all`, `N`, `N-M`,
/// or `N-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange {
    /// First page to extract (1-based).
    pub start: u32,
    /// Last page to extract, inclusive; `None` continues until the listing
    /// runs out.
    pub end: Option<u32>,
}

impl PageRange {
    /// The unbounded range: every page from the first.
    #[must_use]
    pub fn all() -> Self {
        Self {
            start: 1,
            end: None,
        }
    }
}

impl Default for PageRange {
    fn default() -> Self {
        Self::all()
    }
}

/// Error for unparsable page range specifications.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid page range '{input}': expected 'all', 'N', 'N-M', or 'N-' with N >= 1")]
pub struct PageRangeError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for PageRange {
    type Err = PageRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PageRangeError {
            input: s.to_string(),
        };
        let trimmed = s.trim();

        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }

        let (start, end) = if let Some((start, end)) = trimmed.split_once('-') {
            let start: u32 = start.trim().parse().map_err(|_| invalid())?;
            let end = if end.trim().is_empty() {
                None
            } else {
                Some(end.trim().parse::<u32>().map_err(|_| invalid())?)
            };
            (start, end)
        } else {
            let page: u32 = trimmed.parse().map_err(|_| invalid())?;
            (page, Some(page))
        };

        if start == 0 || end.is_some_and(|end| end < start) {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }
}

/// Selectors and timing for one listing site.
///
/// Defaults match the production listing target; every field is
/// overridable for other sites.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Selector of the search input field.
    pub search_input: String,
    /// Selector of the search submit button.
    pub search_button: String,
    /// Selector of the results container.
    pub results_container: String,
    /// Selector of the pagination container.
    pub pagination: String,
    /// Document suffix a resolved href must end with (case-insensitive).
    pub document_suffix: String,
    /// Bounded wait for the results container per page.
    pub results_wait: Duration,
    /// Bounded wait for search controls.
    pub control_wait: Duration,
    /// Settle time after search submission and page turns.
    pub settle: Duration,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            search_input: "#searchInput".to_string(),
            search_button: "#searchButton".to_string(),
            results_container: "#results".to_string(),
            pagination: "#pagination".to_string(),
            document_suffix: ".pdf".to_string(),
            results_wait: Duration::from_secs(10),
            control_wait: Duration::from_secs(10),
            settle: Duration::from_secs(3),
        }
    }
}

/// Traversal states of one discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Nothing has happened yet.
    NotStarted,
    /// The listing root has been loaded.
    Navigated,
    /// The one-time interactive gate was attempted (passed or absent).
    GateChecked,
    /// The search query, if any, has been submitted.
    Searched,
    /// Reference extraction is running for this page.
    ExtractingPage(u32),
    /// Traversal finished.
    Done,
}

/// Counts from one discovery run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// References found across extracted pages (pre-dedup).
    pub found: usize,
    /// References actually added to the store (post-dedup).
    pub added: usize,
    /// Pages extracted.
    pub pages: u32,
}

/// Drives a listing/search session page by page.
pub struct PaginatedDiscovery<'a> {
    session: &'a AcquisitionSession,
    profile: SiteProfile,
}

impl<'a> PaginatedDiscovery<'a> {
    /// Creates a discovery over the shared session with the default profile.
    #[must_use]
    pub fn new(session: &'a AcquisitionSession) -> Self {
        Self::with_profile(session, SiteProfile::default())
    }

    /// Creates a discovery with an explicit site profile.
    #[must_use]
    pub fn with_profile(session: &'a AcquisitionSession, profile: SiteProfile) -> Self {
        Self { session, profile }
    }

    /// Runs discovery and collects every extracted reference in memory, in
    /// page order.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] on session-level failures; per-page
    /// degradation (missing results) is not an error.
    pub async fn run(
        &self,
        root_url: &str,
        query: Option<&str>,
        range: &PageRange,
    ) -> Result<Vec<DocumentReference>, DiscoveryError> {
        let mut all = Vec::new();
        self.traverse(root_url, query, range, |_, mut refs| {
            all.append(&mut refs);
            Ok(())
        })
        .await?;
        Ok(all)
    }

    /// Runs discovery, flushing each page's references into `store` as soon
    /// as the page is extracted, so a later crash loses at most the current
    /// page.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Store`] when a page cannot be persisted
    /// (fatal) and [`DiscoveryError`] on session-level failures.
    #[instrument(skip(self, store))]
    pub async fn run_into_store(
        &self,
        root_url: &str,
        query: Option<&str>,
        range: &PageRange,
        store: &mut ReferenceStore,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let mut report = DiscoveryReport::default();
        let pages = self
            .traverse(root_url, query, range, |page, refs| {
                report.found += refs.len();
                let added = store.append(&refs)?;
                report.added += added;
                debug!(page, found = refs.len(), added, "persisted page references");
                Ok(())
            })
            .await?;
        report.pages = pages;
        info!(
            found = report.found,
            added = report.added,
            pages = report.pages,
            "discovery complete"
        );
        Ok(report)
    }

    /// Core traversal loop; `on_page` is the per-page flush point.
    async fn traverse<F>(
        &self,
        root_url: &str,
        query: Option<&str>,
        range: &PageRange,
        mut on_page: F,
    ) -> Result<u32, DiscoveryError>
    where
        F: FnMut(u32, Vec<DocumentReference>) -> Result<(), StoreError>,
    {
        let browser = self.session.browser();
        let mut state = DiscoveryState::NotStarted;

        browser.navigate(root_url).await?;
        state = advance(state, DiscoveryState::Navigated);

        // The gate check happens at most once per run, before any search or
        // extraction; once confirmed for the session this is a no-op.
        self.session.ensure_past_gate(root_url).await?;
        state = advance(state, DiscoveryState::GateChecked);

        if let Some(query) = query {
            if !browser
                .wait_for(&self.profile.search_input, self.profile.control_wait)
                .await?
            {
                return Err(DiscoveryError::search_unavailable(root_url));
            }
            debug!(query, "submitting search");
            browser.fill(&self.profile.search_input, query).await?;
            browser.click(&self.profile.search_button).await?;
            tokio::time::sleep(self.profile.settle).await;
        }
        state = advance(state, DiscoveryState::Searched);

        // Pages strictly before the range start are clicked through, never
        // extracted.
        let mut page: u32 = 1;
        while page < range.start {
            debug!(page, start = range.start, "skipping page before range start");
            if !self.click_next(browser).await? {
                warn!(
                    start = range.start,
                    reached = page,
                    "listing ended before requested start page"
                );
                advance(state, DiscoveryState::Done);
                return Ok(0);
            }
            page += 1;
            tokio::time::sleep(self.profile.settle).await;
        }

        let mut pages_extracted: u32 = 0;
        loop {
            state = advance(state, DiscoveryState::ExtractingPage(page));
            let references = self.extract_current_page(browser, page).await?;
            debug!(page, found = references.len(), "extracted page");
            on_page(page, references)?;
            pages_extracted += 1;

            if range.end.is_some_and(|end| page >= end) {
                break;
            }
            if !self.has_next(browser).await? {
                break;
            }
            if !self.click_next(browser).await? {
                break;
            }
            page += 1;
            tokio::time::sleep(self.profile.settle).await;
        }

        advance(state, DiscoveryState::Done);
        Ok(pages_extracted)
    }

    /// Extracts references from the currently rendered page. A results
    /// container that never appears degrades to an empty page.
    async fn extract_current_page(
        &self,
        browser: &dyn NavigableSession,
        page: u32,
    ) -> Result<Vec<DocumentReference>, DiscoveryError> {
        if !browser
            .wait_for(&self.profile.results_container, self.profile.results_wait)
            .await?
        {
            warn!(page, "results container did not appear; treating page as empty");
            return Ok(Vec::new());
        }

        let html = browser.content().await?;
        let base = browser.current_url().await?;
        extract::extract_references(
            &html,
            &base,
            &self.profile.results_container,
            &self.profile.document_suffix,
            page,
        )
    }

    async fn has_next(&self, browser: &dyn NavigableSession) -> Result<bool, DiscoveryError> {
        let html = browser.content().await?;
        extract::has_enabled_next(&html, &self.profile.pagination)
    }

    async fn click_next(&self, browser: &dyn NavigableSession) -> Result<bool, DiscoveryError> {
        Ok(browser.click_next(&self.profile.pagination).await?)
    }
}

fn advance(from: DiscoveryState, to: DiscoveryState) -> DiscoveryState {
    debug!(?from, ?to, "discovery transition");
    to
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_page_range_all() {
        assert_eq!("all".parse::<PageRange>().unwrap(), PageRange::all());
        assert_eq!("ALL".parse::<PageRange>().unwrap(), PageRange::all());
    }

    #[test]
    fn test_page_range_bounded() {
        assert_eq!(
            "2-4".parse::<PageRange>().unwrap(),
            PageRange {
                start: 2,
                end: Some(4)
            }
        );
    }

    #[test]
    fn test_page_range_open_ended() {
        assert_eq!(
            "10-".parse::<PageRange>().unwrap(),
            PageRange {
                start: 10,
                end: None
            }
        );
    }

    #[test]
    fn test_page_range_single_page() {
        assert_eq!(
            "7".parse::<PageRange>().unwrap(),
            PageRange {
                start: 7,
                end: Some(7)
            }
        );
    }

    #[test]
    fn test_page_range_rejects_invalid_specs() {
        for input in ["", "0", "abc", "5-3", "-3", "1-2-3", "2..5"] {
            assert!(
                input.parse::<PageRange>().is_err(),
                "input {input:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_page_range_default_is_unbounded() {
        let range = PageRange::default();
        assert_eq!(range.start, 1);
        assert_eq!(range.end, None);
    }

    #[test]
    fn test_site_profile_default_suffix() {
        assert_eq!(SiteProfile::default().document_suffix, ".pdf");
    }
}
