//! Scripted multi-page listing session for discovery tests.
//!
//! Renders a synthetic paginated listing: each page holds a results
//! container with relative document links, and a pagination container whose
//! next button is disabled on the last page. Navigation resets to page one,
//! mirroring a real listing root.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docharvest_core::session::{NavigableSession, SessionCookie, SessionError};

/// Gate selector the scripted session recognizes.
pub const GATE_SELECTOR: &str = "#age-button-yes";

/// Builds the rendered HTML for one listing page.
///
/// `page` is 1-based; `total_pages` controls whether the next control is
/// enabled. Each page links `links_per_page` documents named
/// `doc-<page>-<i>.pdf` plus one non-document link.
#[must_use]
pub fn listing_page_html(page: u32, total_pages: u32, links_per_page: u32) -> String {
    let mut links = String::new();
    for i in 1..=links_per_page {
        links.push_str(&format!(
            r#"<a href="/files/doc-{page}-{i}.pdf">doc-{page}-{i}.pdf</a>"#
        ));
    }
    links.push_str(r#"<a href="/about.html">about</a>"#);

    let next_control = if page < total_pages {
        r#"<button>Next</button>"#
    } else {
        r#"<button disabled>Next</button>"#
    };

    format!(
        r#"<html><body>
            <div id="results">{links}</div>
            <div id="pagination"><span>page {page} of {total_pages}</span>{next_control}</div>
        </body></html>"#
    )
}

/// Scripted session over a fixed number of listing pages.
pub struct PagedSession {
    pages: Vec<String>,
    current: Mutex<usize>,
    base_url: String,
    /// Number of successful next clicks.
    pub next_clicks: AtomicU32,
    /// Number of gate clicks.
    pub gate_clicks: AtomicUsize,
    /// Whether the gate control is present on first contact.
    gate_present: bool,
    searches: Mutex<Vec<String>>,
}

impl PagedSession {
    /// Builds a session with `total_pages` pages of `links_per_page` links.
    #[must_use]
    pub fn new(total_pages: u32, links_per_page: u32, gate_present: bool) -> Self {
        Self::with_base_url(
            total_pages,
            links_per_page,
            gate_present,
            "https://example.com/listing/search",
        )
    }

    /// Like [`new`](Self::new), but reporting `base_url` as the current page
    /// URL so relative links resolve against a test server.
    #[must_use]
    pub fn with_base_url(
        total_pages: u32,
        links_per_page: u32,
        gate_present: bool,
        base_url: &str,
    ) -> Self {
        let pages = (1..=total_pages)
            .map(|page| listing_page_html(page, total_pages, links_per_page))
            .collect();
        Self {
            pages,
            current: Mutex::new(0),
            base_url: base_url.to_string(),
            next_clicks: AtomicU32::new(0),
            gate_clicks: AtomicUsize::new(0),
            gate_present,
            searches: Mutex::new(Vec::new()),
        }
    }

    /// Queries submitted through the search form so far.
    #[must_use]
    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn gate_cleared(&self) -> bool {
        self.gate_clicks.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl NavigableSession for &'static PagedSession {
    async fn navigate(&self, _url: &str) -> Result<(), SessionError> {
        if let Ok(mut current) = self.current.lock() {
            *current = 0;
        }
        Ok(())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<bool, SessionError> {
        if selector == GATE_SELECTOR {
            return Ok(self.gate_present && !self.gate_cleared());
        }
        Ok(true)
    }

    async fn click(&self, selector: &str) -> Result<(), SessionError> {
        if selector == GATE_SELECTOR {
            self.gate_clicks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn fill(&self, _selector: &str, text: &str) -> Result<(), SessionError> {
        if let Ok(mut searches) = self.searches.lock() {
            searches.push(text.to_string());
        }
        Ok(())
    }

    async fn click_next(&self, _container_selector: &str) -> Result<bool, SessionError> {
        let Ok(mut current) = self.current.lock() else {
            return Ok(false);
        };
        if *current + 1 < self.pages.len() {
            *current += 1;
            self.next_clicks.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn content(&self) -> Result<String, SessionError> {
        let current = self.current.lock().map(|c| *c).unwrap_or(0);
        Ok(self
            .pages
            .get(current)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        Ok(self.base_url.clone())
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, SessionError> {
        Ok(vec![SessionCookie {
            name: "verified".to_string(),
            value: "1".to_string(),
        }])
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        Ok(())
    }
}
