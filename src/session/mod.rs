//! One long-lived verified acquisition session.
//!
//! This module owns the single verification/authentication boundary of a
//! run. [`AcquisitionSession`] performs the interactive gate (age
//! verification, CAPTCHA) at most once per session lifetime and exposes a
//! fetch-as-authenticated primitive reused by all downstream downloads, so
//! the interactive checkpoint is paid for once per batch rather than once
//! per document.
//!
//! # Fetch fallback
//!
//! `fetch_authenticated` is two-tier: the navigable browser session makes
//! first contact, and when the rendered result is still an HTML page rather
//! than the document payload, the live cookie set is extracted and the same
//! request is replayed through a plain HTTP client carrying those
//! credentials. Bulk fetches are cheaper and more reliable over plain HTTP
//! once the session cookies exist.

mod browser;
mod error;

pub use browser::{ChromiumSession, NavigableSession, SessionCookie, find_browser_binary};
pub use error::{FetchError, SessionError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::COOKIE;
use tracing::{debug, info, instrument};

use crate::download::Fetcher;
use crate::user_agent;

/// Connect timeout for the cookie-replay client.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read timeout for the cookie-replay client (large documents).
const READ_TIMEOUT_SECS: u64 = 300;

/// Configuration for the one-time interactive gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// CSS selector of the gate's accept control.
    pub selector: String,
    /// How long to wait for the gate control before treating the gate as
    /// absent.
    pub wait: Duration,
    /// Settle time after clicking the gate, so the session registers
    /// passage (cookie set updated).
    pub settle: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            selector: "#age-button-yes".to_string(),
            wait: Duration::from_secs(3),
            settle: Duration::from_secs(2),
        }
    }
}

/// The one verified session shared by discovery and download.
///
/// Exclusively owns the navigable browser session; lends it (never copies
/// it) to discovery and download for the duration of one run. Nothing else
/// closes the session.
pub struct AcquisitionSession {
    browser: Box<dyn NavigableSession>,
    http: CookieClient,
    gate: GateConfig,
    gate_passed: AtomicBool,
}

impl std::fmt::Debug for AcquisitionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionSession")
            .field("gate", &self.gate)
            .field("gate_passed", &self.gate_passed)
            .finish_non_exhaustive()
    }
}

impl AcquisitionSession {
    /// Wraps an established navigable session. Resource acquisition only;
    /// the gate is not touched here.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::HttpClient`] when the cookie-replay client
    /// cannot be built.
    pub fn open(browser: Box<dyn NavigableSession>) -> Result<Self, SessionError> {
        Ok(Self {
            browser,
            http: CookieClient::new()?,
            gate: GateConfig::default(),
            gate_passed: AtomicBool::new(false),
        })
    }

    /// Launches a Chromium session and wraps it.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal to the run: no session, no acquisition.
    #[instrument]
    pub async fn open_chromium(headless: bool) -> Result<Self, SessionError> {
        let browser = ChromiumSession::launch(headless).await?;
        Self::open(Box::new(browser))
    }

    /// Replaces the gate configuration.
    #[must_use]
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Read-only access to the underlying navigable session.
    #[must_use]
    pub fn browser(&self) -> &dyn NavigableSession {
        self.browser.as_ref()
    }

    /// Whether the gate has been confirmed for this session lifetime.
    #[must_use]
    pub fn gate_passed(&self) -> bool {
        self.gate_passed.load(Ordering::SeqCst)
    }

    /// Ensures the session is past the interactive gate.
    ///
    /// Navigates to `target_url`; when the gate control appears within the
    /// bounded wait it is clicked once and the session is given time to
    /// register passage. When the control never resolves, the gate is
    /// treated as absent. Effective at most once per session lifetime:
    /// subsequent calls are cheap no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when navigation or the click itself fails.
    #[instrument(skip(self))]
    pub async fn ensure_past_gate(&self, target_url: &str) -> Result<(), SessionError> {
        if self.gate_passed.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.browser.navigate(target_url).await?;

        if self.browser.wait_for(&self.gate.selector, self.gate.wait).await? {
            info!(selector = %self.gate.selector, "interactive gate present; clicking through");
            self.browser.click(&self.gate.selector).await?;
            tokio::time::sleep(self.gate.settle).await;
        } else {
            debug!("no interactive gate present");
        }

        self.gate_passed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Fetches `url` as the authenticated session and returns the raw
    /// payload bytes.
    ///
    /// # Errors
    ///
    /// Per-call failures are local: callers convert them into transient
    /// per-document outcomes rather than aborting the batch.
    #[instrument(skip(self))]
    pub async fn fetch_authenticated(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.ensure_past_gate(url)
            .await
            .map_err(|source| FetchError::browser(url, source))?;

        self.browser
            .navigate(url)
            .await
            .map_err(|source| FetchError::browser(url, source))?;
        let content = self
            .browser
            .content()
            .await
            .map_err(|source| FetchError::browser(url, source))?;

        if !looks_like_html(&content) {
            // The browser renders documents through an HTML wrapper; raw
            // payload bytes are only reachable over the replay path.
            return Err(FetchError::unexpected_content(url));
        }

        debug!("rendered content is HTML; replaying request with session cookies");
        let cookies = self
            .browser
            .cookies()
            .await
            .map_err(|source| FetchError::browser(url, source))?;
        let (status, bytes) = self.http.get(url, &cookies).await?;
        if !(200..300).contains(&status) {
            return Err(FetchError::http_status(url, status));
        }
        Ok(bytes)
    }

    /// Releases the underlying navigable session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when teardown fails; callers log and
    /// continue, since the run is over either way.
    pub async fn close(self) -> Result<(), SessionError> {
        self.browser.close().await
    }
}

#[async_trait]
impl Fetcher for AcquisitionSession {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_authenticated(url).await
    }
}

/// Plain HTTP client that replays requests with injected session cookies.
#[derive(Debug, Clone)]
struct CookieClient {
    client: reqwest::Client,
}

impl CookieClient {
    fn new() -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|source| SessionError::HttpClient { source })?;
        Ok(Self { client })
    }

    async fn get(
        &self,
        url: &str,
        cookies: &[SessionCookie],
    ) -> Result<(u16, Vec<u8>), FetchError> {
        let mut request = self.client.get(url);
        if !cookies.is_empty() {
            let header = cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(COOKIE, header);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        Ok((status, bytes.to_vec()))
    }
}

/// Cheap sniff for HTML wrapper content; scans only the head of the page.
fn looks_like_html(content: &str) -> bool {
    let head: String = content.chars().take(1024).collect::<String>().to_lowercase();
    head.contains("<html") || head.contains("<!doctype html")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    /// Scripted session: the gate control is present until it is clicked,
    /// rendered content is always an HTML wrapper, and one session cookie
    /// is held.
    struct GateScriptedSession {
        gate_selector: String,
        gate_clicks: AtomicUsize,
        gate_cleared: AtomicBool,
        navigations: AtomicUsize,
    }

    impl GateScriptedSession {
        fn new(gate_selector: &str) -> Self {
            Self {
                gate_selector: gate_selector.to_string(),
                gate_clicks: AtomicUsize::new(0),
                gate_cleared: AtomicBool::new(false),
                navigations: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NavigableSession for GateScriptedSession {
        async fn navigate(&self, _url: &str) -> Result<(), SessionError> {
            self.navigations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn wait_for(
            &self,
            selector: &str,
            _timeout: Duration,
        ) -> Result<bool, SessionError> {
            if selector == self.gate_selector {
                return Ok(!self.gate_cleared.load(Ordering::SeqCst));
            }
            Ok(true)
        }

        async fn click(&self, selector: &str) -> Result<(), SessionError> {
            if selector == self.gate_selector {
                self.gate_clicks.fetch_add(1, Ordering::SeqCst);
                self.gate_cleared.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn fill(&self, _selector: &str, _text: &str) -> Result<(), SessionError> {
            Ok(())
        }

        async fn click_next(&self, _container_selector: &str) -> Result<bool, SessionError> {
            Ok(false)
        }

        async fn content(&self) -> Result<String, SessionError> {
            Ok("<html><body>interstitial</body></html>".to_string())
        }

        async fn current_url(&self) -> Result<String, SessionError> {
            Ok("https://example.com/".to_string())
        }

        async fn cookies(&self) -> Result<Vec<SessionCookie>, SessionError> {
            Ok(vec![SessionCookie {
                name: "session".to_string(),
                value: "abc123".to_string(),
            }])
        }

        async fn close(self: Box<Self>) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn gated_session() -> (AcquisitionSession, &'static GateScriptedSession) {
        let gate = GateConfig {
            wait: Duration::from_millis(10),
            settle: Duration::from_millis(1),
            ..GateConfig::default()
        };
        let scripted: &'static GateScriptedSession =
            Box::leak(Box::new(GateScriptedSession::new(&gate.selector)));
        // Second reference for assertions; the session owns a separate box
        // around the same leaked instance via a thin forwarding wrapper.
        struct Forward(&'static GateScriptedSession);

        #[async_trait]
        impl NavigableSession for Forward {
            async fn navigate(&self, url: &str) -> Result<(), SessionError> {
                self.0.navigate(url).await
            }
            async fn wait_for(
                &self,
                selector: &str,
                timeout: Duration,
            ) -> Result<bool, SessionError> {
                self.0.wait_for(selector, timeout).await
            }
            async fn click(&self, selector: &str) -> Result<(), SessionError> {
                self.0.click(selector).await
            }
            async fn fill(&self, selector: &str, text: &str) -> Result<(), SessionError> {
                self.0.fill(selector, text).await
            }
            async fn click_next(&self, container_selector: &str) -> Result<bool, SessionError> {
                self.0.click_next(container_selector).await
            }
            async fn content(&self) -> Result<String, SessionError> {
                self.0.content().await
            }
            async fn current_url(&self) -> Result<String, SessionError> {
                self.0.current_url().await
            }
            async fn cookies(&self) -> Result<Vec<SessionCookie>, SessionError> {
                self.0.cookies().await
            }
            async fn close(self: Box<Self>) -> Result<(), SessionError> {
                Ok(())
            }
        }

        let session = AcquisitionSession::open(Box::new(Forward(scripted)))
            .unwrap()
            .with_gate(gate);
        (session, scripted)
    }

    /// Matches requests carrying the scripted session cookie.
    struct SessionCookieMatcher;

    impl Match for SessionCookieMatcher {
        fn matches(&self, request: &Request) -> bool {
            request
                .headers
                .get("Cookie")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|cookie| cookie.contains("session=abc123"))
        }
    }

    #[tokio::test]
    async fn test_gate_clicked_exactly_once_across_batch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 payload"))
            .mount(&mock_server)
            .await;

        let (session, scripted) = gated_session();

        for index in 0..3 {
            let url = format!("{}/doc{index}.pdf", mock_server.uri());
            let bytes = session.fetch_authenticated(&url).await.unwrap();
            assert_eq!(bytes, b"%PDF-1.7 payload");
        }

        assert_eq!(
            scripted.gate_clicks.load(Ordering::SeqCst),
            1,
            "interactive gate click must execute exactly once for the batch"
        );
        assert!(session.gate_passed());
    }

    #[tokio::test]
    async fn test_ensure_past_gate_is_noop_after_confirmation() {
        let (session, scripted) = gated_session();

        session.ensure_past_gate("https://example.com/").await.unwrap();
        let navigations_after_first = scripted.navigations.load(Ordering::SeqCst);
        session.ensure_past_gate("https://example.com/").await.unwrap();

        assert_eq!(scripted.gate_clicks.load(Ordering::SeqCst), 1);
        assert_eq!(
            scripted.navigations.load(Ordering::SeqCst),
            navigations_after_first,
            "confirmed gate must not trigger further navigation"
        );
    }

    #[tokio::test]
    async fn test_fetch_replays_with_session_cookies() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secured.pdf"))
            .and(SessionCookieMatcher)
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 secured"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secured.pdf"))
            .respond_with(ResponseTemplate::new(403))
            .with_priority(u8::MAX)
            .mount(&mock_server)
            .await;

        let (session, _scripted) = gated_session();
        let url = format!("{}/secured.pdf", mock_server.uri());
        let bytes = session.fetch_authenticated(&url).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4 secured");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_local_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let (session, _scripted) = gated_session();
        let url = format!("{}/missing.pdf", mock_server.uri());
        let result = session.fetch_authenticated(&url).await;
        match result {
            Err(FetchError::HttpStatus { status: 404, .. }) => {}
            other => panic!("expected HttpStatus 404, got: {other:?}"),
        }
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(looks_like_html("  <HTML lang=\"en\">"));
        assert!(!looks_like_html("%PDF-1.7 binary"));
    }
}
