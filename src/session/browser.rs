//! Navigable browser session capability and its Chromium implementation.
//!
//! [`NavigableSession`] is the seam between the acquisition pipeline and the
//! page-rendering capability: everything above it sees selectors, rendered
//! content and cookies, never a concrete browser. [`ChromiumSession`] is the
//! production implementation over `chromiumoxide`; tests use scripted fakes.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt;
use tracing::{debug, warn};

use super::error::SessionError;

/// Environment variable overriding browser binary discovery.
const BROWSER_ENV_VAR: &str = "DOCHARVEST_BROWSER";

/// Poll interval while waiting for an element to appear.
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One cookie captured from the live browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
}

/// Capability contract for a navigable, scriptable page session.
///
/// The trait is object-safe so the pipeline can hold a `Box<dyn
/// NavigableSession>` and tests can substitute scripted implementations.
#[async_trait]
pub trait NavigableSession: Send + Sync {
    /// Navigates the page to `url` and waits for the load to settle.
    async fn navigate(&self, url: &str) -> Result<(), SessionError>;

    /// Waits up to `timeout` for an element matching `selector` to be
    /// present. Returns `false` on timeout; absence is never an error.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, SessionError>;

    /// Clicks the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<(), SessionError>;

    /// Focuses the first element matching `selector` and types `text`.
    async fn fill(&self, selector: &str, text: &str) -> Result<(), SessionError>;

    /// Clicks a next-page style control inside `container_selector`.
    /// Returns whether an enabled control was found and clicked.
    async fn click_next(&self, container_selector: &str) -> Result<bool, SessionError>;

    /// Returns the current rendered page content.
    async fn content(&self) -> Result<String, SessionError>;

    /// Returns the current page URL.
    async fn current_url(&self) -> Result<String, SessionError>;

    /// Returns the cookies currently held by the session.
    async fn cookies(&self) -> Result<Vec<SessionCookie>, SessionError>;

    /// Releases the underlying session. Best-effort; called on every exit
    /// path by the owner.
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

/// Locates a usable browser binary.
///
/// Checks the `DOCHARVEST_BROWSER` env override first, then common binary
/// names on `PATH`.
#[must_use]
pub fn find_browser_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(BROWSER_ENV_VAR) {
        let path = PathBuf::from(&path);
        if path.exists() {
            return Some(path);
        }
        warn!(
            path = %path.display(),
            "{BROWSER_ENV_VAR} points at a missing binary; falling back to PATH lookup"
        );
    }

    for name in ["google-chrome", "chromium", "chromium-browser", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    None
}

/// Chromium-backed navigable session.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
}

impl std::fmt::Debug for ChromiumSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumSession").finish_non_exhaustive()
    }
}

impl ChromiumSession {
    /// Launches a Chromium instance and opens one page.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::BrowserNotFound`] when no binary is available
    /// and [`SessionError::Init`] when the launch fails.
    pub async fn launch(headless: bool) -> Result<Self, SessionError> {
        let binary = find_browser_binary().ok_or(SessionError::BrowserNotFound)?;
        debug!(binary = %binary.display(), headless, "launching browser");

        let mut builder = BrowserConfig::builder()
            .chrome_executable(binary)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|message| SessionError::Init { message })?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(SessionError::init)?;

        // Drive the CDP event loop for the lifetime of the browser.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(SessionError::init)?;

        Ok(Self { browser, page })
    }
}

#[async_trait]
impl NavigableSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| SessionError::browser("navigate", e))?;
        // Load settle is best-effort: some document responses never fire a
        // full navigation event.
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, SessionError> {
        let start = tokio::time::Instant::now();
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<(), SessionError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| SessionError::browser("click", e))?;
        element
            .click()
            .await
            .map_err(|e| SessionError::browser("click", e))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), SessionError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| SessionError::browser("fill", e))?;
        element
            .click()
            .await
            .map_err(|e| SessionError::browser("fill", e))?;
        element
            .type_str(text)
            .await
            .map_err(|e| SessionError::browser("fill", e))?;
        Ok(())
    }

    async fn click_next(&self, container_selector: &str) -> Result<bool, SessionError> {
        let selector_js = serde_json::to_string(container_selector)
            .map_err(|e| SessionError::browser("click-next", e))?;
        // Text-based matching has to run in the page: CSS cannot select by
        // element text. Scroll-then-click avoids interception by overlays.
        let script = format!(
            "(() => {{\n\
               const container = document.querySelector({selector_js});\n\
               if (!container) return false;\n\
               const needles = ['next', '>', '\\u203a', '\\u00bb'];\n\
               for (const el of container.querySelectorAll('button, a')) {{\n\
                 const text = (el.textContent || '').trim().toLowerCase();\n\
                 if (!needles.some((n) => text.includes(n))) continue;\n\
                 if (el.tagName === 'BUTTON' && el.disabled) continue;\n\
                 el.scrollIntoView({{block: 'center'}});\n\
                 el.click();\n\
                 return true;\n\
               }}\n\
               return false;\n\
             }})()"
        );
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| SessionError::browser("click-next", e))?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    async fn content(&self) -> Result<String, SessionError> {
        self.page
            .content()
            .await
            .map_err(|e| SessionError::browser("content", e))
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| SessionError::browser("url", e))?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, SessionError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| SessionError::browser("cookies", e))?;
        Ok(cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
            })
            .collect())
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        let ChromiumSession { mut browser, page } = *self;
        if let Err(error) = page.close().await {
            warn!(%error, "failed to close browser page");
        }
        if let Err(error) = browser.close().await {
            warn!(%error, "failed to close browser");
        }
        let _ = browser.wait().await;
        Ok(())
    }
}
