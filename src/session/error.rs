//! Error types for the session module.
//!
//! [`SessionError`] covers browser session lifecycle and navigation
//! failures; [`FetchError`] covers failures of a single authenticated fetch,
//! which are local to one document and never fatal to the run.

use thiserror::Error;

/// Errors from the navigable browser session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The browser session could not be established at all. Fatal to the
    /// run: no session, no acquisition possible.
    #[error("failed to initialize browser session: {message}")]
    Init {
        /// Description of the launch failure.
        message: String,
    },

    /// No browser binary could be located.
    #[error("no browser binary found (set DOCHARVEST_BROWSER or install chromium)")]
    BrowserNotFound,

    /// A browser operation failed after the session was established.
    #[error("browser {operation} failed: {message}")]
    Browser {
        /// The operation that failed (navigate, click, ...).
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The cookie-replay HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    HttpClient {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl SessionError {
    /// Creates an init error from any displayable launch failure.
    pub fn init(message: impl std::fmt::Display) -> Self {
        Self::Init {
            message: message.to_string(),
        }
    }

    /// Creates a browser operation error.
    pub fn browser(operation: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Browser {
            operation,
            message: message.to_string(),
        }
    }
}

/// Errors from a single authenticated fetch.
///
/// These are reported per-document and converted into transient download
/// outcomes by the engine; one bad document never aborts the batch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A browser operation failed while fetching.
    #[error("browser fetch of {url} failed: {source}")]
    Browser {
        /// The URL being fetched.
        url: String,
        /// The underlying session error.
        #[source]
        source: SessionError,
    },

    /// Network-level error on the cookie-replay request.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The cookie-replay request timed out.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The cookie-replay request returned a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL being fetched.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The rendered browser content was neither HTML nor a usable payload.
    #[error("unexpected content fetching {url}: rendered result is not a document")]
    UnexpectedContent {
        /// The URL being fetched.
        url: String,
    },
}

impl FetchError {
    /// Creates a browser fetch error.
    pub fn browser(url: impl Into<String>, source: SessionError) -> Self {
        Self::Browser {
            url: url.into(),
            source,
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an unexpected-content error.
    pub fn unexpected_content(url: impl Into<String>) -> Self {
        Self::UnexpectedContent { url: url.into() }
    }
}
