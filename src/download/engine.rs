//! Idempotent sequential download engine.
//!
//! The engine consumes a deduplicated reference list and downloads each
//! document under the shared authenticated session. Downloads are strictly
//! sequential: the underlying browser session is not safe for concurrent
//! use, and a fixed inter-request delay bounds the request rate.
//!
//! # Idempotence
//!
//! A destination file that already exists with non-zero size is classified
//! [`DownloadResult::AlreadyPresent`] without any network access, so a rerun
//! over the same reference list is the retry mechanism: already-successful
//! items are never re-fetched and there is no in-run retry.
//!
//! # Example
//!
//! ```no_run
//! use docharvest_core::download::DownloadEngine;
//! use docharvest_core::session::AcquisitionSession;
//! use docharvest_core::store::DocumentReference;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = AcquisitionSession::open_chromium(true).await?;
//! let refs = vec![DocumentReference::new("https://example.com/doc.pdf")];
//! let engine = DownloadEngine::default();
//! let stats = engine.download_all(&session, &refs, Path::new("./pdfs")).await?;
//! println!("downloaded: {}, already present: {}", stats.downloaded, stats.already_present);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::EngineError;
use super::filename::filename_from_url;
use crate::session::FetchError;
use crate::store::DocumentReference;

/// Canonical document-format magic bytes; every valid payload starts here.
pub const PDF_MAGIC: &[u8] = b"%PDF";

/// Default fixed delay between document requests.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(500);

/// Fetch-as-authenticated capability consumed by the engine.
///
/// Implemented by [`AcquisitionSession`](crate::session::AcquisitionSession)
/// in production; tests substitute canned fetchers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url` under the shared session, returning the payload bytes.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Outcome of one document reference attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    /// The document was fetched, validated and written.
    Success {
        /// Payload size in bytes.
        bytes: u64,
    },
    /// A non-empty file already existed at the destination; no network
    /// access was made.
    AlreadyPresent {
        /// Existing file size in bytes.
        bytes: u64,
    },
    /// The fetch failed; a rerun may succeed.
    TransientFailure {
        /// Human-readable failure description.
        reason: String,
    },
    /// The payload is definitively unusable; retrying cannot help.
    PermanentFailure {
        /// Human-readable failure description.
        reason: String,
    },
}

impl DownloadResult {
    /// Short outcome label for logs and progress display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "downloaded",
            Self::AlreadyPresent { .. } => "already-present",
            Self::TransientFailure { .. } => "transient-failure",
            Self::PermanentFailure { .. } => "permanent-failure",
        }
    }
}

/// Aggregate statistics for one download batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// Successfully downloaded documents.
    pub downloaded: usize,
    /// Documents skipped because a non-empty file already existed.
    pub already_present: usize,
    /// Fetch failures that a rerun may resolve.
    pub transient_failures: usize,
    /// Definitive failures (malformed payloads).
    pub permanent_failures: usize,
    /// Total bytes downloaded this run (successes only).
    pub bytes_total: u64,
}

impl RunStats {
    /// Records one outcome.
    pub fn record(&mut self, outcome: &DownloadResult) {
        match outcome {
            DownloadResult::Success { bytes } => {
                self.downloaded += 1;
                self.bytes_total += bytes;
            }
            DownloadResult::AlreadyPresent { .. } => self.already_present += 1,
            DownloadResult::TransientFailure { .. } => self.transient_failures += 1,
            DownloadResult::PermanentFailure { .. } => self.permanent_failures += 1,
        }
    }

    /// Total references attempted (all outcome kinds).
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.downloaded + self.already_present + self.transient_failures + self.permanent_failures
    }

    /// Total failed references.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.transient_failures + self.permanent_failures
    }
}

/// Sequential download engine with idempotent skip-if-present.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    request_delay: Duration,
}

impl Default for DownloadEngine {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_DELAY)
    }
}

impl DownloadEngine {
    /// Creates an engine with the given fixed inter-request delay.
    #[must_use]
    pub fn new(request_delay: Duration) -> Self {
        Self { request_delay }
    }

    /// Returns the configured inter-request delay.
    #[must_use]
    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    /// Downloads every reference into `dest_dir` and returns aggregate
    /// statistics.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] when the destination cannot be
    /// written; per-document fetch and validation failures are counted, not
    /// raised.
    pub async fn download_all<F>(
        &self,
        fetcher: &F,
        references: &[DocumentReference],
        dest_dir: &Path,
    ) -> Result<RunStats, EngineError>
    where
        F: Fetcher + ?Sized,
    {
        self.download_all_observed(fetcher, references, dest_dir, |_, _| {})
            .await
    }

    /// Like [`download_all`](Self::download_all), invoking `observe` after
    /// every per-reference outcome (progress reporting, external tallies).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] when the destination cannot be
    /// written.
    #[instrument(skip_all, fields(references = references.len(), dest_dir = %dest_dir.display()))]
    pub async fn download_all_observed<F, O>(
        &self,
        fetcher: &F,
        references: &[DocumentReference],
        dest_dir: &Path,
        mut observe: O,
    ) -> Result<RunStats, EngineError>
    where
        F: Fetcher + ?Sized,
        O: FnMut(&DocumentReference, &DownloadResult),
    {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| EngineError::storage(dest_dir, e))?;

        let deduped = dedup_by_url(references);
        info!(total = deduped.len(), "starting download batch");

        let mut stats = RunStats::default();
        for (index, reference) in deduped.iter().enumerate() {
            let (outcome, touched_network) =
                self.download_one(fetcher, reference, dest_dir).await?;
            stats.record(&outcome);
            observe(reference, &outcome);

            if touched_network && index + 1 < deduped.len() {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        info!(
            downloaded = stats.downloaded,
            already_present = stats.already_present,
            transient_failures = stats.transient_failures,
            permanent_failures = stats.permanent_failures,
            bytes = stats.bytes_total,
            "download batch complete"
        );
        Ok(stats)
    }

    /// Downloads one reference. The second tuple element reports whether the
    /// network was touched, which drives inter-request delays.
    async fn download_one<F>(
        &self,
        fetcher: &F,
        reference: &DocumentReference,
        dest_dir: &Path,
    ) -> Result<(DownloadResult, bool), EngineError>
    where
        F: Fetcher + ?Sized,
    {
        let Ok(parsed) = Url::parse(&reference.url) else {
            warn!(url = %reference.url, "reference is not a well-formed URL");
            return Ok((
                DownloadResult::PermanentFailure {
                    reason: format!("invalid URL: {}", reference.url),
                },
                false,
            ));
        };

        let filename = filename_from_url(&parsed);
        let final_path = dest_dir.join(&filename);

        if let Ok(metadata) = tokio::fs::metadata(&final_path).await {
            if metadata.len() > 0 {
                debug!(path = %final_path.display(), "destination already present; skipping");
                return Ok((
                    DownloadResult::AlreadyPresent {
                        bytes: metadata.len(),
                    },
                    false,
                ));
            }
        }

        let bytes = match fetcher.fetch(&reference.url).await {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(url = %reference.url, %error, "fetch failed");
                return Ok((
                    DownloadResult::TransientFailure {
                        reason: error.to_string(),
                    },
                    true,
                ));
            }
        };

        if !bytes.starts_with(PDF_MAGIC) {
            warn!(
                url = %reference.url,
                size = bytes.len(),
                "payload does not start with document magic bytes; discarding"
            );
            return Ok((
                DownloadResult::PermanentFailure {
                    reason: "payload is not a valid document".to_string(),
                },
                true,
            ));
        }

        // Temp-then-rename keeps a truncated file from ever appearing under
        // the expected name if the process dies mid-write.
        let temp_path = dest_dir.join(format!("{filename}.part"));
        if let Err(source) = tokio::fs::write(&temp_path, &bytes).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(EngineError::storage(temp_path, source));
        }
        if let Err(source) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(EngineError::storage(final_path, source));
        }

        info!(
            url = %reference.url,
            path = %final_path.display(),
            bytes = bytes.len(),
            "downloaded"
        );
        Ok((
            DownloadResult::Success {
                bytes: bytes.len() as u64,
            },
            true,
        ))
    }
}

/// Dedup by URL, preserving first-seen order.
fn dedup_by_url(references: &[DocumentReference]) -> Vec<&DocumentReference> {
    let mut seen = HashSet::new();
    references
        .iter()
        .filter(|reference| seen.insert(reference.url.as_str()))
        .collect()
}
