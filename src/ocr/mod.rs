//! Post-acquisition text extraction stage.
//!
//! Fully decoupled from acquisition: reads downloaded documents from one
//! directory and writes one `.txt` per document to another. Extraction is
//! the only parallel stage in the system; each document runs in its own
//! recognizer subprocess, bounded by a configured worker count, and output
//! filenames are derived 1:1 from input filenames so workers never collide.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

/// Marker written for documents that yield no meaningful text.
pub const EMPTY_DOCUMENT_MARKER: &str = "empty file";

/// Minimum trimmed character count for text to count as meaningful.
const MIN_MEANINGFUL_CHARS: usize = 10;

/// Environment variable overriding recognizer binary discovery.
const TESSERACT_ENV_VAR: &str = "DOCHARVEST_TESSERACT";

/// Error type for the text extraction stage.
#[derive(Debug, Error)]
pub enum OcrError {
    /// No recognizer binary could be located.
    #[error("no OCR binary found (set DOCHARVEST_TESSERACT or install tesseract)")]
    BinaryNotFound,

    /// The recognizer subprocess failed.
    #[error("OCR process failed for {path}: {message}")]
    Process {
        /// The document being processed.
        path: PathBuf,
        /// Subprocess diagnostic output.
        message: String,
    },

    /// Filesystem I/O failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl OcrError {
    /// Creates a process error with document context.
    pub fn process(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Process {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Optical text extraction capability.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Extracts text from the document at `document`, using the given
    /// recognizer language code (e.g. `eng`, `deu`).
    async fn extract_text(&self, document: &Path, language: &str) -> Result<String, OcrError>;
}

/// Subprocess-backed recognizer shelling out to `tesseract`.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
}

impl TesseractRecognizer {
    /// Locates the recognizer binary via the env override or `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`OcrError::BinaryNotFound`] when no binary is available.
    pub fn discover() -> Result<Self, OcrError> {
        if let Ok(path) = std::env::var(TESSERACT_ENV_VAR) {
            let path = PathBuf::from(&path);
            if path.exists() {
                return Ok(Self::with_binary(path));
            }
            warn!(
                path = %path.display(),
                "{TESSERACT_ENV_VAR} points at a missing binary; falling back to PATH lookup"
            );
        }
        which::which("tesseract")
            .map(Self::with_binary)
            .map_err(|_| OcrError::BinaryNotFound)
    }

    /// Uses an explicit binary path.
    #[must_use]
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn extract_text(&self, document: &Path, language: &str) -> Result<String, OcrError> {
        debug!(document = %document.display(), language, "running recognizer");
        let output = tokio::process::Command::new(&self.binary)
            .arg(document)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()
            .await
            .map_err(|source| OcrError::io(document, source))?;

        if !output.status.success() {
            return Err(OcrError::process(
                document,
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Statistics from one extraction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Documents found in the input directory.
    pub total: usize,
    /// Documents converted this pass.
    pub processed: usize,
    /// Documents skipped because output already existed.
    pub skipped: usize,
    /// Documents whose extraction or output write failed.
    pub failed: usize,
}

/// Per-document outcome inside the worker pool.
enum DocumentOutcome {
    Processed,
    Skipped,
    Failed,
}

/// Extracts text from every document in `document_dir` into `text_dir`.
///
/// Documents whose `.txt` output already exists are skipped, so reruns only
/// pay for new documents. Extractions yielding fewer than 10 meaningful
/// characters, and failed extractions, write the `empty file` marker.
///
/// # Errors
///
/// Returns [`OcrError::Io`] when the directories cannot be read or created.
/// Per-document failures are counted in the returned stats, not raised.
#[instrument(skip(recognizer), fields(document_dir = %document_dir.display()))]
pub async fn extract_directory(
    recognizer: Arc<dyn TextRecognizer>,
    document_dir: &Path,
    text_dir: &Path,
    language: &str,
    workers: usize,
) -> Result<ExtractionStats, OcrError> {
    tokio::fs::create_dir_all(text_dir)
        .await
        .map_err(|source| OcrError::io(text_dir, source))?;

    let documents = list_documents(document_dir)?;
    if documents.is_empty() {
        warn!(dir = %document_dir.display(), "no documents found for text extraction");
        return Ok(ExtractionStats::default());
    }

    info!(
        count = documents.len(),
        workers,
        "starting text extraction"
    );

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::new();
    let total = documents.len();

    for document in documents {
        let recognizer = Arc::clone(&recognizer);
        let semaphore = Arc::clone(&semaphore);
        let text_dir = text_dir.to_path_buf();
        let language = language.to_string();

        handles.push(tokio::spawn(async move {
            // Permit is dropped when this block exits (RAII)
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return DocumentOutcome::Failed;
            };
            process_document(recognizer.as_ref(), &document, &text_dir, &language).await
        }));
    }

    let mut stats = ExtractionStats {
        total,
        ..ExtractionStats::default()
    };
    for handle in handles {
        match handle.await {
            Ok(DocumentOutcome::Processed) => stats.processed += 1,
            Ok(DocumentOutcome::Skipped) => stats.skipped += 1,
            Ok(DocumentOutcome::Failed) => stats.failed += 1,
            Err(error) => {
                warn!(%error, "extraction task panicked");
                stats.failed += 1;
            }
        }
    }

    info!(
        processed = stats.processed,
        skipped = stats.skipped,
        failed = stats.failed,
        "text extraction complete"
    );
    Ok(stats)
}

async fn process_document(
    recognizer: &dyn TextRecognizer,
    document: &Path,
    text_dir: &Path,
    language: &str,
) -> DocumentOutcome {
    let Some(stem) = document.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        warn!(document = %document.display(), "document has no usable filename");
        return DocumentOutcome::Failed;
    };
    let output_path = text_dir.join(format!("{stem}.txt"));

    if tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
        debug!(document = %document.display(), "already converted; skipping");
        return DocumentOutcome::Skipped;
    }

    let (text, failed) = match recognizer.extract_text(document, language).await {
        Ok(text) => {
            if text.trim().chars().count() < MIN_MEANINGFUL_CHARS {
                warn!(document = %document.display(), "document appears empty or image-only");
                (EMPTY_DOCUMENT_MARKER.to_string(), false)
            } else {
                (text, false)
            }
        }
        Err(error) => {
            warn!(document = %document.display(), %error, "extraction failed");
            (EMPTY_DOCUMENT_MARKER.to_string(), true)
        }
    };

    if let Err(error) = tokio::fs::write(&output_path, &text).await {
        // Acquisition data is already safe on disk; a lost text output only
        // costs a rerun of this document.
        warn!(path = %output_path.display(), %error, "failed to write text output");
        return DocumentOutcome::Failed;
    }

    if failed {
        DocumentOutcome::Failed
    } else {
        debug!(document = %document.display(), output = %output_path.display(), "converted");
        DocumentOutcome::Processed
    }
}

fn list_documents(dir: &Path) -> Result<Vec<PathBuf>, OcrError> {
    let entries = std::fs::read_dir(dir).map_err(|source| OcrError::io(dir, source))?;
    let mut documents: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    documents.sort();
    Ok(documents)
}
