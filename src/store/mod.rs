//! Durable reference log and completed work-unit tracking.
//!
//! This module provides the [`ReferenceStore`], an append-only record of
//! discovered document URLs plus a durable set of completed work-unit
//! identifiers. Both live in plain UTF-8 text files (one URL / one integer
//! per line) so overlapping reruns can skip finished work after a restart.
//!
//! # Durability
//!
//! Every append is flushed and fsynced before returning: a write failure
//! surfaces to the caller instead of silently dropping data. The log is
//! append-only and single-writer per run; concurrent runs against the same
//! store must be serialized externally.
//!
//! # Example
//!
//! ```no_run
//! use docharvest_core::store::{DocumentReference, ReferenceStore};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = ReferenceStore::open("data/references.txt", "data/completed.txt")?;
//! let added = store.append(&[DocumentReference::new("https://example.com/a.pdf")])?;
//! println!("added {added} new references");
//! for reference in store.load_all()? {
//!     println!("{}", reference?.url);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

/// Error type for durable store operations.
///
/// All variants are fatal to the current operation: the store never drops
/// data silently.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem I/O failed for a store file.
    #[error("storage I/O error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Creates an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// An absolute URL identifying one downloadable document.
///
/// References are deduplicated by URL; `origin_page` records the listing
/// page the reference was discovered on, for diagnostics only. The on-disk
/// log format is one URL per line, so the origin page is not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
    /// Absolute URL of the document.
    pub url: String,
    /// Listing page number the reference was discovered on, when known.
    pub origin_page: Option<u32>,
}

impl DocumentReference {
    /// Creates a reference with no origin page.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin_page: None,
        }
    }

    /// Creates a reference discovered on a specific listing page.
    #[must_use]
    pub fn with_origin(url: impl Into<String>, page: u32) -> Self {
        Self {
            url: url.into(),
            origin_page: Some(page),
        }
    }
}

/// Append-only store for discovered references and completed work units.
///
/// Dedup is against everything previously appended in this store's lifetime,
/// including lines loaded from disk at open, so repeated calls with
/// overlapping input never produce duplicate on-disk lines.
#[derive(Debug)]
pub struct ReferenceStore {
    reference_path: PathBuf,
    completed_path: PathBuf,
    seen: HashSet<String>,
    completed: HashSet<u64>,
}

impl ReferenceStore {
    /// Opens (or creates) a store backed by the given reference log and
    /// completed-unit file. Parent directories are created as needed and
    /// existing content is loaded for dedup / skip decisions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when a store file cannot be created or read.
    #[instrument(skip_all, fields(reference_path = %reference_path.as_ref().display()))]
    pub fn open(
        reference_path: impl AsRef<Path>,
        completed_path: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        let reference_path = reference_path.as_ref().to_path_buf();
        let completed_path = completed_path.as_ref().to_path_buf();

        for path in [&reference_path, &completed_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
                }
            }
        }

        let seen = load_reference_urls(&reference_path)?;
        let completed = load_completed_units(&completed_path)?;

        info!(
            references = seen.len(),
            completed_units = completed.len(),
            "opened reference store"
        );

        Ok(Self {
            reference_path,
            completed_path,
            seen,
            completed,
        })
    }

    /// Appends new, not-yet-seen references to the durable log and returns
    /// the count actually added. Duplicates within the input batch and
    /// against everything previously appended are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the log cannot be written or synced.
    /// The append is flushed and fsynced before returning.
    #[instrument(skip_all, fields(input = references.len()))]
    pub fn append(&mut self, references: &[DocumentReference]) -> Result<usize, StoreError> {
        let mut fresh: Vec<&str> = Vec::new();
        let mut batch_seen: HashSet<&str> = HashSet::new();
        for reference in references {
            let url = reference.url.as_str();
            if self.seen.contains(url) || !batch_seen.insert(url) {
                continue;
            }
            fresh.push(url);
        }

        if fresh.is_empty() {
            debug!("no new references to append");
            return Ok(0);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.reference_path)
            .map_err(|e| StoreError::io(&self.reference_path, e))?;

        for url in &fresh {
            writeln!(file, "{url}").map_err(|e| StoreError::io(&self.reference_path, e))?;
        }
        file.flush()
            .map_err(|e| StoreError::io(&self.reference_path, e))?;
        file.sync_all()
            .map_err(|e| StoreError::io(&self.reference_path, e))?;

        for url in &fresh {
            self.seen.insert((*url).to_string());
        }

        debug!(added = fresh.len(), "appended references");
        Ok(fresh.len())
    }

    /// Returns a lazy, restartable sequence over the full persisted log in
    /// insertion order. Blank lines and `#` comment lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the log file exists but cannot be
    /// opened. A missing log yields an empty sequence.
    pub fn load_all(&self) -> Result<ReferenceIter, StoreError> {
        let lines = match File::open(&self.reference_path) {
            Ok(file) => Some(BufReader::new(file).lines()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(StoreError::io(&self.reference_path, e)),
        };
        Ok(ReferenceIter {
            lines,
            path: self.reference_path.clone(),
        })
    }

    /// Number of distinct references known to this store.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.seen.len()
    }

    /// Durably records a work unit as complete. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the completed-unit file cannot be
    /// written or synced.
    #[instrument(skip(self))]
    pub fn mark_work_unit_complete(&mut self, id: u64) -> Result<(), StoreError> {
        if self.completed.contains(&id) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.completed_path)
            .map_err(|e| StoreError::io(&self.completed_path, e))?;
        writeln!(file, "{id}").map_err(|e| StoreError::io(&self.completed_path, e))?;
        file.flush()
            .map_err(|e| StoreError::io(&self.completed_path, e))?;
        file.sync_all()
            .map_err(|e| StoreError::io(&self.completed_path, e))?;

        self.completed.insert(id);
        info!(unit = id, "marked work unit complete");
        Ok(())
    }

    /// Whether a work unit was durably recorded as complete.
    #[must_use]
    pub fn is_work_unit_complete(&self, id: u64) -> bool {
        self.completed.contains(&id)
    }
}

/// Lazy iterator over persisted references, insertion order.
#[derive(Debug)]
pub struct ReferenceIter {
    lines: Option<Lines<BufReader<File>>>,
    path: PathBuf,
}

impl Iterator for ReferenceIter {
    type Item = Result<DocumentReference, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            match lines.next()? {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        continue;
                    }
                    return Some(Ok(DocumentReference::new(trimmed)));
                }
                Err(e) => return Some(Err(StoreError::io(&self.path, e))),
            }
        }
    }
}

fn load_reference_urls(path: &Path) -> Result<HashSet<String>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let mut seen = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        seen.insert(trimmed.to_string());
    }
    Ok(seen)
}

fn load_completed_units(path: &Path) -> Result<HashSet<u64>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let mut completed = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        if let Ok(id) = line.trim().parse::<u64>() {
            completed.insert(id);
        }
    }
    Ok(completed)
}
