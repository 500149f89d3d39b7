//! Run orchestration: work units → discovery → persistence → download →
//! completion marking.
//!
//! A thin sequencing layer over the core components. Fatal failures
//! (session init, storage) propagate out of here; per-unit discovery
//! failures skip the unit so it is retried on a later run. The browser
//! session is released on every exit path.

use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::discovery::{DiscoveryError, PageRange, PaginatedDiscovery, SiteProfile};
use crate::download::{DownloadEngine, EngineError, RunStats};
use crate::session::{AcquisitionSession, SessionError};
use crate::store::{DocumentReference, ReferenceStore, StoreError};

/// Fatal errors aborting a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Durable store write failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The browser session could not be established or driven.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The download engine hit a storage failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// One discoverable partition of the overall listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Opaque numeric identifier (e.g. a dataset number).
    pub id: u64,
    /// Listing URL for this unit, rendered from the template.
    pub url: String,
}

/// Configuration for one acquisition run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// First work unit id, inclusive.
    pub unit_start: u64,
    /// Last work unit id, inclusive.
    pub unit_end: u64,
    /// Listing URL template; `{n}` is replaced with the unit id.
    pub listing_template: String,
    /// Free-text search query, when the listing is query-driven.
    pub query: Option<String>,
    /// Page bound for discovery.
    pub pages: PageRange,
    /// Destination directory for downloaded documents.
    pub output_dir: PathBuf,
    /// Fixed delay between document requests.
    pub request_delay: Duration,
    /// Run the browser without a visible window.
    pub headless: bool,
    /// Selectors and timing for the listing site.
    pub site: SiteProfile,
}

/// Aggregate results of one run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    /// Download statistics.
    pub stats: RunStats,
    /// References found during this run's discovery (pre-dedup).
    pub discovered: usize,
    /// Work units planned for this run (pending only).
    pub units_planned: usize,
    /// Work units skipped because they were already complete.
    pub units_skipped: usize,
    /// Work units marked complete by this run.
    pub units_completed: Vec<u64>,
}

impl RunSummary {
    /// Whether the run counts as successful for exit-code purposes: at
    /// least one download succeeded, or there was nothing left to do (no
    /// failures either).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.stats.downloaded > 0 || self.stats.failures() == 0
    }
}

/// Renders a work-unit listing URL from the template.
#[must_use]
pub fn render_unit_url(template: &str, id: u64) -> String {
    template.replace("{n}", &id.to_string())
}

/// Plans the pending work units for a range, skipping those durably
/// recorded as complete by earlier runs.
#[must_use]
pub fn plan_work_units(config: &RunConfig, store: &ReferenceStore) -> Vec<WorkUnit> {
    (config.unit_start..=config.unit_end)
        .filter(|id| {
            if store.is_work_unit_complete(*id) {
                debug!(unit = id, "skipping completed work unit");
                return false;
            }
            true
        })
        .map(|id| WorkUnit {
            id,
            url: render_unit_url(&config.listing_template, id),
        })
        .collect()
}

/// Executes a full acquisition run, owning session setup and teardown.
///
/// # Errors
///
/// Returns [`PipelineError`] on fatal failures (session init, storage). The
/// browser session is released before this returns, on every path.
#[instrument(skip_all, fields(unit_start = config.unit_start, unit_end = config.unit_end))]
pub async fn execute(
    config: &RunConfig,
    store: &mut ReferenceStore,
) -> Result<RunSummary, PipelineError> {
    let range_len = usize::try_from(
        config
            .unit_end
            .saturating_sub(config.unit_start)
            .saturating_add(1),
    )
    .unwrap_or(usize::MAX);
    let units = plan_work_units(config, store);
    let units_skipped = range_len - units.len();

    if units.is_empty() {
        info!("all work units in range already complete; nothing left to do");
        return Ok(RunSummary {
            units_skipped,
            ..RunSummary::default()
        });
    }

    let session = AcquisitionSession::open_chromium(config.headless).await?;
    let outcome = run_with_session(config, store, &session, units, units_skipped).await;
    if let Err(close_error) = session.close().await {
        warn!(%close_error, "failed to release browser session");
    }
    outcome
}

/// Runs discovery and download against an already-open session.
///
/// Split from [`execute`] so tests can drive the pipeline with scripted
/// sessions, and so the session is always closed by the caller regardless
/// of outcome.
///
/// # Errors
///
/// Returns [`PipelineError`] on fatal failures.
pub async fn run_with_session(
    config: &RunConfig,
    store: &mut ReferenceStore,
    session: &AcquisitionSession,
    units: Vec<WorkUnit>,
    units_skipped: usize,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary {
        units_planned: units.len(),
        units_skipped,
        ..RunSummary::default()
    };

    // Discovery phase: per-unit traversal with per-page persistence.
    let mut processed: Vec<u64> = Vec::new();
    for unit in &units {
        info!(unit = unit.id, url = %unit.url, "discovering work unit");
        let discovery = PaginatedDiscovery::with_profile(session, config.site.clone());
        match discovery
            .run_into_store(&unit.url, config.query.as_deref(), &config.pages, store)
            .await
        {
            Ok(report) => {
                summary.discovered += report.found;
                processed.push(unit.id);
            }
            Err(DiscoveryError::Store(store_error)) => {
                return Err(PipelineError::Store(store_error));
            }
            Err(discovery_error) => {
                warn!(
                    unit = unit.id,
                    error = %discovery_error,
                    "discovery failed for work unit; it stays pending for a later run"
                );
            }
        }
    }

    // Download phase consumes the full persisted log so references from an
    // earlier interrupted run are recovered.
    let references: Vec<DocumentReference> =
        store.load_all()?.collect::<Result<Vec<_>, StoreError>>()?;
    info!(references = references.len(), "download phase starting");

    let engine = DownloadEngine::new(config.request_delay);
    let bar = download_progress_bar(references.len() as u64);
    let mut tally = RunStats::default();
    let download_result = engine
        .download_all_observed(session, &references, &config.output_dir, |_, outcome| {
            tally.record(outcome);
            bar.inc(1);
        })
        .await;
    bar.finish_and_clear();

    match download_result {
        Ok(stats) => summary.stats = stats,
        Err(engine_error) => {
            error!(
                error = %engine_error,
                downloaded = tally.downloaded,
                already_present = tally.already_present,
                transient_failures = tally.transient_failures,
                permanent_failures = tally.permanent_failures,
                bytes = tally.bytes_total,
                "fatal storage failure; partial statistics above"
            );
            return Err(engine_error.into());
        }
    }

    // A unit is marked complete only after all of its discovered references
    // have been attempted, which the completed download phase guarantees.
    for id in &processed {
        store.mark_work_unit_complete(*id)?;
    }
    summary.units_completed = processed;

    info!(
        discovered = summary.discovered,
        downloaded = summary.stats.downloaded,
        already_present = summary.stats.already_present,
        transient_failures = summary.stats.transient_failures,
        permanent_failures = summary.stats.permanent_failures,
        bytes = summary.stats.bytes_total,
        units_completed = summary.units_completed.len(),
        units_skipped = summary.units_skipped,
        "run complete"
    );
    Ok(summary)
}

fn download_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
