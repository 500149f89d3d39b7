//! CLI entry point for the docharvest tool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use docharvest_core::{
    ReferenceStore, RunConfig, SiteProfile, TesseractRecognizer, ocr, pipeline,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    if args.start > args.end {
        bail!("work unit range is inverted: start {} > end {}", args.start, args.end);
    }
    if !args.listing_template.contains("{n}") {
        bail!("--listing-template must contain a {{n}} placeholder");
    }

    info!(
        start = args.start,
        end = args.end,
        pages = ?args.pages,
        "docharvest starting"
    );

    let mut store = ReferenceStore::open(args.reference_file(), args.completed_file())
        .context("failed to open reference store")?;

    let config = RunConfig {
        unit_start: args.start,
        unit_end: args.end,
        listing_template: args.listing_template.clone(),
        query: args.query.clone(),
        pages: args.pages.clone(),
        output_dir: args.output_dir.clone(),
        request_delay: Duration::from_millis(args.delay_ms),
        headless: args.headless,
        site: SiteProfile::default(),
    };

    let summary = pipeline::execute(&config, &mut store)
        .await
        .context("acquisition run failed")?;

    info!(
        discovered = summary.discovered,
        downloaded = summary.stats.downloaded,
        already_present = summary.stats.already_present,
        transient_failures = summary.stats.transient_failures,
        permanent_failures = summary.stats.permanent_failures,
        bytes = summary.stats.bytes_total,
        units_completed = summary.units_completed.len(),
        units_skipped = summary.units_skipped,
        "run summary"
    );

    if args.ocr {
        run_text_extraction(&args).await?;
    }

    if !summary.is_success() {
        warn!("run finished without a single successful download");
        std::process::exit(1);
    }

    Ok(())
}

/// Runs the decoupled post-acquisition text extraction stage.
async fn run_text_extraction(args: &Args) -> Result<()> {
    let recognizer =
        TesseractRecognizer::discover().context("OCR requested but no recognizer is available")?;
    let stats = ocr::extract_directory(
        Arc::new(recognizer),
        &args.output_dir,
        &args.text_dir,
        &args.ocr_lang,
        usize::from(args.ocr_workers),
    )
    .await
    .context("text extraction stage failed")?;

    info!(
        total = stats.total,
        processed = stats.processed,
        skipped = stats.skipped,
        failed = stats.failed,
        "text extraction summary"
    );
    Ok(())
}
