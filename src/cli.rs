//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use docharvest_core::PageRange;

/// Acquire gated, paginated document listings and archive them locally.
///
/// Docharvest walks a range of listing work units, discovers document
/// references page by page, and downloads each document exactly once,
/// resuming safely across restarts. An interactive verification gate is
/// passed at most once per run.
#[derive(Parser, Debug)]
#[command(name = "docharvest")]
#[command(author, version, about)]
pub struct Args {
    /// First work unit (dataset number) to process, inclusive
    #[arg(value_name = "START")]
    pub start: u64,

    /// Last work unit (dataset number) to process, inclusive
    #[arg(value_name = "END")]
    pub end: u64,

    /// Listing URL template; `{n}` is replaced with the work unit number
    #[arg(long, value_name = "URL")]
    pub listing_template: String,

    /// Free-text query submitted to the listing's search form
    #[arg(long)]
    pub query: Option<String>,

    /// Page range to extract: `all`, `N`, `N-M`, or `N-`
    #[arg(long, default_value = "all")]
    pub pages: PageRange,

    /// Directory for downloaded documents
    #[arg(short = 'o', long, default_value = "./pdfs")]
    pub output_dir: PathBuf,

    /// Directory for durable run state (reference log, completed units)
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Custom reference file path (default: <DATA_DIR>/<query>_urls.txt,
    /// or <DATA_DIR>/references.txt without a query)
    #[arg(long)]
    pub url_file: Option<PathBuf>,

    /// Run the browser without a visible window
    #[arg(long)]
    pub headless: bool,

    /// Fixed delay between document requests in milliseconds (max 60000)
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub delay_ms: u64,

    /// Run OCR text extraction over the output directory after downloading
    #[arg(long)]
    pub ocr: bool,

    /// OCR language code
    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    /// Parallel OCR worker processes (1-32)
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub ocr_workers: u8,

    /// Directory for extracted text output
    #[arg(long, default_value = "texts")]
    pub text_dir: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Resolved reference log path: explicit override, query-derived name,
    /// or the default.
    #[must_use]
    pub fn reference_file(&self) -> PathBuf {
        if let Some(path) = &self.url_file {
            return path.clone();
        }
        match &self.query {
            Some(query) => {
                let safe = query.replace(' ', "_");
                self.data_dir.join(format!("{safe}_urls.txt"))
            }
            None => self.data_dir.join("references.txt"),
        }
    }

    /// Resolved completed-work-unit file path.
    #[must_use]
    pub fn completed_file(&self) -> PathBuf {
        self.data_dir.join("completed.txt")
    }
}
