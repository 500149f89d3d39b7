//! Download engine: idempotent, sequential document acquisition.

mod engine;
mod error;
mod filename;

pub use engine::{
    DEFAULT_REQUEST_DELAY, DownloadEngine, DownloadResult, Fetcher, PDF_MAGIC, RunStats,
};
pub use error::EngineError;
