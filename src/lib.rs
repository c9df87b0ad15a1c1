//! Repository intelligence: an incremental, SQLite-backed index of symbols,
//! imports and file dependencies, with impact analysis, hotspot ranking and
//! graph export on top.
//!
//! The entry point is [`Indexer`], bound to one repository root. Callers own
//! their indexers; nothing here is cached process-wide.

pub mod analysis;
pub mod config;
pub mod discover;
pub mod error;
pub mod history;
pub mod indexer;
pub mod languages;
pub mod resolve;
pub mod store;
pub mod watch;
pub mod workspace;

pub use error::IndexError;
pub use indexer::{IndexMode, IndexOptions, IndexSummary, Indexer};

use clap::ValueEnum;

/// How query results are printed.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Aligned, human-readable lines
    #[default]
    Text,
    /// A single JSON document
    Json,
    /// One JSON object per row
    Jsonl,
    Csv,
    Tsv,
}

/// Process exit status: 0 results, 1 nothing matched, 2 failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    NotFound = 1,
    Error = 2,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// `Success` when something was found, otherwise `NotFound`.
    pub fn found(found: bool) -> Self {
        if found {
            ExitCode::Success
        } else {
            ExitCode::NotFound
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}
