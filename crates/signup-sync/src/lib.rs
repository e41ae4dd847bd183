//! Signup Sync
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Copies signup-form rows from a spreadsheet into a Notion database, with
//! the images each row links to committed to a GitHub repository and
//! attached to the record by their public URL.
//!
//! # Pipeline
//!
//! - **Schema / Mapper**: typed conversion of each row ([`schema`], [`mapper`])
//! - **Resolver**: share link to image bytes and a repository path ([`resolver`])
//! - **Publisher**: one commit per batch of images ([`publisher`])
//! - **Dedup / Writer**: skip known handles, create records ([`dedup`], [`writer`])
//! - **Orchestrator**: batching, phase ordering and the shared limiter ([`orchestrator`])
//!
//! External services sit behind the traits in [`clients`].

pub mod clients;
pub mod config;
pub mod dedup;
pub mod error;
pub mod limiter;
pub mod mapper;
pub mod orchestrator;
pub mod outcome;
pub mod publisher;
pub mod resolver;
pub mod schema;
pub mod writer;

pub use error::{Result, SyncError};
pub use orchestrator::{BatchOrchestrator, Collaborators, RunState};
pub use outcome::{Outcome, OutcomeStatus, RunSummary, Warning, WarningKind};
pub use schema::Schema;

use clap::Parser;
use config::SyncConfig;
use std::path::PathBuf;

/// Sync signup-form responses into the records database
#[derive(Parser, Debug)]
#[command(name = "signup-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read rows from a local CSV export instead of the Sheets API
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// JSON schema file (defaults to the built-in signup form)
    #[arg(long, value_name = "PATH")]
    pub schema: Option<PathBuf>,

    /// Rows per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Simultaneous downloads and writes
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long)]
    pub batch_delay_ms: Option<u64>,

    /// Map and validate rows without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Overlay command-line flags on the environment configuration
    pub fn apply(&self, config: &mut SyncConfig) -> Result<()> {
        if let Some(ref path) = self.schema {
            config.schema_path = Some(path.clone());
        }
        if let Some(n) = self.batch_size {
            config.pipeline.batch_size = n;
        }
        if let Some(n) = self.max_concurrency {
            config.pipeline.max_concurrency = n;
        }
        if let Some(ms) = self.batch_delay_ms {
            config.pipeline.batch_delay_ms = ms;
        }
        if self.dry_run {
            config.pipeline.dry_run = true;
        }
        config.pipeline.validate()
    }
}
