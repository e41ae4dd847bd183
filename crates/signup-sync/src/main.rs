//! Signup Sync - Main entry point

use anyhow::Context;
use clap::Parser;
use signup_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use signup_sync::clients::{
    ContentHost, CsvSource, Disabled, GitHubClient, HttpFetcher, LinkFetcher, NotionClient,
    RecordStore, SheetSource, SheetsClient,
};
use signup_sync::config::{GitHubConfig, NotionConfig, SheetsConfig, SyncConfig};
use signup_sync::{BatchOrchestrator, Cli, Collaborators, RunSummary, Schema};
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env is fine; the variables may come from the shell
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .output(LogOutput::Console)
        .log_file_prefix("signup-sync")
        .build();

    // Environment variables take precedence over the flag defaults
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    match run(&cli).await {
        Ok(summary) => println!("{}", summary),
        Err(e) => {
            error!(error = %e, "Sync aborted");
            eprintln!("Error: {:#}", e);
            process::exit(1);
        },
    }
}

async fn run(cli: &Cli) -> anyhow::Result<RunSummary> {
    let mut config = SyncConfig::from_env().context("Failed to load configuration")?;
    cli.apply(&mut config)?;

    let schema = match config.schema_path {
        Some(ref path) => Schema::from_file(path)
            .with_context(|| format!("Failed to load schema from {}", path.display()))?,
        None => Schema::signup_form(),
    };

    let source: Arc<dyn SheetSource> = match cli.csv {
        Some(ref path) => Arc::new(CsvSource::new(path)),
        None => Arc::new(SheetsClient::new(SheetsConfig::from_env()?)?),
    };

    let deps = if config.pipeline.dry_run {
        info!("Dry run: nothing will be downloaded, published or written");
        let store: Arc<dyn RecordStore> = Arc::new(Disabled("record store"));
        let host: Arc<dyn ContentHost> = Arc::new(Disabled("content host"));
        let fetcher: Arc<dyn LinkFetcher> = Arc::new(Disabled("image download"));
        Collaborators {
            source,
            store,
            host,
            fetcher,
        }
    } else {
        Collaborators {
            source,
            store: Arc::new(NotionClient::new(NotionConfig::from_env()?)?),
            host: Arc::new(GitHubClient::new(GitHubConfig::from_env()?)?),
            fetcher: Arc::new(HttpFetcher::new(config.pipeline.image_timeout())?),
        }
    };

    let orchestrator = BatchOrchestrator::new(deps, schema, config.pipeline)?;
    Ok(orchestrator.run().await?)
}
