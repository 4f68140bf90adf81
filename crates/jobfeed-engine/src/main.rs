//! Jobfeed - job posting aggregator CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jobfeed_common::logging::{init_logging, LogConfig, LogLevel};
use jobfeed_common::JobfeedError;
use jobfeed_engine::config::AppConfig;
use jobfeed_engine::db::{self, MemorySink, PostingStore};
use jobfeed_engine::ingest::{BatchConfig, IngestReport, IngestionService};
use jobfeed_engine::query::{FilterSpec, DEFAULT_LIMIT};
use jobfeed_engine::{JobFeed, ResilientFetcher, SourceRegistry};

#[derive(Parser, Debug)]
#[command(name = "jobfeed")]
#[command(author, version, about = "Aggregate internship postings from job boards")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply database migrations
    Migrate,

    /// Fetch postings from job boards
    Ingest {
        /// Source to ingest (repeatable); all registered sources when omitted
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Fetch and normalize without writing to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete postings older than the retention window
    Purge {
        /// Age in days; defaults to PURGE_DAYS
        #[arg(short, long)]
        days: Option<i32>,
    },

    /// Query stored postings
    Query {
        /// Filter as field=value[,value] (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Keyword expression such as "python, -java"
        #[arg(short, long)]
        keywords: Option<String>,

        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// List known employment types
    EmploymentTypes,

    /// List registered sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("jobfeed")
        .filter_directives("sqlx=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Ingest {
            sources,
            dry_run: true,
        } => dry_run(&sources).await,
        command => {
            let config = AppConfig::load().context("Failed to load configuration")?;
            let pool = db::create_pool(&config.database)
                .await
                .context("Failed to connect to database")?;
            db::health_check(&pool).await?;
            db::run_migrations(&pool).await?;

            let feed = JobFeed::from_config(&config, PostingStore::new(pool))?;
            run(command, &config, &feed).await
        },
    }
}

async fn run(command: Command, config: &AppConfig, feed: &JobFeed) -> Result<()> {
    match command {
        Command::Migrate => {
            info!("Migrations applied");
            let sources = feed.register_sources().await?;
            print_json(&sources)?;
        },
        Command::Ingest { sources, .. } => {
            feed.register_sources().await?;
            let cancel = cancel_on_ctrl_c();
            let reports = if sources.is_empty() {
                feed.run_all(&cancel).await
            } else {
                feed.ingestion().run_many(&sources, &cancel).await
            };
            summarize(&reports);
            print_json(&reports)?;
        },
        Command::Purge { days } => {
            let days = days.unwrap_or(config.retention.purge_days);
            if days < 0 {
                return Err(JobfeedError::invalid_value("--days", days.to_string()).into());
            }
            let removed = feed.purge_stale(days).await?;
            print_json(&serde_json::json!({ "days": days, "removed": removed }))?;
        },
        Command::Query {
            filters,
            keywords,
            limit,
            offset,
        } => {
            let filters = FilterSpec::from_pairs(&filters)?;
            let page = match keywords {
                Some(keywords) => {
                    feed.query_postings_by_keyword(&keywords, filters, limit, offset)
                        .await?
                },
                None => feed.query_postings(filters, limit, offset).await?,
            };
            print_json(&page)?;
        },
        Command::EmploymentTypes => {
            print_json(&feed.list_employment_types().await?)?;
        },
        Command::Sources => {
            feed.register_sources().await?;
            print_json(&feed.store().list_sources().await?)?;
        },
    }

    Ok(())
}

/// Ingest into memory and print what would have been stored
async fn dry_run(sources: &[String]) -> Result<()> {
    dotenvy::dotenv().ok();

    let fetch = jobfeed_engine::config::FetchConfig::from_env();
    fetch.validate()?;
    let ingest = jobfeed_engine::config::IngestConfig::from_env();
    ingest.validate()?;

    let sink = Arc::new(MemorySink::new());
    let service = IngestionService::new(
        SourceRegistry::from_config(&jobfeed_engine::config::SourcesConfig::from_env()),
        Arc::new(ResilientFetcher::from_config(&fetch)?),
        sink.clone(),
        BatchConfig::from_config(&ingest),
    );

    let cancel = cancel_on_ctrl_c();
    let names = if sources.is_empty() {
        service.registry().names()
    } else {
        sources.to_vec()
    };
    let reports = service.run_many(&names, &cancel).await;
    summarize(&reports);

    print_json(&serde_json::json!({
        "reports": reports,
        "postings": sink.postings().await,
    }))?;
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping ingestion after the current batch");
            token.cancel();
        }
    });
    cancel
}

fn summarize(reports: &[IngestReport]) {
    for report in reports {
        info!(
            source = %report.source,
            inserted = report.inserted,
            skipped = report.skipped,
            aborted = report.aborted,
            cancelled = report.cancelled,
            "Source finished"
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> jobfeed_common::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", rendered)?;
    Ok(())
}
