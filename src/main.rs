//! iris - WhatsApp Cloud API messaging gateway.
//!
//! CLI entry point for the webhook server and batch jobs.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use iris_client::{AnalyticsIngestor, HttpTransport};
use iris_core::GatewayConfig;
use iris_store::SqliteStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "iris", about = "WhatsApp Cloud API messaging gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the webhook server
    Serve {
        /// Host to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Ingest template analytics for a date window
    IngestAnalytics {
        /// Window start (inclusive), YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Window end (exclusive), YYYY-MM-DD
        #[arg(long)]
        end: String,
        /// Comma-separated template ids
        #[arg(long, value_delimiter = ',')]
        template_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iris=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::Serve { host, port } => iris::server::run(&host, port).await,
        Command::IngestAnalytics {
            start,
            end,
            template_ids,
        } => ingest_analytics(&start, &end, template_ids).await,
    }
}

async fn ingest_analytics(start: &str, end: &str, template_ids: Vec<String>) -> Result<()> {
    let config = GatewayConfig::from_env().context("Failed to load configuration")?;

    let start = parse_date(start).context("Invalid --start date")?;
    let end = parse_date(end).context("Invalid --end date")?;

    let db_path = iris::server::default_data_dir().join("iris.db");
    let store = Arc::new(
        SqliteStore::from_path(&db_path)
            .await
            .context("Failed to initialize SQLite store")?,
    );
    let transport = Arc::new(HttpTransport::new(config.clone())?);

    let ingestor = AnalyticsIngestor::new(transport, store, config);
    let report = ingestor.run(&template_ids, start, end).await?;

    info!(
        processed = report.processed,
        saved = report.saved,
        skipped = report.skipped,
        errored_chunks = report.errored_chunks,
        "analytics ingestion done"
    );
    Ok(())
}

/// Parse `YYYY-MM-DD` as UTC midnight.
fn parse_date(value: &str) -> Result<chrono::DateTime<Utc>> {
    let date: NaiveDate = value.parse()?;
    let midnight = date.and_hms_opt(0, 0, 0).context("invalid date")?;
    Ok(Utc.from_utc_datetime(&midnight))
}
