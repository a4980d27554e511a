use std::path::PathBuf;
use std::sync::Arc;

use agency_insights::api::{self, AppState};
use agency_insights::config::{Config, StoreBackend};
use agency_insights::fetch::{HttpFetcher, LocalFileFetcher};
use agency_insights::ingest::{self, UploadJob};
use agency_insights::insights::{self, AnalysisJob, GeminiClient, TextGenerator};
use agency_insights::models::DataCategory;
use agency_insights::store::{self, PgStore, Store};
use agency_insights::{performance, report};
use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "agency-insights")]
#[command(about = "SEO performance, CSV ingestion and insight service for agency clients", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo clients with two weeks of performance data
    Seed,
    /// Recompute and store one client's performance status
    Evaluate {
        #[arg(long)]
        client_id: Uuid,
    },
    /// Import keywords, backlinks or competitors from a local CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        client_id: Uuid,
        #[arg(long)]
        data_type: String,
    },
    /// Generate an AI insight for a client
    Analyze {
        #[arg(long)]
        client_id: Uuid,
        #[arg(long)]
        analysis_type: String,
        /// JSON payload handed to the model
        #[arg(long)]
        data: Option<String>,
    },
    /// Write a markdown performance report for every client
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn postgres(config: &Config) -> anyhow::Result<PgStore> {
    match &config.backend {
        StoreBackend::Postgres { database_url } => PgStore::connect(database_url).await,
        StoreBackend::Rest { .. } => bail!("this command needs DATABASE_URL to point at Postgres"),
    }
}

fn generator(config: &Config) -> anyhow::Result<Option<Arc<dyn TextGenerator>>> {
    let Some(gemini) = config.gemini.clone() else {
        return Ok(None);
    };
    let client: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(gemini)?);
    Ok(Some(client))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::Serve => {
            let state = AppState {
                store: store::connect(&config.backend).await?,
                fetcher: Arc::new(HttpFetcher::new()?),
                generator: generator(&config)?,
                today: api::utc_today,
            };
            api::serve(state, config.bind_addr).await?;
        }
        Commands::InitDb => {
            postgres(&config).await?.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            postgres(&config).await?.seed(today).await?;
            println!("Seed data inserted.");
        }
        Commands::Evaluate { client_id } => {
            let store = store::connect(&config.backend).await?;
            let report = performance::evaluate_client(store.as_ref(), client_id, today).await?;
            println!(
                "{} is {} ({:?}): traffic {:+.1}%, rankings {:+.1}%",
                client_id,
                report.performance_status,
                report.trend,
                report.metrics.traffic_change,
                report.metrics.ranking_change
            );
        }
        Commands::Import {
            csv,
            client_id,
            data_type,
        } => {
            let store = store::connect(&config.backend).await?;
            let job = UploadJob {
                file_url: csv.display().to_string(),
                client_id,
                category: data_type.parse::<DataCategory>()?,
            };
            let summary =
                ingest::process_upload(store.as_ref(), &LocalFileFetcher, &job, today).await?;
            println!(
                "Inserted {} of {} {} rows from {}.",
                summary.records_inserted,
                summary.records_processed,
                summary.data_type.as_str(),
                csv.display()
            );
        }
        Commands::Analyze {
            client_id,
            analysis_type,
            data,
        } => {
            let store = store::connect(&config.backend).await?;
            let data = match data {
                Some(raw) => serde_json::from_str(&raw).context("--data must be valid JSON")?,
                None => serde_json::Value::Null,
            };
            let generator = generator(&config)?;
            let job = AnalysisJob {
                client_id,
                analysis_type,
                data,
            };
            let result = insights::analyze(store.as_ref(), generator.as_deref(), job).await?;
            println!("{}", result.analysis);
        }
        Commands::Report { out } => {
            let store = store::connect(&config.backend).await?;
            let clients = store.list_clients().await?;
            let mut reports = Vec::with_capacity(clients.len());
            for client in &clients {
                reports.push(performance::preview_client(store.as_ref(), client.id, today).await?);
            }
            let output = report::build_report(today, &clients, &reports);
            std::fs::write(&out, output)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
