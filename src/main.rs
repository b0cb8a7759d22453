//! `invoice-extractor` binary entry point: a thin `clap` wrapper around
//! library-level `serve`/`worker` runners, for local and manual running.
//! Not part of the ingress contract.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invoice_extractor::api::{self, AppState};
use invoice_extractor::config::Settings;
use invoice_extractor::extraction::ExtractionService;
use invoice_extractor::llm::LlmClient;
use invoice_extractor::ocr::HostedOcrProvider;
use invoice_extractor::orchestrator::{Orchestrator, OrchestratorConfig};
use invoice_extractor::repository::{AsyncSqlitePool, DieselJobStore, JobStore};

#[derive(Parser)]
#[command(name = "invoice-extractor")]
#[command(about = "Asynchronous invoice extraction job orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the read/submit API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value = "8080")]
        port: u16,
    },
    /// Run the worker pool that drains the job queue.
    Worker {
        #[arg(long, default_value = "25")]
        concurrency: usize,
    },
}

fn init_tracing() {
    let default_filter = "invoice_extractor=info";
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_job_store(settings: &Settings) -> Arc<dyn JobStore> {
    let pool = AsyncSqlitePool::new(&settings.database_url);
    Arc::new(DieselJobStore::new(pool))
}

fn build_orchestrator(settings: &Settings, store: Arc<dyn JobStore>) -> Orchestrator {
    let ocr = Arc::new(HostedOcrProvider::new(
        settings.ocr_provider.clone(),
        settings.ocr_endpoint.clone(),
        settings.ocr_api_key.clone(),
    ));
    let llm = LlmClient::new(
        settings.llm_endpoint.clone(),
        settings.llm_api_key.clone(),
        settings.llm_model.clone(),
    );
    let http = reqwest::Client::new();

    Orchestrator::new(
        store,
        ocr,
        http,
        ExtractionService::with_temperature(llm, settings.llm_temperature),
        OrchestratorConfig {
            allowed_pdf_hosts: settings.allowed_pdf_hosts.clone(),
            ocr_text_max_bytes: settings.ocr_text_max_bytes,
            max_pdf_bytes: settings.max_pdf_bytes,
        },
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Serve { host, port } => {
            let store = build_job_store(&settings);
            let state = AppState {
                store,
                ocr_retrieval_max_bytes: settings.ocr_retrieval_max_bytes,
            };
            let app = api::create_router(state);

            let addr: std::net::SocketAddr = format!("{host}:{port}").parse()?;
            tracing::info!(%addr, "starting invoice-extractor API server");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Commands::Worker { concurrency } => {
            let store = build_job_store(&settings);
            let orchestrator = build_orchestrator(&settings, store);

            tracing::info!(concurrency, "starting invoice-extractor worker pool");
            let handles = orchestrator.run_worker_pool(concurrency);
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    Ok(())
}
