use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

mod agent;
mod assistant;
mod bridge;
mod error;
mod knowledge;
mod measurements;
mod server;
mod session;
mod settings;
mod store;

use settings::{EffectiveSettings, GlobalConfigDefaults, PollPolicy, RequestOverrides, SessionSettings};

#[derive(Debug, Parser)]
#[command(name = "turbo4")]
#[command(about = "Assistant-driven 1BRC workbench", long_about = None)]
struct Cli {
    /// JSON file with session defaults (model, poll, data_dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true)]
    data_dir: Option<String>,
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,
    #[arg(long, global = true)]
    max_polls: Option<u32>,
    /// Exposes Prometheus metrics on this address.
    #[arg(long, global = true)]
    metrics_listen: Option<SocketAddr>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the page reader and bridge over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:7171")]
        listen: String,
    },
    /// Generate a synthetic measurements file.
    Measurements {
        count: Option<String>,
        #[arg(long)]
        stations: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Load a measurements file into the local store and rebuild `brc`.
    Import {
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Print one page of a table as JSON.
    Page {
        table: store::Table,
        page: u32,
        #[arg(default_value_t = 10)]
        items_per_page: u32,
    },
    /// Fetch a page and store its text as a knowledge file.
    Collect { url: String, write_path: PathBuf },
    /// Run the scripted assistant session.
    Agent,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<EffectiveSettings> {
        let session = match &self.config {
            Some(path) => serde_json::from_str::<SessionSettings>(&std::fs::read_to_string(path)?)?,
            None => SessionSettings::default(),
        };
        let poll = (self.poll_interval_ms.is_some() || self.max_polls.is_some())
            .then(|| PollPolicy { interval_ms: self.poll_interval_ms, max_polls: self.max_polls });
        let request = RequestOverrides { model: self.model.clone(), poll, data_dir: self.data_dir.clone() };
        Ok(settings::resolve_effective_settings(&GlobalConfigDefaults::from_env(), &session, &request))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    if let Some(addr) = cli.metrics_listen {
        metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr).install()?;
        tracing::info!(%addr, "metrics exporter listening");
    }
    let settings = cli.settings()?;

    match cli.command {
        Commands::Serve { listen } => {
            let addr: SocketAddr = listen.parse()?;
            let state = server::AppState { bridge: bridge::Bridge::new(settings.db_path()) };
            server::serve(addr, state).await?;
        }
        Commands::Measurements { count, stations, out } => {
            let count = match measurements::parse_count(count.as_deref()) {
                Ok(n) => n,
                Err(usage) => {
                    eprintln!("{usage}");
                    std::process::exit(1);
                }
            };
            let stations = stations.unwrap_or_else(|| settings.stations_path());
            let out = out.unwrap_or_else(|| settings.measurements_path());
            let rows = measurements::parse_station_rows(&std::fs::read_to_string(&stations)?)?;
            let mut rng = rand::thread_rng();
            let stations = measurements::generate_stations(&rows, &mut rng)?;
            let written = measurements::write_measurements(&out, &stations, count, &mut rng)?;
            tracing::info!(written, path = %out.display(), "measurements written");
        }
        Commands::Import { source } => {
            let source = source.unwrap_or_else(|| settings.measurements_path());
            let summary = store::import_measurements(&settings.db_path(), &source).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Page { table, page, items_per_page } => {
            let page = store::read_page(&settings.db_path(), table, page, items_per_page).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Collect { url, write_path } => {
            let knowledge = knowledge::KnowledgeCollector::default().collect(&url, &write_path).await?;
            if let Some(err) = knowledge.error {
                tracing::warn!(%url, error = %err, "collected with error");
            }
        }
        Commands::Agent => {
            let api = assistant::openai::OpenAiAssistants::from_settings(&settings);
            let turbo = agent::engine::Turbo4::from_settings(api, &settings);
            let chat = agent::driver::run(
                &turbo,
                &knowledge::KnowledgeCollector::default(),
                &agent::driver::KnowledgeSources::default(),
                &settings.model,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&chat)?);
        }
    }
    Ok(())
}
