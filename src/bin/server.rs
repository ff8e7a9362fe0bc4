use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use monitor_engine::alerting::EvaluationService;
use monitor_engine::db::{InMemoryMonitorStore, MonitorStore, PgMonitorStore, RecordLocks};
use monitor_engine::notifications::WebhookNotifier;
use monitor_engine::probe::DefaultProber;
use monitor_engine::reactions::UnconfiguredScriptRunner;
use monitor_engine::scheduler::MonitorScheduler;
use monitor_engine::server::{MonitorService, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn open_store(config: &ServerConfig) -> Result<Arc<dyn MonitorStore>, Box<dyn std::error::Error + Send + Sync>> {
    match config.database_url.as_deref() {
        Some(database_url) => {
            let store = PgMonitorStore::connect(database_url).await?;
            store.initialize_schema().await?;
            info!("Connected to Postgres monitor store.");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL is not set; monitors are kept in memory and lost on restart.");
            Ok(Arc::new(InMemoryMonitorStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!("Starting monitor server, version: {}", env!("CARGO_PKG_VERSION"));

    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to open monitor store.");
            return Err(e);
        }
    };

    let locks = Arc::new(RecordLocks::new());
    let notifier = Arc::new(WebhookNotifier::new(config.notify_timeout())?);
    let evaluator = Arc::new(EvaluationService::new(
        store.clone(),
        notifier,
        Arc::new(UnconfiguredScriptRunner),
        locks.clone(),
        config.reaction_timeout(),
        config.notify_timeout(),
    ));
    let prober = Arc::new(DefaultProber::new(config.script_shell.clone())?);
    let scheduler = Arc::new(MonitorScheduler::new(evaluator, prober));
    let service = MonitorService::new(store, scheduler.clone(), locks);

    let registered = service.bootstrap().await?;
    info!(registered, "Monitor scheduler running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping monitor tasks.");
    scheduler.shutdown().await;
    info!("Monitor server stopped.");
    Ok(())
}
