use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use task_queue_worker::{AppCatalog, ApplicationRunner, WorkerApplicationConfig};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tq-worker")]
#[command(about = "Task Queue Worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a worker application
    Run {
        /// Application locator, "<module>:<attribute>"
        app: String,

        /// Development mode
        #[arg(long)]
        reload: bool,

        /// Path to configuration file
        #[arg(short, long, default_value = "worker.yaml")]
        config: PathBuf,

        /// Worker name (auto-generated if not provided)
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { app, reload, config, name } => run(&app, reload, config, name).await,
    }
}

async fn run(locator: &str, reload: bool, config_path: PathBuf, name: Option<String>) -> ExitCode {
    let mut config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(name) = name {
        config.name = name;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("Starting worker application {}", locator);
    if reload {
        warn!("Development mode enabled (--reload)");
    } else {
        info!("Running in production mode");
    }

    let app = match AppCatalog::builtin().resolve(locator, config) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to import application: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Registered task kinds: {:?}", app.kinds());

    let mut runner = ApplicationRunner::new(app);
    match runner.startup().await {
        Ok(outcome) => {
            info!("Worker exited ({:?})", outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Application crashed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<WorkerApplicationConfig> {
    WorkerApplicationConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
