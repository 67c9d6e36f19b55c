//! mig - offline MySQL to PostgreSQL migration.

mod logging;

use clap::Parser;
use mysql_pg_migrate::report::render_summary;
use mysql_pg_migrate::{test_connections, Config, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "mig")]
#[command(about = "Offline MySQL to PostgreSQL migration: schema, data, users and grants")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: config.yaml]
    #[arg(value_name = "CONFIG")]
    config_path: Option<PathBuf>,

    /// Path to YAML configuration file
    #[arg(short, long, value_name = "CONFIG", conflicts_with = "config_path")]
    config: Option<PathBuf>,
}

impl Cli {
    fn config_file(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(|| self.config_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), MigrateError> {
    let path = cli.config_file();
    let config = Config::load(&path)?;

    logging::init(&config.run)?;
    info!("Loaded configuration from {:?}", path);

    let error_log = config.run.error_log_path.clone();
    if let Err(e) = migrate(config).await {
        error!("{}", e);
        eprintln!("See {} for details", error_log);
        return Err(e);
    }
    Ok(())
}

async fn migrate(config: Config) -> Result<(), MigrateError> {
    if config.is_test_only() {
        return test_connections(&config).await;
    }

    let orchestrator = Orchestrator::connect(config).await?;
    let summary = orchestrator.run().await?;
    println!("{}", render_summary(&summary));
    Ok(())
}
