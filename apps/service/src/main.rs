mod cli;
mod config;
mod database;
mod error;
mod monitoring;
mod orchestrator;
mod pool;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing::level_filters::LevelFilter;

use cli::{Cli, Commands};
use config::Config;
use orchestrator::Orchestrator;
use render::render_snapshot;

#[tokio::main]
async fn main() -> Result<()> {
    logger::try_init(LevelFilter::INFO).context("failed to initialise logging")?;

    let cli = Cli::parse();
    let mut config = Config::from_config(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Config => {
            println!("{config}");
            Ok(())
        }
        Commands::Run => {
            let pool = open_pool(&config).await?;
            Orchestrator::start(config, pool).await
        }
        Commands::List => {
            let orchestrator = Orchestrator::new(config.clone(), open_pool(&config).await?).await?;
            let snapshots = orchestrator.load_snapshots().await;
            orchestrator.close();
            for snapshot in snapshots? {
                println!("{}", render_snapshot(&snapshot));
            }
            Ok(())
        }
        Commands::AddMonitor(args) => {
            let orchestrator = Orchestrator::new(config.clone(), open_pool(&config).await?).await?;
            let added = orchestrator.add_monitor(args.into()).await;
            orchestrator.close();
            let monitor = added?;
            println!("monitor({}): {} => ({}) added", monitor.id, monitor.name, monitor.url);
            Ok(())
        }
    }
}

async fn open_pool(config: &Config) -> Result<pool::LibsqlPool> {
    let path = std::path::Path::new(&config.database.path);
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }

    info!("Opening database at {}", config.database.path);
    pool::open_local(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("failed to open database {}", config.database.path))
}
