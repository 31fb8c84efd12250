//! CLI command structure using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::database::models::NewMonitor;

#[derive(Parser)]
#[command(name = "heartbeat")]
#[command(version, about = "Periodic HTTP uptime checks backed by SQLite", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (default: $XDG_CONFIG_HOME/heartbeat/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overrides `database.path`
    #[arg(short, long, global = true)]
    pub database: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check every monitor until interrupted (default)
    Run,

    /// Print the current state of every monitor
    List,

    /// Register a new HTTP monitor
    AddMonitor(AddMonitorArgs),

    /// Show the effective configuration
    Config,
}

#[derive(Args)]
pub struct AddMonitorArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub url: String,

    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Seconds between checks
    #[arg(long, default_value_t = 60)]
    pub interval: u64,

    #[arg(long, default_value_t = 200)]
    pub min_status: u16,

    #[arg(long, default_value_t = 299)]
    pub max_status: u16,

    /// 0 disables redirect following
    #[arg(long, default_value_t = 5)]
    pub max_redirects: u32,

    /// Delete heartbeats and failures older than this many days
    #[arg(long)]
    pub keep_days: Option<u32>,

    /// JSON object of request headers
    #[arg(long)]
    pub headers: Option<String>,

    /// JSON request body
    #[arg(long)]
    pub body: Option<String>,
}

impl From<AddMonitorArgs> for NewMonitor {
    fn from(args: AddMonitorArgs) -> Self {
        let mut monitor = NewMonitor::new(args.name, args.url);
        monitor.method = args.method;
        monitor.heart_beat_interval = args.interval;
        monitor.min_acceptable_status_code = args.min_status;
        monitor.max_acceptable_status_code = args.max_status;
        monitor.max_redirects = args.max_redirects;
        monitor.keep_data_for_days = args.keep_days;
        monitor.headers = args.headers;
        monitor.body = args.body;
        monitor
    }
}
