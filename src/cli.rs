use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

pub const DEFAULT_DB_PATH: &str = "~/.hie-integrator/integrator.db";
pub const DEFAULT_FORMATS: &str = "XML^HL7^231^CCD^C32,XML^HL7^231^CCD^V1.1";

#[derive(Parser, Debug)]
#[command(
    name = "hie-integrator",
    version,
    about = "Copy new HIE documents for a set of EE numbers into an ingest server"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synchronize documents from the HIE into the ingest server
    Sync(SyncArgs),

    /// Show transaction log statistics
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// HIE document query URL
    #[arg(long = "hie", env = "HIE_URL")]
    pub hie_url: String,

    /// HIE basic-auth user
    #[arg(long, env = "HIE_USER")]
    pub user: Option<String>,

    /// HIE basic-auth password.
    /// WARNING: passing via --password is visible in process listings.
    /// Prefer the HIE_PASSWORD environment variable instead.
    #[arg(long, env = "HIE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Ingest server URL; ":port" means http://localhost:port
    #[arg(long = "ingest", env = "INGEST_URL")]
    pub ingest_url: String,

    /// EE number(s) to synchronize, comma separated
    #[arg(long, env = "EE", value_delimiter = ',', conflicts_with = "ee_file")]
    pub ee: Vec<String>,

    /// File with one EE number per line ('#' starts a comment)
    #[arg(long, env = "EE_FILE")]
    pub ee_file: Option<String>,

    /// Supported document formats, comma separated
    #[arg(long, env = "FORMATS", default_value = DEFAULT_FORMATS)]
    pub formats: String,

    /// Transaction log database
    #[arg(long, env = "INTEGRATOR_DB", default_value = DEFAULT_DB_PATH)]
    pub db: String,

    /// Also keep a copy of every document under this directory
    #[arg(long, env = "COPY_DIR")]
    pub copy_dir: Option<String>,

    /// Synchronize immediately
    #[arg(long, env = "INTEGRATOR_NOW", value_parser = BoolishValueParser::new())]
    pub now: bool,

    /// Run continuously, waiting N seconds between runs
    #[arg(long, env = "INTEGRATOR_WATCH_INTERVAL", conflicts_with = "cron")]
    pub watch_with_interval: Option<u64>,

    /// Run on a cron schedule (seconds field first, e.g. "0 0 20 * * *")
    #[arg(long, env = "INTEGRATOR_CRON")]
    pub cron: Option<String>,

    /// Number of EE numbers synchronized in parallel
    #[arg(long, env = "INTEGRATOR_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Transaction log database
    #[arg(long, env = "INTEGRATOR_DB", default_value = DEFAULT_DB_PATH)]
    pub db: String,

    /// Only report failing entries for this EE number
    #[arg(long)]
    pub ee: Option<String>,

    /// List failing entries with their last error
    #[arg(long)]
    pub failed: bool,
}
