//! deskline - Zendesk extraction CLI
//!
//! Pulls Zendesk objects (tickets, users, comments, ...) for one or more
//! subdomains into JSON Lines files.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "deskline")]
#[command(about = "Extract Zendesk objects into JSON Lines files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./deskline.toml or ~/.config/deskline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Read timeout in seconds
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Maximum attempts per page while rate limited
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch objects from Zendesk
    Fetch(cmd::fetch::FetchArgs),
    /// List supported objects
    Objects,
    /// Print the output schema of an object as JSON
    Schema(cmd::schema::SchemaArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(deskline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    deskline_core::init_logging(quiet, cli.debug, multi);

    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    // CLI overrides for HTTP settings
    if let Some(read_timeout) = cli.read_timeout {
        config.http.read_timeout = read_timeout;
    }
    if let Some(max_retries) = cli.max_retries {
        config.http.max_retries = max_retries;
    }

    match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, &config, &progress),
        Command::Objects => cmd::objects::run(),
        Command::Schema(args) => cmd::schema::run(args),
        Command::Config => cmd::show_config(&config),
    }
}
