//! CLI entry point for the MEXC spot rebalancer.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};

use mexc_rebalancer::config::Config;
use mexc_rebalancer::error::Error;
use mexc_rebalancer::exchange::Credentials;
use mexc_rebalancer::exchange::mexc::MexcClient;
use mexc_rebalancer::execution::{self, RunOptions};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Periodic quote-balance rebalancer for a MEXC spot pair")]
#[command(version)]
struct Cli {
    /// Path to config.toml (built-in defaults are used if absent)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the rebalance loop; runs until interrupted
    Run {
        /// Log decisions without placing orders
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current balances, price, and deviation
    Balances,

    /// Check exchange connectivity and credentials
    Status,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load_or_default(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let credentials = match Credentials::from_env_or_prompt() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading credentials: {e}");
            process::exit(1);
        }
    };

    let client = MexcClient::new(credentials, &config.exchange.host);

    let result = match cli.command {
        Command::Run { dry_run } => {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stop);
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
                eprintln!("Error installing signal handler: {e}");
                process::exit(1);
            }
            execution::run(&client, &config, &RunOptions { dry_run }, &stop)
        }
        Command::Balances => execution::show_balances(&client, &config),
        Command::Status => execution::check_status(&client, &config),
    };

    if let Err(e) = result {
        match &e {
            Error::Auth(_) => {
                eprintln!("\nAuthentication failed: {e}");
                process::exit(2);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
