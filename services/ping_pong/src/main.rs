//! Ping/pong node
//!
//! Usage:
//!   ping_pong --in-memory
//!   ping_pong --config config/ping_pong.toml
//!   ping_pong --role ponger --config node_b.toml
//!   ping_pong --role pinger --config node_a.toml

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ping_pong::PingReport;
use runtime_config::{RuntimeConfig, ENV_PREFIX};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ping_pong")]
#[command(about = "Two actors exchanging pings through the dispatcher")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overrides `logging.level` (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Run both actors on the in-memory network instead of UDP
    #[arg(long)]
    in_memory: bool,

    /// Run a single actor against `transport.peer` in another process
    #[arg(long, value_enum)]
    role: Option<Role>,

    /// Number of ping round trips
    #[arg(long, default_value_t = 10)]
    rounds: u64,

    /// Give up after this long without a datagram
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Pinger,
    Ponger,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = RuntimeConfig::load(args.config.as_deref(), ENV_PREFIX)?;
    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }
    init_logging(&args, &config)?;

    info!("Starting ping/pong node");
    if let Some(path) = &args.config {
        info!("Configuration: {}", path.display());
    }
    let timeout = Duration::from_millis(args.timeout_ms);

    let outcome = match (args.in_memory, args.role) {
        (true, _) => ping_pong::run_in_memory(&config, args.rounds).map(Some),
        (false, None) => ping_pong::run_udp_local(&config, args.rounds, timeout)
            .await
            .map(Some),
        (false, Some(Role::Pinger)) => {
            let peer = config
                .transport
                .peer
                .context("--role pinger needs transport.peer")?;
            ping_pong::run_udp_role(&config, Some(peer), args.rounds, timeout).await
        }
        (false, Some(Role::Ponger)) => {
            ping_pong::run_udp_role(&config, None, args.rounds, timeout).await
        }
    };

    match outcome {
        Ok(Some(report)) => log_report(&report),
        Ok(None) => info!("Ponger finished {} rounds", args.rounds),
        Err(e) => {
            error!("Ping/pong failed: {:#}", e);
            return Err(e);
        }
    }
    Ok(())
}

fn init_logging(args: &Args, config: &RuntimeConfig) -> Result<()> {
    let directive = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_new(directive)
        .with_context(|| format!("Invalid log filter {directive:?}"))?;

    if args.json_logs || config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn log_report(report: &PingReport) {
    info!(
        rounds = report.rounds,
        mean_rtt_us = report.mean_rtt().as_micros() as u64,
        max_rtt_us = report.max_rtt.as_micros() as u64,
        "All round trips completed"
    );
}
