//! tickpipe CLI - replay server and receiver pipeline entry points

#![deny(warnings)]
#![deny(clippy::all)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{Config, StopFlag};
use pipeline::ReceiverPipeline;
use replay::ReplayServer;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "tickpipe")]
#[command(about = "Low-latency market-data ingestion and distribution pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a recorded trade file set: snapshot server plus multicast
    /// publisher.
    Server {
        /// Directory of recorded trade CSV files.
        #[arg(long)]
        data_dir: PathBuf,
        /// Skip the snapshot server and only publish.
        #[arg(long)]
        no_snapshot: bool,
    },
    /// Run the receiver pipeline: multicast in, sequenced fan-out to the
    /// database sink, VWAP aggregator and order book.
    Receiver {
        /// Stop after this many seconds instead of running until killed.
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let config = Config::from_env();
    match Cli::parse().command {
        Commands::Server {
            data_dir,
            no_snapshot,
        } => run_server(&config, &data_dir, !no_snapshot),
        Commands::Receiver { duration_secs } => run_receiver(&config, duration_secs),
    }
}

fn run_server(config: &Config, data_dir: &Path, with_snapshot: bool) -> Result<()> {
    info!("loading trade files from {}", data_dir.display());
    let server = ReplayServer::load(
        data_dir,
        config.server.clone(),
        with_snapshot,
        StopFlag::new(),
    )?;
    server.run()
}

fn run_receiver(config: &Config, duration_secs: Option<u64>) -> Result<()> {
    let pipeline = ReceiverPipeline::start(config)?;
    match duration_secs {
        Some(seconds) => {
            info!("running for {seconds}s");
            let deadline = std::time::Instant::now() + Duration::from_secs(seconds);
            while std::time::Instant::now() < deadline && !pipeline.is_stopped() {
                std::thread::sleep(Duration::from_millis(200));
            }
            pipeline.stop();
        }
        None => {
            info!("running until killed");
            while !pipeline.is_stopped() {
                std::thread::sleep(Duration::from_millis(200));
            }
        }
    }
    pipeline.join();
    Ok(())
}
