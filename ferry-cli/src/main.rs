//! Command-line entry points for the Ferry file-transfer protocol.
//!
//! `ferry send` connects to a receiver and ships one file; `ferry recv`
//! binds, accepts one connection and writes the received file into the
//! output directory.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ferrystream::{
    receive_file, send_file, send_file_with_faults, FaultInjector, FaultPlan, Session,
};

#[derive(Parser)]
#[command(name = "ferry", version, about = "Reliable file transfer over UDP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a receiver and send a file.
    Send {
        /// Path of the file to send.
        file: PathBuf,
        /// Receiver host.
        #[arg(long, default_value = "localhost")]
        host: String,
        /// Receiver port.
        #[arg(long, default_value_t = 5000)]
        port: u16,
        /// Probability of dropping a DATA packet (at most once per sequence).
        #[arg(long)]
        drop_rate: Option<f64>,
        /// Probability of corrupting a DATA packet (at most once per sequence).
        #[arg(long)]
        corrupt_rate: Option<f64>,
        /// Seed for the fault injector, for reproducible runs.
        #[arg(long)]
        fault_seed: Option<u64>,
    },
    /// Bind, accept one connection and receive a file.
    Recv {
        /// Host to bind.
        #[arg(long, default_value = "localhost")]
        host: String,
        /// Port to bind.
        #[arg(long, default_value_t = 5000)]
        port: u16,
        /// Directory the received file is written into.
        #[arg(long, default_value = "received_files")]
        output_dir: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Send {
            file,
            host,
            port,
            drop_rate,
            corrupt_rate,
            fault_seed,
        } => {
            let addr = resolve(&host, port).await?;
            let mut session = Session::open().await?;
            session
                .connect(addr)
                .await
                .with_context(|| format!("failed to connect to {addr}"))?;
            tracing::info!(%addr, "connected");

            let stats = if drop_rate.is_some() || corrupt_rate.is_some() {
                let plan = FaultPlan::Random {
                    drop_rate: drop_rate.unwrap_or(0.0),
                    corrupt_rate: corrupt_rate.unwrap_or(0.0),
                };
                let injector = match fault_seed {
                    Some(seed) => FaultInjector::with_seed(plan, seed),
                    None => FaultInjector::new(plan),
                };
                send_file_with_faults(&mut session, &file, injector).await?
            } else {
                send_file(&mut session, &file).await?
            };
            tracing::info!(
                sent = stats.packets_sent,
                dropped = stats.packets_dropped,
                corrupted = stats.packets_corrupted,
                retransmissions = stats.retransmissions,
                "file sent"
            );

            session.disconnect().await?;
            session.close();
        }
        Command::Recv {
            host,
            port,
            output_dir,
        } => {
            let addr = resolve(&host, port).await?;
            let mut session = Session::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            tracing::info!(%addr, "waiting for connection");
            let peer = session.accept().await.context("failed to accept")?;
            tracing::info!(%peer, "connected");

            let path = receive_file(&mut session, &output_dir).await?;
            tracing::info!(path = %path.display(), "file received");

            session.handle_disconnect().await?;
            session.close();
        }
    }
    Ok(())
}

async fn resolve(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("failed to resolve {host}:{port}"))?
        .next()
        .with_context(|| format!("no address for {host}:{port}"))
}
