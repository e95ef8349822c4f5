//! Entry point for the `sackstream` binary.
//!
//! Runs either end of a transfer. The sender reads a file, streams it to the
//! receiver and exits once everything is acknowledged. The receiver serves
//! any number of senders until interrupted, writing each stream to its own
//! file.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use bytes::Bytes;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use sackstream::config::{CongestionMode, TransportConfig, DEFAULT_RECEIVE_WINDOW};
use sackstream::driver::{self, receiver::Receiver, sink::FileSink};
use sackstream::{run_sender, Result};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Role {
    Sender,
    Receiver,
}

/// Reliable byte-stream transfer over UDP with selective acknowledgments.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Which end of the transfer to run.
    #[arg(value_enum)]
    role: Role,

    /// Address to bind (receiver) or send to (sender).
    #[arg(long)]
    ip: IpAddr,

    #[arg(long)]
    port: u16,

    /// File to send. Required for the sender.
    #[arg(long, required_if_eq("role", "sender"))]
    sendfile: Option<PathBuf>,

    /// Receive window in bytes.
    #[arg(long, alias = "recv_window", default_value_t = DEFAULT_RECEIVE_WINDOW)]
    recv_window: u64,

    /// Fraction of data packets and acks to drop on purpose (0-1).
    #[arg(long, default_value_t = 0.0)]
    simloss: f64,

    /// Hold the congestion window at this many packets instead of running AIMD.
    #[arg(long)]
    fixed_cwnd: Option<u64>,

    /// Directory for received streams.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Seed for simulated loss.
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            receive_window: self.recv_window,
            loss_probability: self.simloss,
            congestion: match self.fixed_cwnd {
                Some(packets) => CongestionMode::Fixed { packets },
                None => CongestionMode::Aimd,
            },
            loss_seed: self.seed,
            ..TransportConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.transport_config();
    config.validate()?;
    let addr = SocketAddr::new(cli.ip, cli.port);

    match cli.role {
        Role::Receiver => {
            let sink = FileSink::new(&cli.output_dir)?;
            let receiver = Receiver::bind(addr, &config, sink).await?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cannot listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            };
            let report = receiver.serve(shutdown).await?;
            info!(?report, "receiver exiting");
        }
        Role::Sender => {
            let Some(path) = cli.sendfile.as_ref() else {
                warn!("no file to send");
                return Ok(());
            };
            let data = Bytes::from(tokio::fs::read(path).await?);
            let socket = driver::connect(addr).await?;
            let report = run_sender(&socket, data, &config).await?;
            if let Some(packets) = cli.fixed_cwnd {
                // `<window packets> <goodput bytes/s>`, one line per run.
                println!("{} {}", packets, report.goodput() as u64);
            }
        }
    }
    Ok(())
}
