//! Field relay binary.
//!
//! Bridges the local sensor and modem to the control server: keeps one TCP
//! session to the server, forwards measurements and status, and executes
//! commands received over the session or by SMS.

use anyhow::Context;
use clap::Parser;
use relay_control::{Encoders, Relay, Subsystems, SystemClock};
use relay_session::TcpDialer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod scheduler;
mod standalone;
mod system;

use config::RelayConfig;
use logging::RelayLogFormatter;
use scheduler::TokioScheduler;
use standalone::{IdleSensor, StandaloneConnectivity};
use system::OsActions;

/// Cellular telemetry relay
#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "Telemetry and command relay between a field sensor and its control server")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "relay.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disable ANSI colours in log output
    #[arg(long)]
    no_color: bool,

    /// Control server address, e.g. relay.example.net:5000 (overrides the config file)
    #[arg(long)]
    server: Option<String>,

    /// Delay before redialling the server, e.g. 10s (overrides the config file)
    #[arg(long)]
    reconnect_delay: Option<humantime::Duration>,
}

fn init_tracing(log_level: &str, no_color: bool) -> anyhow::Result<()> {
    let mut env_filter = EnvFilter::new("info");
    for target in ["relay", "relay_wire", "relay_storage", "relay_session", "relay_control"] {
        env_filter = env_filter.add_directive(format!("{}={}", target, log_level).parse()?);
    }

    let mut formatter = RelayLogFormatter::new("relay");
    if no_color {
        formatter = formatter.with_color(false);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(!no_color)
        .event_format(formatter)
        .init();
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.no_color)?;

    info!("Starting relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = RelayConfig::load_from_file(&args.config)?;
    if let Some(server) = &args.server {
        config.set_server(server)?;
    }
    if let Some(delay) = args.reconnect_delay {
        config.reconnect_delay = delay.into();
    }

    let subsystems = Subsystems {
        connectivity: Arc::new(StandaloneConnectivity::new(config.network_type)),
        sensor: Arc::new(IdleSensor::new()),
        system: Arc::new(OsActions),
        scheduler: Arc::new(TokioScheduler),
        clock: Arc::new(SystemClock),
    };
    let relay = Relay::new(
        config.relay_settings(),
        config.session_config(),
        TcpDialer::new(config.server_addr()),
        subsystems,
        Encoders::default(),
    );

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    info!("Relay started for {}", config.server_addr());

    tokio::select! {
        result = relay.run() => {
            if let Err(e) = result {
                error!("Relay stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
    }

    Ok(())
}
