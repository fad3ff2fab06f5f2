//! Hog OSC Bridge
//!
//! Accepts WebSocket sessions from touch clients and relays their control
//! gestures to a Hog lighting console as OSC over UDP.

use anyhow::Result;
use clap::Parser;
use hog_relay::{RelayCore, SessionManager};
use hog_transport::OscSocket;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

use config::{FileConfig, Settings};

#[derive(Parser, Debug)]
#[command(name = "hog-bridge")]
#[command(about = "WebSocket to OSC bridge for Hog lighting consoles")]
#[command(version)]
pub struct Cli {
    /// Session listen address [default: 0.0.0.0:8080]
    #[arg(short, long, env = "WS_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Session listen port on all interfaces, used when no listen address is set
    #[arg(long, env = "WS_PORT")]
    pub ws_port: Option<u16>,

    /// Console OSC host [default: 127.0.0.1]
    #[arg(long, env = "HOG_OSC_HOST")]
    pub osc_host: Option<String>,

    /// Console OSC port [default: 6600]
    #[arg(long, env = "HOG_OSC_PORT")]
    pub osc_port: Option<u16>,

    /// Local address for outbound OSC [default: 0.0.0.0:0]
    #[arg(long)]
    pub osc_bind: Option<String>,

    /// Maximum concurrent sessions
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Config file path (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::build(&cli, file)?;

    tracing::info!("Starting Hog OSC bridge");
    tracing::info!("Listening on: {}", settings.listen);
    tracing::info!("OSC target: {}", settings.target);

    let socket = OscSocket::bind(&settings.osc_bind).await?;
    let relay = RelayCore::new(Arc::new(socket), settings.target.clone()).await;
    let manager = SessionManager::new(settings.manager, Arc::new(relay));

    let listen = settings.listen.to_string();
    tokio::select! {
        result = manager.serve_websocket(&listen) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            manager.stop();
        }
    }

    Ok(())
}
