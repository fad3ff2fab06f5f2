//! Bridge configuration
//!
//! Values come from three layers, highest first: command line (or its
//! environment variable), the optional TOML file, built-in defaults.

use anyhow::{ensure, Context, Result};
use hog_relay::{ManagerConfig, RelayTarget, TrackerConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::Cli;

/// Default session listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Default local address for outbound OSC
pub const DEFAULT_OSC_BIND: &str = "0.0.0.0:0";

/// Contents of the `--config` TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<SocketAddr>,
    pub osc_host: Option<String>,
    pub osc_port: Option<u16>,
    pub osc_bind: Option<String>,
    pub max_sessions: Option<usize>,
    pub tracker: TrackerFile,
}

/// `[tracker]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerFile {
    pub hold_interval_ms: Option<u64>,
    pub hold_gain: Option<f64>,
    pub wheel_divisor: Option<f64>,
    pub drag_divisor: Option<f64>,
    pub debounce_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Fully resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub target: RelayTarget,
    pub osc_bind: String,
    pub manager: ManagerConfig,
}

impl Settings {
    /// Merge command line over file over defaults, then validate
    pub fn build(cli: &Cli, file: FileConfig) -> Result<Self> {
        let listen = match (cli.listen.or(file.listen), cli.ws_port) {
            (Some(addr), _) => addr,
            (None, Some(port)) => SocketAddr::from(([0, 0, 0, 0], port)),
            (None, None) => DEFAULT_LISTEN.parse()?,
        };

        let host = cli
            .osc_host
            .clone()
            .or(file.osc_host)
            .unwrap_or_else(|| hog_core::DEFAULT_OSC_HOST.to_string());
        let port = cli
            .osc_port
            .or(file.osc_port)
            .unwrap_or(hog_core::DEFAULT_OSC_PORT);
        let target = hog_relay::validate_target(&host, i64::from(port))
            .context("invalid initial OSC target")?;

        let osc_bind = cli
            .osc_bind
            .clone()
            .or(file.osc_bind)
            .unwrap_or_else(|| DEFAULT_OSC_BIND.to_string());

        let defaults = ManagerConfig::default();
        let max_sessions = cli
            .max_sessions
            .or(file.max_sessions)
            .unwrap_or(defaults.max_sessions);
        ensure!(max_sessions > 0, "max_sessions must be at least 1");

        let tracker = tracker_config(&file.tracker)?;

        Ok(Self {
            listen,
            target,
            osc_bind,
            manager: ManagerConfig {
                max_sessions,
                tracker,
                ..defaults
            },
        })
    }
}

fn tracker_config(file: &TrackerFile) -> Result<TrackerConfig> {
    let defaults = TrackerConfig::default();

    let hold_interval = file
        .hold_interval_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.hold_interval);
    ensure!(!hold_interval.is_zero(), "tracker.hold_interval_ms must be positive");

    let hold_gain = file.hold_gain.unwrap_or(defaults.hold_gain);
    ensure!(hold_gain.is_finite(), "tracker.hold_gain must be finite");

    let wheel_divisor = file.wheel_divisor.unwrap_or(defaults.wheel_divisor);
    let drag_divisor = file.drag_divisor.unwrap_or(defaults.drag_divisor);
    for (name, value) in [("wheel_divisor", wheel_divisor), ("drag_divisor", drag_divisor)] {
        ensure!(
            value.is_finite() && value > 0.0,
            "tracker.{} must be a positive number",
            name
        );
    }

    let debounce = file
        .debounce_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.debounce);

    Ok(TrackerConfig {
        hold_interval,
        hold_gain,
        wheel_divisor,
        drag_divisor,
        debounce,
    })
}
