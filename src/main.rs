//! Edge gateway binary.
//!
//! ```text
//!     Client ──▶ primary listener ──▶ route dispatch ──▶ chain ──▶ backend
//!                      │                                   │
//!                   /ready                        gateway_response_time
//!                                                          │
//!     Scraper ◀── metrics listener ◀───────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::Instrument;

use edge_gateway::config::{load_config, LogFormat};
use edge_gateway::lifecycle::termination_signal;
use edge_gateway::observability::init_logging;
use edge_gateway::{ConfigError, Gateway, GatewayConfig};

/// Exit code for configuration and route table failures.
const CONFIG_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "edge-gateway")]
#[command(about = "Edge HTTP gateway", long_about = None, version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long = "config", env = "CFG_PATH")]
    config: PathBuf,

    /// Primary listener address, overrides `listener.bind_address`.
    #[arg(long, env = "HTTP_ADDR")]
    http_addr: Option<String>,

    /// Metrics listener address, overrides `metrics.bind_address`.
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Service name attached to every log line.
    #[arg(long, env = "SERVICE", default_value = "gateway")]
    service: String,

    /// Upper bound for the shutdown drain in milliseconds.
    #[arg(long, env = "SHUTDOWN_DELAY")]
    shutdown_delay: Option<u64>,

    /// Log format, overrides `observability.log_format`.
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(addr) = &self.http_addr {
            config.listener.bind_address = addr.clone();
        }
        if let Some(addr) = &self.metrics_addr {
            config.metrics.bind_address = addr.clone();
        }
        if let Some(delay) = self.shutdown_delay {
            config.shutdown.delay_ms = delay;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}

fn load(cli: &Cli) -> Result<GatewayConfig, ConfigError> {
    let mut config = load_config(&cli.config)?;
    cli.apply(&mut config);
    // Overrides can break invariants the file satisfied.
    edge_gateway::config::validation::validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", cli.service);
            return ExitCode::from(CONFIG_FAILURE);
        }
    };

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("{}: failed to initialize logging: {e}", cli.service);
    }

    let root = tracing::info_span!(
        "gateway",
        service = %cli.service,
        version = env!("CARGO_PKG_VERSION"),
    );

    run(config).instrument(root).await
}

async fn run(config: GatewayConfig) -> ExitCode {
    tracing::info!(
        listener = %config.listener.bind_address,
        metrics = %config.metrics.bind_address,
        request_timeout_ms = config.timeouts.request_ms,
        shutdown_delay_ms = config.shutdown.delay_ms,
        "Configuration loaded"
    );

    let gateway = match Gateway::build(config) {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build gateway");
            return ExitCode::from(CONFIG_FAILURE);
        }
    };

    let bound = match gateway.bind().await {
        Ok(bound) => bound,
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind listeners");
            return ExitCode::FAILURE;
        }
    };

    match bound.serve(termination_signal()).await {
        Ok(report) if report.forced() => {
            tracing::warn!(steps = ?report.steps, "Shutdown deadline forced listeners closed");
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
