//! Prometheus federation gateway.
//!
//! ```text
//!     Scraper                   ┌──────────────────────────────────────────┐
//!     GET /federate?match[]=... │              FEDERATE PROXY              │
//!     ──────────────────────────┼─▶ http::federate                         │
//!                               │      │ one query per match[]             │
//!                               │      ▼                                   │
//!                               │   backend::PrometheusApi                 │
//!                               │      │                                   │
//!                               │      ▼                                   │
//!                               │   forward::ForwardingClient ─────────────┼──▶ Query API
//!                               │     (params, headers, bearer, GET-only)  │
//!                               └──────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use federate_proxy::config::{load_config, validate_config, ConfigError, GatewayConfig};
use federate_proxy::lifecycle::{build_federator, wait_for_signal, Shutdown};
use federate_proxy::observability::{logging, metrics, PrometheusObserver};
use federate_proxy::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "federate-proxy")]
#[command(about = "Authenticated federation gateway for Prometheus-compatible query APIs", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The address which the proxy listens on
    #[arg(long)]
    insecure_listen_address: Option<String>,

    /// The upstream query API URL
    #[arg(long)]
    upstream: Option<String>,

    /// File containing bearer token for API requests
    #[arg(long)]
    bearer_file: Option<PathBuf>,

    /// Force the query client to use GET by rejecting POST requests
    #[arg(long)]
    force_get: bool,

    /// Skip TLS certificate verification for an https upstream
    #[arg(long)]
    tls_skip_verify: bool,

    /// Incoming header forwarded upstream (repeatable)
    #[arg(long = "forward-header")]
    forward_headers: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load the config file (or defaults) and apply command line overrides.
    fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => GatewayConfig::default(),
        };

        if let Some(addr) = self.insecure_listen_address {
            config.listener.bind_address = addr;
        }
        if let Some(url) = self.upstream {
            config.upstream.url = url;
        }
        if let Some(path) = self.bearer_file {
            config.upstream.bearer_file = Some(path);
        }
        if self.force_get {
            config.upstream.force_get = true;
        }
        if self.tls_skip_verify {
            config.upstream.tls_skip_verify = true;
        }
        config.upstream.forward_headers.extend(self.forward_headers);
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("federate-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        force_get = config.upstream.force_get,
        tls_skip_verify = config.upstream.tls_skip_verify,
        forward_headers = ?config.upstream.forward_headers,
        federate_timeout_secs = config.timeouts.federate_secs,
        "Configuration loaded"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        Some(metrics::init_metrics()?)
    } else {
        None
    };

    let federator = build_federator(&config, Arc::new(PrometheusObserver)).map_err(|e| {
        tracing::error!(error = %e, "Startup failed");
        e
    })?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.signalled();
    tokio::spawn(wait_for_signal(shutdown));

    let server = HttpServer::new(config, federator, metrics_handle);
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
