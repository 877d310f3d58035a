//! Startup orchestration.
//!
//! # Responsibilities
//! - Read the bearer token and assemble forwarding client options
//! - Build transport → forwarding client → query API → federator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Token problems surface here, never on the request path

use std::sync::Arc;

use axum::http::HeaderName;
use thiserror::Error;

use crate::backend::PrometheusApi;
use crate::config::validation::parse_upstream;
use crate::config::{GatewayConfig, UpstreamConfig};
use crate::forward::{
    read_bearer_file, with_get, with_token, ClientError, ClientOption, ForwardingClient,
    HyperTransport, TokenError, TransportError,
};
use crate::http::Federator;
use crate::observability::ScrapeObserver;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid upstream url '{url}': {reason}")]
    Upstream { url: String, reason: String },

    #[error("error reading bearer file: {0}")]
    BearerFile(#[from] TokenError),

    #[error("error building forwarding client: {0}")]
    Client(#[from] ClientError),

    #[error("invalid forwarded header name '{0}'")]
    HeaderName(String),

    #[error("error building upstream transport: {0}")]
    Transport(#[from] TransportError),
}

/// Translate upstream settings into ordered forwarding client options.
pub fn client_options(upstream: &UpstreamConfig) -> Result<Vec<Option<ClientOption>>, StartupError> {
    let mut options = Vec::new();

    if let Some(path) = &upstream.bearer_file {
        let raw = read_bearer_file(path)?;
        tracing::info!(path = %path.display(), "Loaded bearer token");
        options.push(Some(with_token(raw)));
    }

    if upstream.force_get {
        tracing::info!("Forcing upstream queries to use GET requests");
        options.push(Some(with_get()));
    }

    Ok(options)
}

/// Build the federator for `config`, reporting observations to `observer`.
pub fn build_federator(
    config: &GatewayConfig,
    observer: Arc<dyn ScrapeObserver>,
) -> Result<Federator, StartupError> {
    let base = parse_upstream(&config.upstream.url).map_err(|reason| StartupError::Upstream {
        url: config.upstream.url.clone(),
        reason,
    })?;

    let transport = HyperTransport::new(
        base,
        config.timeouts.connect(),
        config.upstream.tls_skip_verify,
    )?;
    if transport.is_tls() && config.upstream.tls_skip_verify {
        tracing::warn!("Upstream TLS certificate verification is disabled");
    }
    let client = ForwardingClient::build(transport, client_options(&config.upstream)?)?;
    let api = PrometheusApi::new(client);

    let forward_headers = config
        .upstream
        .forward_headers
        .iter()
        .map(|name| {
            HeaderName::try_from(name.as_str()).map_err(|_| StartupError::HeaderName(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Federator::new(Arc::new(api), observer)
        .with_forward_headers(forward_headers)
        .with_timeout(config.timeouts.federate()))
}
