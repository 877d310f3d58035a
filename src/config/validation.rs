//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use axum::http::{HeaderName, Uri};
use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("invalid upstream url '{url}': {reason}")]
    UpstreamUrl { url: String, reason: String },

    #[error("timeout '{0}' must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("request timeout ({request}s) is shorter than federation timeout ({federate}s)")]
    RequestTimeoutTooShort { request: u64, federate: u64 },

    #[error("invalid forwarded header name '{0}'")]
    HeaderName(String),
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Err(reason) = parse_upstream(&config.upstream.url) {
        errors.push(ValidationError::UpstreamUrl {
            url: config.upstream.url.clone(),
            reason,
        });
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("federate_secs", timeouts.federate_secs),
        ("request_secs", timeouts.request_secs),
        ("connect_secs", timeouts.connect_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }
    if timeouts.request_secs < timeouts.federate_secs {
        errors.push(ValidationError::RequestTimeoutTooShort {
            request: timeouts.request_secs,
            federate: timeouts.federate_secs,
        });
    }

    for name in &config.upstream.forward_headers {
        if HeaderName::try_from(name.as_str()).is_err() {
            errors.push(ValidationError::HeaderName(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse the upstream base URL (`http` or `https`) into a transport base URI.
pub fn parse_upstream(raw: &str) -> Result<Uri, String> {
    let url = url::Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("query and fragment are not allowed".to_string());
    }
    url.as_str().parse::<Uri>().map_err(|e| e.to_string())
}
