//! Outbound HTTP transport to the query backend.
//!
//! # Responsibilities
//! - Define the request/response seam every backend call goes through
//! - Resolve relative request URIs against the upstream base URL
//! - Send through a pooled hyper client and buffer the response body
//! - Speak plain HTTP or TLS depending on the upstream scheme

use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::forward::carrier::ForwardContext;
use crate::forward::tls;

/// Largest backend response body accepted, in bytes.
const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// Errors surfaced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read upstream response body: {0}")]
    Body(String),

    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
}

/// A capability that sends one fully-buffered HTTP request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        ctx: &ForwardContext,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(
        &self,
        ctx: &ForwardContext,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        (**self).send(ctx, request).await
    }
}

/// Transport backed by a hyper-util connection pool.
#[derive(Clone)]
pub struct HyperTransport {
    base: Uri,
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HyperTransport {
    /// Create a transport sending to `base` (scheme and authority, optional path prefix).
    ///
    /// `https` bases negotiate TLS; `tls_skip_verify` disables server certificate checks.
    pub fn new(
        base: Uri,
        connect_timeout: Duration,
        tls_skip_verify: bool,
    ) -> Result<Self, TransportError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(connect_timeout));

        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls::client_config(tls_skip_verify)?)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self { base, client })
    }

    /// Whether requests to the base travel over TLS.
    pub fn is_tls(&self) -> bool {
        self.base.scheme_str() == Some("https")
    }

    /// Join a request path-and-query onto the base URI.
    fn resolve(&self, uri: &Uri) -> Result<Uri, TransportError> {
        let prefix = self.base.path().trim_end_matches('/');
        let suffix = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut parts = self.base.clone().into_parts();
        parts.path_and_query = Some(
            format!("{prefix}{suffix}")
                .parse()
                .map_err(|e| TransportError::InvalidRequest(format!("{e}")))?,
        );
        Uri::from_parts(parts).map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(
        &self,
        _ctx: &ForwardContext,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = self.resolve(&parts.uri)?;

        let response = self
            .client
            .request(Request::from_parts(parts, Body::from(body)))
            .await?;

        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(Body::new(body), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        Ok(Response::from_parts(parts, bytes))
    }
}
