//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener and shut down gracefully

use std::future::Future;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::federate::{federate_handler, Federator};
use crate::http::request::{request_id_of, MakeRequestUuidV4};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub federator: Federator,
    pub metrics: Option<PrometheusHandle>,
}

/// HTTP server for the federation gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server serving `federator`.
    ///
    /// `/metrics` renders `metrics` when a handle is given and answers 404 otherwise.
    pub fn new(
        config: GatewayConfig,
        federator: Federator,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let state = AppState { federator, metrics };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/federate", get(federate_handler))
            .route("/healthz", get(healthz))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(config.timeouts.request()))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id_of(request)
                    )
                }),
            )
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// The router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// `GET /healthz`
async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `GET /metrics`
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::SystemTime;

    use async_trait::async_trait;
    use tower::ServiceExt;

    use crate::backend::{QueryApi, QueryError, QueryResult, Value};
    use crate::forward::ForwardContext;
    use crate::http::request::X_REQUEST_ID;
    use crate::observability::NoopObserver;

    struct EmptyVectorApi;

    #[async_trait]
    impl QueryApi for EmptyVectorApi {
        async fn query(
            &self,
            _ctx: &ForwardContext,
            _expr: &str,
            _eval_time: SystemTime,
        ) -> Result<QueryResult, QueryError> {
            Ok(QueryResult {
                value: Value::Vector(Vec::new()),
                warnings: Vec::new(),
            })
        }
    }

    fn server() -> HttpServer {
        let federator = Federator::new(Arc::new(EmptyVectorApi), Arc::new(NoopObserver));
        HttpServer::new(GatewayConfig::default(), federator, None)
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = server()
            .router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let response = server()
            .router()
            .oneshot(
                Request::get("/federate?match%5B%5D=up")
                    .header(X_REQUEST_ID, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_REQUEST_ID], "req-42");
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let response = server()
            .router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_federate_rejects_post() {
        let response = server()
            .router()
            .oneshot(
                Request::post("/federate?match%5B%5D=up")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
