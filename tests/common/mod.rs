//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::any,
    Router,
};
use tokio::net::TcpListener;

use federate_proxy::config::GatewayConfig;
use federate_proxy::forward::QueryParams;
use federate_proxy::lifecycle::build_federator;
use federate_proxy::observability::{Observation, ScrapeObserver};
use federate_proxy::{HttpServer, Shutdown};

/// One request as seen by the mock query API.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub url_params: QueryParams,
    pub form_params: QueryParams,
    pub headers: HeaderMap,
}

impl Captured {
    /// The `query` parameter, wherever it was sent.
    pub fn expr(&self) -> &str {
        self.url_params
            .get_all("query")
            .first()
            .or_else(|| self.form_params.get_all("query").first())
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct MockBackend {
    seen: Arc<Mutex<Vec<Captured>>>,
}

impl MockBackend {
    pub fn requests(&self) -> Vec<Captured> {
        self.seen.lock().unwrap().clone()
    }
}

/// Start a Prometheus-like query API on an ephemeral port.
///
/// `up` answers a one-sample vector, `scalar(up)` a scalar, anything else a `bad_data` error.
pub async fn start_mock_backend() -> (SocketAddr, MockBackend) {
    let backend = MockBackend::default();
    let app = Router::new()
        .route("/api/v1/query", any(query))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, backend)
}

async fn query(
    State(backend): State<MockBackend>,
    method: Method,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let captured = Captured {
        method,
        url_params: QueryParams::parse(raw.as_deref().unwrap_or_default()),
        form_params: QueryParams::parse(&String::from_utf8_lossy(&body)),
        headers,
    };
    let expr = captured.expr().to_string();
    backend.seen.lock().unwrap().push(captured);

    match expr.as_str() {
        "up" => (
            StatusCode::OK,
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{"__name__":"up","job":"node"},"value":[1700000000,"1"]}
            ]}}"#,
        ),
        "scalar(up)" => (
            StatusCode::OK,
            r#"{"status":"success","data":{"resultType":"scalar","result":[1700000000,"1"]}}"#,
        ),
        _ => (
            StatusCode::BAD_REQUEST,
            r#"{"status":"error","errorType":"bad_data","error":"unknown expression"}"#,
        ),
    }
}

/// Collects every observation.
#[derive(Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Observation>>,
}

impl RecordingObserver {
    pub fn seen(&self) -> Vec<(String, &'static str)> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|o| (o.match_query.clone(), o.status.as_label()))
            .collect()
    }
}

impl ScrapeObserver for RecordingObserver {
    fn observe(&self, observation: &Observation) {
        self.seen.lock().unwrap().push(observation.clone());
    }
}

/// Write `contents` to a fresh file under the temp dir.
#[allow(dead_code)]
pub fn write_token_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "federate-proxy-it-{}-{}",
        std::process::id(),
        name
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Start the gateway for `config` on an ephemeral port.
pub async fn start_gateway(
    mut config: GatewayConfig,
    observer: Arc<RecordingObserver>,
) -> (SocketAddr, Shutdown) {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    let federator = build_federator(&config, observer).unwrap();

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, federator, None);
    let signalled = shutdown.signalled();
    tokio::spawn(async move {
        let _ = server.run(listener, signalled).await;
    });

    (addr, shutdown)
}

/// Client that never pools or proxies.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
