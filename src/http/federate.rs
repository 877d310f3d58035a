//! Federation handler.
//!
//! # Responsibilities
//! - Split `match[]` expressions from the passthrough query parameters
//! - Carry the passthrough parameters and allow-listed headers upstream
//! - Evaluate each expression in order under one shared deadline
//! - Record one observation per expression
//! - Render instant vectors as `<labels> <value> <timestamp>` lines
//!
//! # Design Decisions
//! - Expressions run sequentially; a slow one eats into the budget of the rest
//! - Output is buffered; the first failure turns the response into a 500 that
//!   still carries the lines of the expressions before it
//! - Dropping the handler future (client gone, shutdown) drops the in-flight backend call

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::time::Instant;

use crate::backend::{QueryApi, QueryError, QueryResult, Value};
use crate::forward::{ForwardContext, QueryParams};
use crate::http::server::AppState;
use crate::observability::{Observation, QueryStatus, ScrapeObserver};

/// Repeated query parameter holding the expressions to federate.
pub const MATCH_PARAM: &str = "match[]";

/// Default budget for all expressions of one request.
pub const DEFAULT_FEDERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Status and buffered body of one federation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederationOutcome {
    pub status: StatusCode,
    pub body: String,
}

impl IntoResponse for FederationOutcome {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.body,
        )
            .into_response()
    }
}

/// Evaluates federation requests against a query backend.
#[derive(Clone)]
pub struct Federator {
    api: Arc<dyn QueryApi>,
    observer: Arc<dyn ScrapeObserver>,
    forward_headers: Arc<[HeaderName]>,
    timeout: Duration,
}

impl Federator {
    pub fn new(api: Arc<dyn QueryApi>, observer: Arc<dyn ScrapeObserver>) -> Self {
        Self {
            api,
            observer,
            forward_headers: Arc::from(Vec::new()),
            timeout: DEFAULT_FEDERATE_TIMEOUT,
        }
    }

    /// Copy these incoming headers onto every upstream request.
    pub fn with_forward_headers(mut self, names: Vec<HeaderName>) -> Self {
        self.forward_headers = names.into();
        self
    }

    /// Budget shared by all expressions of one request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one federation request given its raw query string and headers.
    pub async fn federate(&self, raw_query: Option<&str>, headers: &HeaderMap) -> FederationOutcome {
        let mut params = QueryParams::parse(raw_query.unwrap_or_default());
        let expressions = params.remove(MATCH_PARAM);

        let ctx = ForwardContext::new()
            .with_params(params)
            .with_headers(&self.forward_headers, headers);
        let deadline = Instant::now() + self.timeout;

        tracing::debug!(matches = expressions.len(), "Federating");

        let mut body = String::new();
        for expr in &expressions {
            let start = Instant::now();
            let query = self.api.query(&ctx, expr, SystemTime::now());
            let result = tokio::time::timeout_at(deadline, query)
                .await
                .unwrap_or(Err(QueryError::Timeout));
            let elapsed = start.elapsed();

            let status = classify(&result);
            self.observer.observe(&Observation {
                match_query: expr.clone(),
                status,
                elapsed,
            });

            match result {
                Ok(QueryResult {
                    value: Value::Vector(samples),
                    warnings,
                }) => {
                    if !warnings.is_empty() {
                        tracing::debug!(match_query = %expr, ?warnings, "Query returned warnings");
                    }
                    for sample in &samples {
                        body.push_str(&sample.line());
                        body.push('\n');
                    }
                }
                Ok(QueryResult { value, .. }) => {
                    tracing::error!(
                        match_query = %expr,
                        result_type = value.type_name(),
                        "Query result is not a vector"
                    );
                    return FederationOutcome {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        body,
                    };
                }
                Err(e) => {
                    tracing::error!(match_query = %expr, error = %e, "Query failed");
                    return FederationOutcome {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        body,
                    };
                }
            }
        }

        FederationOutcome {
            status: StatusCode::OK,
            body,
        }
    }
}

fn classify(result: &Result<QueryResult, QueryError>) -> QueryStatus {
    match result {
        Ok(QueryResult {
            value: Value::Vector(_),
            ..
        }) => QueryStatus::Ok,
        Ok(_) => QueryStatus::NotVector,
        Err(_) => QueryStatus::Failed,
    }
}

/// `GET /federate`
pub async fn federate_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> FederationOutcome {
    state.federator.federate(query.as_deref(), &headers).await
}
