//! Prometheus-compatible HTTP query API (`/api/v1/query`).
//!
//! # Responsibilities
//! - Encode instant queries as form parameters
//! - Prefer POST, fall back to GET when the POST is refused
//! - Decode the JSON envelope into [`Value`]
//!
//! # Design Decisions
//! - Speaks through any [`Transport`], so a [`ForwardingClient`] sits transparently in between
//! - A 405/501 answer to the POST (from the upstream or from the local method guard) triggers one GET retry
//!
//! [`ForwardingClient`]: crate::forward::ForwardingClient

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, Method, Request, Response, StatusCode};
use serde::Deserialize;

use crate::backend::api::{QueryApi, QueryError, QueryResult};
use crate::backend::model::{Metric, Sample, Series, Value};
use crate::forward::{ForwardContext, QueryParams, Transport, TransportError};

const QUERY_PATH: &str = "/api/v1/query";

/// Query API client over a [`Transport`].
#[derive(Debug, Clone)]
pub struct PrometheusApi<T> {
    transport: T,
}

impl<T: Transport> PrometheusApi<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// POST the form, retrying once as GET if the POST is not allowed.
    async fn execute(
        &self,
        ctx: &ForwardContext,
        form: &QueryParams,
    ) -> Result<Response<Bytes>, QueryError> {
        let encoded = form.encode();

        let post = Request::builder()
            .method(Method::POST)
            .uri(QUERY_PATH)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from(encoded.clone()))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let response = self.transport.send(ctx, post).await?;

        match response.status() {
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                tracing::debug!(status = %response.status(), "POST refused, retrying query as GET");
                let get = Request::builder()
                    .method(Method::GET)
                    .uri(format!("{QUERY_PATH}?{encoded}"))
                    .body(Bytes::new())
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                Ok(self.transport.send(ctx, get).await?)
            }
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl<T: Transport> QueryApi for PrometheusApi<T> {
    async fn query(
        &self,
        ctx: &ForwardContext,
        expr: &str,
        eval_time: SystemTime,
    ) -> Result<QueryResult, QueryError> {
        let mut form = QueryParams::new();
        form.add("query", expr);
        form.add("time", format_time(eval_time));

        let response = self.execute(ctx, &form).await?;
        decode_response(response.status(), response.body())
    }
}

/// Seconds since the epoch with millisecond precision, e.g. `1435781451.781`.
fn format_time(time: SystemTime) -> String {
    let since = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:03}", since.as_secs(), since.subsec_millis())
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Option<RawData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum RawData {
    Vector(Vec<RawSample>),
    Matrix(Vec<RawSeries>),
    Scalar(RawPoint),
    String(RawPoint),
}

#[derive(Debug, Deserialize)]
struct RawSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: RawPoint,
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    values: Vec<RawPoint>,
}

/// `[<unix seconds>, "<value>"]`
#[derive(Debug, Deserialize)]
struct RawPoint(f64, String);

impl RawPoint {
    fn timestamp_ms(&self) -> i64 {
        (self.0 * 1000.0).round() as i64
    }

    fn value(&self) -> Result<f64, QueryError> {
        parse_value(&self.1)
    }
}

fn parse_value(raw: &str) -> Result<f64, QueryError> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw.parse().map_err(|_| QueryError::Api {
            kind: "bad_response".to_string(),
            message: format!("invalid sample value {raw:?}"),
        }),
    }
}

/// Turn a raw backend response into a query result or error.
fn decode_response(status: StatusCode, body: &[u8]) -> Result<QueryResult, QueryError> {
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(QueryError::Status {
                status,
                body: String::from_utf8_lossy(body).into_owned(),
            })
        }
        Err(e) => return Err(QueryError::Decode(e)),
    };

    if envelope.status != "success" {
        return Err(QueryError::Api {
            kind: envelope.error_type.unwrap_or_else(|| "unknown".to_string()),
            message: envelope.error.unwrap_or_default(),
        });
    }

    let data = envelope.data.ok_or_else(|| QueryError::Api {
        kind: "bad_response".to_string(),
        message: "missing data in successful response".to_string(),
    })?;

    let value = match data {
        RawData::Vector(samples) => Value::Vector(
            samples
                .into_iter()
                .map(|s| -> Result<Sample, QueryError> {
                    Ok(Sample {
                        value: s.value.value()?,
                        timestamp_ms: s.value.timestamp_ms(),
                        metric: Metric(s.metric),
                    })
                })
                .collect::<Result<_, QueryError>>()?,
        ),
        RawData::Matrix(series) => Value::Matrix(
            series
                .into_iter()
                .map(|s| -> Result<Series, QueryError> {
                    let points = s
                        .values
                        .iter()
                        .map(|p| -> Result<(i64, f64), QueryError> {
                            Ok((p.timestamp_ms(), p.value()?))
                        })
                        .collect::<Result<_, QueryError>>()?;
                    Ok(Series {
                        metric: Metric(s.metric),
                        points,
                    })
                })
                .collect::<Result<_, QueryError>>()?,
        ),
        RawData::Scalar(point) => Value::Scalar {
            timestamp_ms: point.timestamp_ms(),
            value: point.value()?,
        },
        RawData::String(point) => Value::String {
            timestamp_ms: point.timestamp_ms(),
            value: point.1,
        },
    };

    Ok(QueryResult {
        value,
        warnings: envelope.warnings,
    })
}
