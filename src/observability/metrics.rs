//! Metrics collection and exposition.
//!
//! # Metrics
//! - `thanosfederateproxy_scrape_duration` (histogram, seconds): duration of each
//!   federated match query, labelled by `status_code` and `match_query`
//!
//! # Design Decisions
//! - Handlers receive a [`ScrapeObserver`]; only the binary installs the global recorder
//! - Buckets span 10ms to 50s, the range of a federation scrape

use std::fmt;
use std::time::Duration;

use metrics::{describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const SCRAPE_DURATION: &str = "thanosfederateproxy_scrape_duration";

const SCRAPE_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 50.0,
];

/// Outcome class of one federated match query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// The query returned an instant vector.
    Ok,
    /// The query itself failed.
    Failed,
    /// The query succeeded with a result that is not an instant vector.
    NotVector,
}

impl QueryStatus {
    /// Status code label recorded for this outcome.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueryStatus::Ok => "200",
            QueryStatus::Failed => "500",
            QueryStatus::NotVector => "502",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One observation per federated match query.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub match_query: String,
    pub status: QueryStatus,
    pub elapsed: Duration,
}

/// Sink for per-query observations.
pub trait ScrapeObserver: Send + Sync {
    fn observe(&self, observation: &Observation);
}

/// Records observations through the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusObserver;

impl ScrapeObserver for PrometheusObserver {
    fn observe(&self, observation: &Observation) {
        histogram!(
            SCRAPE_DURATION,
            "status_code" => observation.status.as_label(),
            "match_query" => observation.match_query.clone()
        )
        .record(observation.elapsed.as_secs_f64());
    }
}

/// Discards every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ScrapeObserver for NoopObserver {
    fn observe(&self, _observation: &Observation) {}
}

fn exporter() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(SCRAPE_DURATION.to_string()), SCRAPE_BUCKETS)
}

/// Install the Prometheus recorder and return the handle that renders it.
///
/// Must be called at most once per process.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = exporter()?.install_recorder()?;

    describe_histogram!(
        SCRAPE_DURATION,
        metrics::Unit::Seconds,
        "Duration of federated match queries by response code"
    );

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(QueryStatus::Ok.as_label(), "200");
        assert_eq!(QueryStatus::Failed.to_string(), "500");
        assert_eq!(QueryStatus::NotVector.to_string(), "502");
    }

    #[test]
    fn test_prometheus_observer_records_labelled_histogram() {
        let recorder = exporter().unwrap().build_recorder();
        let handle = recorder.handle();
        let observation = Observation {
            match_query: "up".to_string(),
            status: QueryStatus::Ok,
            elapsed: Duration::from_millis(12),
        };

        metrics::with_local_recorder(&recorder, || {
            PrometheusObserver.observe(&observation);
            NoopObserver.observe(&observation);
        });

        let rendered = handle.render();
        assert!(rendered.contains("thanosfederateproxy_scrape_duration_bucket{"));
        assert!(rendered.contains(r#"status_code="200""#));
        assert!(rendered.contains(r#"match_query="up""#));
        assert!(rendered.contains("thanosfederateproxy_scrape_duration_count{"));
    }
}
