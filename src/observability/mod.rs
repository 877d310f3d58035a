//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Federation handler produces:
//!     → logging.rs (structured log events)
//!     → metrics.rs (one histogram sample per match query)
//!
//! Consumers:
//!     → stdout
//!     → /metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;

pub use self::metrics::{NoopObserver, Observation, PrometheusObserver, QueryStatus, ScrapeObserver};
