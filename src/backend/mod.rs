//! Query backend subsystem.
//!
//! # Data Flow
//! ```text
//! federation handler
//!     → api.rs (QueryApi: expression + evaluation time)
//!     → prometheus.rs (/api/v1/query over a Transport)
//!     → model.rs (Value: vector | matrix | scalar | string)
//! ```
//!
//! # Design Decisions
//! - The handler only depends on the `QueryApi` trait
//! - Only instant vectors are federated; other result types are reported as mismatches

pub mod api;
pub mod model;
pub mod prometheus;

pub use api::{QueryApi, QueryError, QueryResult};
pub use model::{Metric, Sample, Value};
pub use prometheus::PrometheusApi;
