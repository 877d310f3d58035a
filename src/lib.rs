//! Prometheus federation gateway library.
//!
//! Serves `/federate` by evaluating each `match[]` expression against an
//! upstream query API, forwarding the caller's remaining parameters and
//! allow-listed headers, and authenticating upstream with a bearer token.

pub mod backend;
pub mod config;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use http::{Federator, HttpServer};
pub use lifecycle::Shutdown;
