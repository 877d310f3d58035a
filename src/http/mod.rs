//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → federate.rs (match[] fan-out → backend queries → text body)
//!     → Send to client
//! ```

pub mod federate;
pub mod request;
pub mod server;

pub use federate::{FederationOutcome, Federator, MATCH_PARAM};
pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
