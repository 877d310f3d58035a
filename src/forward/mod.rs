//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! federation handler
//!     → carrier.rs (ForwardContext: carried params + headers)
//!     → backend query API builds the outbound request
//!     → client.rs (method guard, replay, bearer injection)
//!     → transport.rs (hyper client, optional TLS via tls.rs → upstream)
//! ```
//!
//! # Design Decisions
//! - The decorator and the real transport share one trait, so decoration is invisible downstream
//! - All credential validation happens at construction, never per request
//! - Token reading distinguishes an empty source from an invalid token

pub mod carrier;
pub mod client;
pub mod tls;
pub mod token;
pub mod transport;

pub use carrier::{ForwardContext, QueryParams};
pub use client::{with_get, with_token, ClientError, ClientOption, ForwardingClient};
pub use token::{read_bearer_file, read_bearer_token, TokenError};
pub use transport::{HyperTransport, Transport, TransportError};
