//! Shared building blocks for the key-value HTTP front end.
//!
//! - `types`: the `{status, data}` response envelope as it goes over the wire
//! - `utils::logging`: tracing subscriber setup shared by binaries and tests
//! - `utils::text`: helpers for keeping log lines bounded

pub mod types;
pub mod utils;
