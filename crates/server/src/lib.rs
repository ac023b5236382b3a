//! HTTP front end for an embedded key-value store.
//!
//! `GET /probe/{key}`, `/submit/{key}/{value}`, `/fetch/{key}` and
//! `/delete/{key}` map onto the storage layer; results come back in a
//! `{status, data}` JSON envelope (a fetch hit returns the raw value).

pub mod codec;
pub mod controller;
pub mod errors;
pub mod observability;
pub mod operation;
pub mod routes;
pub mod supervisor;

pub use controller::{KvService, ServiceConfig, StoreOpener};
pub use errors::{ApiError, ShutdownError, StartupError};
pub use supervisor::{install_signal_handlers, run_until_shutdown, ShutdownSignal};
