//! The four key-value operations exposed over HTTP.

use service::{KvStore, StorageError};

/// Request-scoped operation, built from percent-decoded path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Probe { key: Vec<u8> },
    Submit { key: Vec<u8>, value: Vec<u8> },
    Fetch { key: Vec<u8> },
    Remove { key: Vec<u8> },
}

/// What an operation produced. A missing key is an outcome, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Found,
    Missing,
    Value(Vec<u8>),
    Done,
}

/// Path prefixes of the operations, in route order.
pub const OPERATION_NAMES: [&str; 4] = ["probe", "submit", "fetch", "delete"];

impl Operation {
    /// Path prefix, also used as the metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Probe { .. } => "probe",
            Operation::Submit { .. } => "submit",
            Operation::Fetch { .. } => "fetch",
            Operation::Remove { .. } => "delete",
        }
    }

    pub fn execute(&self, store: &dyn KvStore) -> Result<Outcome, StorageError> {
        match self {
            Operation::Probe { key } => Ok(if store.contains(key)? {
                Outcome::Found
            } else {
                Outcome::Missing
            }),
            Operation::Submit { key, value } => {
                store.put(key, value)?;
                Ok(Outcome::Done)
            }
            Operation::Fetch { key } => Ok(match store.get(key)? {
                Some(v) => Outcome::Value(v),
                None => Outcome::Missing,
            }),
            Operation::Remove { key } => {
                store.delete(key)?;
                Ok(Outcome::Done)
            }
        }
    }
}

/// Metrics label for a raw request path: the operation name, `root`, or `other`.
pub fn label_for_path(path: &str) -> &'static str {
    let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
    if first.is_empty() {
        return "root";
    }
    OPERATION_NAMES
        .iter()
        .copied()
        .find(|name| *name == first)
        .unwrap_or("other")
}

/// True when the path names a known operation, whatever its segment count.
pub fn is_operation_path(path: &str) -> bool {
    OPERATION_NAMES.contains(&label_for_path(path))
}
