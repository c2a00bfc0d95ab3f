//! Error taxonomy for the catalog.
//!
//! Three families:
//!
//! - **Not found**: raised only by the `fetch_*` accessors and the raising
//!   search wrappers. The `get_*` accessors return `None` instead.
//! - **Structural**: raised by commit-time validation of the class graph.
//!   A commit that fails validation writes nothing.
//! - **Usage**: raised at the call that breaks the contract (mutation outside
//!   a transaction, malformed keys or specs).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the catalog library.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no such class: {name}")]
    ClassNotFound { name: String },

    /// The pattern did not resolve to any method. `candidates` names the
    /// classes that were searched, when the class part resolved.
    #[error("{}", method_not_found_message(.pattern, .candidates))]
    MethodNotFound {
        pattern: String,
        candidates: Vec<String>,
    },

    #[error("no such library: {name}")]
    LibraryNotFound { name: String },

    #[error("no such function: {name}")]
    FunctionNotFound { name: String },

    #[error("no such document: {name}")]
    DocNotFound { name: String },

    /// A superclass that is not a class, or an included/extended module
    /// that is not a module.
    #[error("invalid ancestor for {class}: {ancestor} ({reason})")]
    InvalidAncestor {
        class: String,
        ancestor: String,
        reason: String,
    },

    /// The superclass/include graph loops back on itself.
    #[error("ancestor cycle detected at {class}: {}", .path.join(" -> "))]
    InvalidLink { class: String, path: Vec<String> },

    #[error("database is not in a transaction")]
    NotInTransaction,

    #[error("a transaction is already open")]
    TransactionAlreadyOpen,

    #[error("invalid key: {key:?}")]
    InvalidKey { key: String },

    #[error("invalid method spec {input:?}: {reason}")]
    InvalidSpec { input: String, reason: String },

    #[error("corrupt record {}: {reason}", .path.display())]
    CorruptRecord { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ClassNotFound { .. }
                | Self::MethodNotFound { .. }
                | Self::LibraryNotFound { .. }
                | Self::FunctionNotFound { .. }
                | Self::DocNotFound { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_spec(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

fn method_not_found_message(pattern: &str, candidates: &[String]) -> String {
    match candidates.len() {
        0 => format!("no such method: {pattern}"),
        1..=5 => format!("no such method in {}: {pattern}", candidates.join(", ")),
        n => format!("no such method in ({n} classes): {pattern}"),
    }
}
