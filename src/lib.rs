//! # class-catalog
//!
//! A persistent catalog of a class library's classes, modules, methods,
//! constants and special variables, with fuzzy name resolution on top.
//!
//! ## Architecture
//!
//! - **name**: identifier encoding, type marks and the method-spec grammar
//! - **store**: property schemas, record files and lazily loaded entry tables
//! - **db**: the database handle, transactions and the commit pipeline
//! - **class**: class entries, ancestors, cycle checks and resolution maps
//! - **method**: method entries
//! - **library**: library entries, requires closure and sub-libraries
//! - **doc**: free-standing documents and C functions
//! - **method_index**: wide and narrow name -> class indices
//! - **search**: pattern parsing and narrow-then-widen resolution
//! - **manifest**: JSON manifest loader

pub mod class;
pub mod cli;
pub mod config;
pub mod db;
pub mod doc;
pub mod error;
pub mod library;
pub mod manifest;
pub mod method;
pub mod method_index;
pub mod name;
pub mod search;
pub mod store;

#[cfg(test)]
mod test_support;

pub use class::{ClassEntry, MapKind};
pub use db::{CommitSummary, Database, DatabaseStats};
pub use error::{CatalogError, Result};
pub use library::LibraryEntry;
pub use method::{MethodEntry, Provenance, Visibility};
pub use method_index::{ClassRef, MethodIndex};
pub use name::{ClassId, ClassKind, LibraryId, MethodId, MethodKind, MethodSpec};
pub use search::{SearchEngine, SearchOptions, SearchPattern, SearchResult};
