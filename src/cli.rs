use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::search::DEFAULT_MAX_COMBINATIONS;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-catalog")]
#[command(about = "Catalog a class library and resolve partial method and class names against it")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database directory (default: $CLASS_CATALOG_DB, then the local data dir).
    #[arg(long, value_name = "DIR", global = true)]
    pub db: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Create the database and write its global properties.
    Init {
        #[arg(long, value_name = "NAME")]
        encoding: Option<String>,
    },
    /// Load a JSON manifest in one transaction.
    Load { manifest: PathBuf },
    /// Resolve a pattern such as `Array#each`, `Ho`, `#size` or `$stdout`.
    Query {
        pattern: String,

        #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_COMBINATIONS)]
        max_combinations: usize,
    },
    /// Print the entry behind an exact method spec or class name.
    Show { name: String },
    List {
        #[arg(value_enum)]
        what: ListKind,
    },
    Stats,
    Clear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    Classes,
    Libraries,
    Docs,
    Functions,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
