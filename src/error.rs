//! Error types for vdb-bench
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// vdb-bench error types
#[derive(Error, Debug)]
pub enum Error {
    /// Experiment names an engine with no registry entry
    #[error("Backend not supported: {engine:?} (supported: {})", supported.join(", "))]
    UnsupportedEngine {
        /// Engine identifier from the experiment declaration
        engine: String,
        /// Engines known to the registry, sorted
        supported: Vec<String>,
    },

    /// Engine registered twice (registry construction defect)
    #[error("Engine {0:?} is already registered")]
    DuplicateEngine(String),

    /// Plugin rejected its parameter mapping at construction
    #[error("Invalid {role} params for {engine}: {reason}")]
    InvalidParams {
        /// Engine identifier
        engine: String,
        /// Collaborator role (`collection`, `connection`, `upload`, `search`)
        role: &'static str,
        /// Human-readable cause
        reason: String,
    },

    /// Collection schema cannot be expressed by the engine
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Invalid input (vector dimension, empty batch, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filter conditions could not be parsed or translated
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Backend unreachable or host malformed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend answered with a failure
    #[error("{engine} returned {status}: {body}")]
    Backend {
        /// Engine identifier
        engine: String,
        /// HTTP status of the failing response. A GraphQL error inside a
        /// successful response keeps its 200. The in-process engine reports
        /// 404 for a missing collection. 0 means no status applies: a
        /// readiness wait timed out or a response carried an unreadable id.
        status: u16,
        /// Response body or message
        body: String,
    },

    /// Some records of an upload were rejected
    #[error(
        "{engine} rejected {} record(s) (first at index {}): {reason}",
        failed.len(),
        failed.first().copied().unwrap_or_default()
    )]
    PartialUpload {
        /// Engine identifier
        engine: String,
        /// Indices into the uploaded slice that failed
        failed: Vec<usize>,
        /// First reported failure reason
        reason: String,
    },

    /// Experiment configuration document error
    #[error("Config error: {0}")]
    Config(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
