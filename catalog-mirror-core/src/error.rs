//! Error types for the catalog mirroring engine.

/// Alias for `Result<T, catalog_mirror_core::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by individual engine steps.
///
/// Orchestrator-level failures are collected into [`crate::orchestrator::AggregateError`]
/// rather than returned directly — see its docs for the fatal/non-fatal split.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A reference string did not match the docker naming grammar.
    #[error("invalid reference {reference:?}: {reason}")]
    InvalidReference {
        /// The offending input string.
        reference: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A digest string failed format or algorithm validation.
    #[error("invalid digest {digest:?}: {reason}")]
    InvalidDigest {
        /// The offending input string.
        digest: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The database extractor could not locate the requested path in any layer.
    #[error("{path} not found in {reference}")]
    NotFound {
        /// The in-image path that was requested.
        path: String,
        /// The source reference that was searched.
        reference: String,
    },

    /// The registry could not be reached.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The registry rejected the extractor's credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An extracted blob failed an integrity check.
    #[error("corrupt blob: {0}")]
    Corrupt(String),

    /// Opening the catalog database failed.
    #[error("failed to open catalog database: {0}")]
    OpenFailed(String),

    /// The catalog database is missing an expected table or column.
    #[error("catalog schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A row in the catalog database could not be read.
    #[error("failed to scan catalog row: {0}")]
    RowScanFailed(String),

    /// Options failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// An error returned by the injected image mirrorer.
    #[error("mirroring failed: {0}")]
    Mirror(String),

    /// Failure while serializing or writing an output artifact.
    #[error("failed to write artifact: {0}")]
    Artifact(String),

    /// An I/O error not covered by a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
