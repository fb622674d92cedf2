//! Error types for the dbuf layer.
//!
//! Mirrors the shape of `objectio_common::Error`: a `thiserror`-derived
//! enum with one variant per failure class, plus a crate-local
//! `Result` alias. Only §7.1/§7.2/§7.3 failure classes surface as
//! typed errors the caller can act on; §7.5 invariant violations are
//! fatal and checked with `debug_assert!` at the call site instead of
//! being threaded through `Result`.

use thiserror::Error;

/// Result type for dbuf operations.
pub type Result<T> = std::result::Result<T, DbufError>;

/// Errors returned by the dbuf layer.
#[derive(Debug, Error)]
pub enum DbufError {
    /// A read could not be completed and there was no dirty content to
    /// resolve against: `EIO` from §6/§7.2.
    #[error("I/O error reading dbuf {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `hold`/`hold_level` with `fail_sparse` found a hole: `ENOENT`
    /// from §4.2 step 2 / §6.
    #[error("no block at {0}")]
    NotFound(String),

    /// A spill operation was attempted against a non-spill block-id, or
    /// similar shape mismatch: `ENOTSUP` from §6.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// A synchronous/override write's block pointer was rejected by
    /// the underlying cache (nopwrite revalidation failed).
    #[error("override write could not be validated for {0}")]
    OverrideRejected(String),

    /// A configuration-level error: malformed block-id for the
    /// requested operation, etc. (§7.1).
    #[error("invalid dbuf operation: {0}")]
    InvalidOperation(String),

    /// An invariant that debug builds assert on was violated in a
    /// release build. Recoverable only in the sense that the caller
    /// gets an error instead of undefined behavior; the dbuf in
    /// question should be considered unusable.
    #[error("dbuf invariant violated: {0}")]
    Invariant(String),
}

impl DbufError {
    #[must_use]
    pub fn io(id: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io { id: id.into(), source: Box::new(source) }
    }

    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    #[must_use]
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    #[must_use]
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Maps onto the POSIX-flavored error codes enumerated in spec.md
    /// §6 ("Error codes exposed").
    #[must_use]
    pub fn errno_name(&self) -> &'static str {
        match self {
            Self::Io { .. } => "EIO",
            Self::NotFound(_) => "ENOENT",
            Self::NotSupported(_) => "ENOTSUP",
            Self::OverrideRejected(_) => "EIO",
            Self::InvalidOperation(_) => "EINVAL",
            Self::Invariant(_) => "EFAULT",
        }
    }
}

impl From<DbufError> for objectio_common::Error {
    fn from(e: DbufError) -> Self {
        match e {
            DbufError::NotFound(s) => objectio_common::Error::BlockNotFound { block_id: s },
            DbufError::Io { id, source } => {
                objectio_common::Error::Storage(format!("dbuf {id}: {source}"))
            }
            other => objectio_common::Error::Storage(other.to_string()),
        }
    }
}
