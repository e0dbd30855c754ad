//! Error taxonomy for the ingestion engine
//!
//! Only connection-lifecycle errors ever reach the caller, and even those are
//! folded into a [`crate::report::BatchOutcome`] by the loader. Row-level
//! errors are swallowed into counters.

use thiserror::Error;

use crate::session::SessionError;
use crate::statement::BuildError;
use crate::storage::FetchError;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The source object is missing; nothing was sent to the database.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The initial connection could not be established.
    #[error("Connection failed: {0}")]
    Connection(#[source] SessionError),

    /// One row failed to insert and was rolled back to its savepoint.
    #[error("Row {row} rejected: {reason}")]
    RowRejected { row: usize, reason: String },

    /// Rolling back to the row savepoint failed; the session is unusable.
    #[error("Session unusable after row {row}: {source}")]
    SessionFatal {
        row: usize,
        #[source]
        source: SessionError,
    },

    /// The single reconnect attempt after a fatal session error failed.
    #[error("Reconnect failed: {0}")]
    ReconnectFailed(#[source] SessionError),

    /// The outer transaction could not be committed.
    #[error("Commit failed: {0}")]
    CommitFailed(#[source] SessionError),

    #[error("Statement build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Storage error: {0}")]
    Storage(#[from] FetchError),
}
