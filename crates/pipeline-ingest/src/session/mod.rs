//! Database session seam for the transactional loader
//!
//! A [`Connector`] opens one exclusive [`Session`] with a transaction already
//! begun. The loader drives savepoints, inserts, and the final commit through
//! the session and never shares it.

use async_trait::async_trait;
use thiserror::Error;

use crate::statement::BoundInsert;

pub mod postgres;

pub use postgres::{PgConnector, PgSession};

/// Name of the per-row savepoint. At most one is open at a time, so the name
/// is reused for every row.
pub const ROW_SAVEPOINT: &str = "sp_row";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("connection attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Session: Send + Sized {
    async fn savepoint(&mut self) -> Result<(), SessionError>;

    async fn release_savepoint(&mut self) -> Result<(), SessionError>;

    async fn rollback_to_savepoint(&mut self) -> Result<(), SessionError>;

    /// Execute one insert with its bound values.
    async fn execute(&mut self, insert: &BoundInsert) -> Result<(), SessionError>;

    /// Statement text as the session would send it, for diagnostics.
    fn render(&self, insert: &BoundInsert) -> String {
        insert.statement.sql()
    }

    async fn commit(&mut self) -> Result<(), SessionError>;

    async fn rollback(&mut self) -> Result<(), SessionError>;

    /// Release the underlying connection. Errors are not reported.
    async fn close(self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Open a new session with a transaction begun.
    async fn connect(&self) -> Result<Self::Session, SessionError>;
}
