//! Upload approval lookups

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// `false` for unknown users.
    async fn is_approved(&self, uid: &str) -> Result<bool, ApprovalError>;
}

/// Reads `upload_approvals(uid, approved)`.
#[derive(Debug, Clone)]
pub struct PgApprovalStore {
    pool: PgPool,
}

impl PgApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStore for PgApprovalStore {
    #[instrument(skip(self))]
    async fn is_approved(&self, uid: &str) -> Result<bool, ApprovalError> {
        let approved: Option<bool> =
            sqlx::query_scalar("SELECT approved FROM upload_approvals WHERE uid = $1")
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;

        debug!(found = approved.is_some(), "Approval looked up");
        Ok(approved.unwrap_or(false))
    }
}
