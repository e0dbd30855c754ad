//! Audit trail of issued upload URLs
//!
//! Records are written fire-and-forget: a failed write is logged and never
//! reaches the caller who asked for the URL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::identity::Identity;

pub const STATUS_ISSUED: &str = "issued";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRecord {
    pub uid: String,
    pub email: Option<String>,
    pub object_name: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
}

impl UploadRecord {
    pub fn issued(
        identity: &Identity,
        object_name: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            object_name: object_name.into(),
            issued_at,
            expires_at,
            status: STATUS_ISSUED.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record(&self, record: UploadRecord) -> Result<Uuid, AuditError>;
}

/// Write `record` in the background.
pub fn record_in_background(recorder: Arc<dyn AuditRecorder>, record: UploadRecord) {
    tokio::spawn(async move {
        let object_name = record.object_name.clone();
        match recorder.record(record).await {
            Ok(id) => info!(audit_id = %id, object = %object_name, "Upload request recorded"),
            Err(e) => error!(error = %e, object = %object_name, "Failed to record upload request"),
        }
    });
}

/// Appends to `upload_requests`.
#[derive(Debug, Clone)]
pub struct PgAuditRecorder {
    pool: PgPool,
}

impl PgAuditRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRecorder for PgAuditRecorder {
    #[instrument(skip(self, record), fields(uid = %record.uid, object = %record.object_name))]
    async fn record(&self, record: UploadRecord) -> Result<Uuid, AuditError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO upload_requests (uid, email, object_name, issued_at, expires_at, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&record.uid)
        .bind(&record.email)
        .bind(&record.object_name)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(&record.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct FailingRecorder {
        done: Arc<Notify>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AuditRecorder for FailingRecorder {
        async fn record(&self, record: UploadRecord) -> Result<Uuid, AuditError> {
            self.calls.lock().unwrap().push(record.object_name);
            self.done.notify_one();
            Err(AuditError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[test]
    fn test_issued_record_copies_identity() {
        let identity = Identity {
            uid: "u-1".to_string(),
            email: None,
        };
        let now = Utc::now();
        let record = UploadRecord::issued(&identity, "incoming/a.csv", now, now + Duration::minutes(15));

        assert_eq!(record.uid, "u-1");
        assert_eq!(record.status, "issued");
        assert_eq!(record.expires_at - record.issued_at, Duration::minutes(15));
    }

    #[tokio::test]
    async fn test_background_failure_is_swallowed() {
        let done = Arc::new(Notify::new());
        let recorder = Arc::new(FailingRecorder {
            done: done.clone(),
            calls: Mutex::new(Vec::new()),
        });
        let identity = Identity {
            uid: "u".to_string(),
            email: None,
        };
        let now = Utc::now();

        record_in_background(
            recorder.clone(),
            UploadRecord::issued(&identity, "incoming/x.csv", now, now),
        );
        done.notified().await;

        assert_eq!(recorder.calls.lock().unwrap().as_slice(), ["incoming/x.csv"]);
    }
}
