//! Batch report: counters and final status for one ingestion run

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::storage::ObjectRef;

/// Why a batch stopped before a normal commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    SourceUnavailable,
    ConnectFailed,
    ReconnectFailed,
    CommitFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Committed with no rejected rows
    Completed,
    /// Committed, but some rows were rejected
    CompletedWithRejections,
    /// Nothing from this batch is durable
    Failed,
}

/// Accounting for one batch. Counters only ever grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub object: Option<ObjectRef>,
    /// Records read from the source, including skipped and unattempted ones
    pub total_rows: u64,
    pub inserted: u64,
    pub skipped_empty: u64,
    pub rejected: u64,
    pub reconnect_count: u64,
    /// Inserts acknowledged inside a transaction that was later abandoned
    /// (broken session, failed reconnect, or failed commit)
    pub discarded: u64,
    pub committed: bool,
    pub halted: Option<HaltReason>,
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for BatchOutcome {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BatchOutcome {
    pub fn new(object: Option<ObjectRef>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            object,
            total_rows: 0,
            inserted: 0,
            skipped_empty: 0,
            rejected: 0,
            reconnect_count: 0,
            discarded: 0,
            committed: false,
            halted: None,
            detail: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn for_object(object: ObjectRef) -> Self {
        Self::new(Some(object))
    }

    /// Record the first halt reason; later ones are ignored.
    pub fn halt(&mut self, reason: HaltReason, detail: impl Into<String>) {
        if self.halted.is_none() {
            self.halted = Some(reason);
            self.detail = Some(detail.into());
        }
    }

    /// Seal the report. Only the first call has any effect.
    pub fn finish(&mut self, committed: bool) {
        if self.finished_at.is_some() {
            return;
        }
        self.committed = committed;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Rows that are durable in the target table after this batch.
    pub fn durable_rows(&self) -> u64 {
        if self.committed {
            self.inserted.saturating_sub(self.discarded)
        } else {
            0
        }
    }

    pub fn status(&self) -> BatchStatus {
        match (self.committed, self.rejected) {
            (false, _) => BatchStatus::Failed,
            (true, 0) => BatchStatus::Completed,
            (true, _) => BatchStatus::CompletedWithRejections,
        }
    }

    /// Emit the end-of-batch summary line.
    pub fn log_summary(&self) {
        let object = self
            .object
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        if self.committed {
            info!(
                batch_id = %self.batch_id,
                object = %object,
                total_rows = self.total_rows,
                inserted = self.inserted,
                durable = self.durable_rows(),
                skipped_empty = self.skipped_empty,
                rejected = self.rejected,
                reconnects = self.reconnect_count,
                "Batch committed"
            );
        } else {
            warn!(
                batch_id = %self.batch_id,
                object = %object,
                total_rows = self.total_rows,
                inserted = self.inserted,
                discarded = self.discarded,
                skipped_empty = self.skipped_empty,
                rejected = self.rejected,
                reconnects = self.reconnect_count,
                halted = ?self.halted,
                detail = self.detail.as_deref().unwrap_or(""),
                "Batch not committed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_commit_and_rejections() {
        let mut outcome = BatchOutcome::default();
        assert_eq!(outcome.status(), BatchStatus::Failed);

        outcome.finish(true);
        assert_eq!(outcome.status(), BatchStatus::Completed);

        outcome.rejected = 2;
        assert_eq!(outcome.status(), BatchStatus::CompletedWithRejections);
    }

    #[test]
    fn test_first_halt_reason_wins() {
        let mut outcome = BatchOutcome::default();
        outcome.halt(HaltReason::ReconnectFailed, "db gone");
        outcome.halt(HaltReason::CommitFailed, "no session");
        assert_eq!(outcome.halted, Some(HaltReason::ReconnectFailed));
        assert_eq!(outcome.detail.as_deref(), Some("db gone"));
    }

    #[test]
    fn test_finish_is_sealed_once() {
        let mut outcome = BatchOutcome::default();
        outcome.finish(false);
        outcome.finish(true);
        assert!(!outcome.committed);
        assert!(outcome.is_finished());
    }

    #[test]
    fn test_durable_rows() {
        let mut outcome = BatchOutcome::default();
        outcome.inserted = 5;
        outcome.discarded = 2;
        assert_eq!(outcome.durable_rows(), 0);
        outcome.finish(true);
        assert_eq!(outcome.durable_rows(), 3);
    }

    #[test]
    fn test_serializes_status_fields() {
        let mut outcome = BatchOutcome::for_object(ObjectRef::new("bucket", "incoming/a.csv"));
        outcome.halt(HaltReason::SourceUnavailable, "missing");
        outcome.finish(false);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["halted"], "source_unavailable");
        assert_eq!(json["committed"], false);
        assert_eq!(json["object"]["container"], "bucket");
    }
}
