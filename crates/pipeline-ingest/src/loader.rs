//! Transactional loader
//!
//! Loads one batch of records through a single exclusively owned session:
//!
//! ```text
//!            connect ok                 row ok / row rejected
//!   start ──────────────> Connected <──────────────────────── RowInFlight
//!     │                     │   ▲  └────── savepoint ───────────────┘ │
//!     │ connect failed      │   │ reconnect ok        savepoint rollback failed
//!     ▼                     │   └──────────── Reconnecting <──────────┘
//!   Closed(aborted)         │ rows exhausted        │ reconnect failed
//!                           ▼                       ▼
//!                 commit ─> Closed(committed | aborted)
//! ```
//!
//! Every row runs inside the savepoint [`crate::session::ROW_SAVEPOINT`]. A
//! failed row is rolled back to that savepoint and counted; the batch goes on.
//! When the rollback itself fails the session is discarded, the loader pauses
//! for a fixed delay, and makes exactly one reconnect attempt. The outer
//! commit at the end is the only point where rows become durable.

use std::time::Duration;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::IngestError;
use crate::normalize::{normalize, RowClass};
use crate::report::{BatchOutcome, HaltReason};
use crate::session::{Connector, Session, SessionError};
use crate::source::RawRecord;
use crate::statement::{build, BoundInsert, BuildError, QualifiedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Connected,
    RowInFlight,
    Reconnecting,
    Closed { committed: bool },
}

/// What the loader should do with a record before touching the database.
#[derive(Debug)]
pub enum PreparedRow {
    Skip { row: usize },
    Reject { row: usize, error: BuildError },
    Load(BoundInsert),
}

/// Normalize and build one record. Pure.
pub fn prepare_row(table: &QualifiedTable, raw: RawRecord) -> PreparedRow {
    let normalized = normalize(raw);
    let row = normalized.row_number();
    match normalized.class() {
        RowClass::Empty => PreparedRow::Skip { row },
        RowClass::Malformed | RowClass::Loadable => match build(table, normalized) {
            Ok(insert) => PreparedRow::Load(insert),
            Err(error) => PreparedRow::Reject { row, error },
        },
    }
}

/// Result of attempting one insert on a live session.
#[derive(Debug)]
pub enum RowResult {
    Inserted,
    Rejected(String),
    /// The savepoint could not be rolled back; the session must be replaced.
    SessionFatal { cause: String, source: SessionError },
}

/// Run one insert inside the row savepoint.
pub async fn attempt_row<S: Session>(session: &mut S, insert: &BoundInsert) -> RowResult {
    let attempt = async {
        session.savepoint().await?;
        session.execute(insert).await?;
        session.release_savepoint().await
    }
    .await;

    let cause = match attempt {
        Ok(()) => return RowResult::Inserted,
        Err(e) => e.to_string(),
    };

    error!(
        row = insert.row_number,
        sql = %session.render(insert),
        values = ?insert.values,
        error = %cause,
        "Insert failed"
    );

    match session.rollback_to_savepoint().await {
        Ok(()) => RowResult::Rejected(cause),
        Err(source) => RowResult::SessionFatal { cause, source },
    }
}

pub struct TransactionalLoader<C: Connector> {
    connector: C,
    table: QualifiedTable,
    reconnect_delay: Duration,
}

impl<C: Connector> TransactionalLoader<C> {
    pub fn new(connector: C, table: QualifiedTable, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            table,
            reconnect_delay,
        }
    }

    pub fn table(&self) -> &QualifiedTable {
        &self.table
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Load every record into the target table and return the sealed report.
    ///
    /// Never fails: connection lifecycle problems end up in
    /// [`BatchOutcome::halted`], row problems in the counters.
    pub async fn load<I>(&self, records: I, outcome: BatchOutcome) -> BatchOutcome
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let span = info_span!("batch", batch_id = %outcome.batch_id, table = %self.table);
        self.run(records.into_iter(), outcome).instrument(span).await
    }

    async fn run<I>(&self, records: I, mut outcome: BatchOutcome) -> BatchOutcome
    where
        I: Iterator<Item = RawRecord>,
    {
        let mut session = match self.connector.connect().await {
            Ok(session) => {
                info!("Connected; transaction open");
                session
            },
            Err(e) => {
                let err = IngestError::Connection(e);
                error!(error = %err, "Initial connection failed; no rows attempted");
                outcome.halt(HaltReason::ConnectFailed, err.to_string());
                outcome.finish(false);
                outcome.log_summary();
                return outcome;
            },
        };

        let mut batch = BatchState::new(outcome);

        for raw in records {
            batch.outcome.total_rows += 1;

            let insert = match prepare_row(&self.table, raw) {
                PreparedRow::Skip { row } => {
                    info!(row, "Skipping empty row");
                    batch.outcome.skipped_empty += 1;
                    continue;
                },
                PreparedRow::Reject { row, error } => {
                    let err = IngestError::Build(error);
                    warn!(row, error = %err, "Row cannot be loaded");
                    batch.outcome.rejected += 1;
                    continue;
                },
                PreparedRow::Load(insert) => insert,
            };

            batch.enter(LoaderState::RowInFlight);
            match attempt_row(&mut session, &insert).await {
                RowResult::Inserted => {
                    batch.outcome.inserted += 1;
                    batch.pending += 1;
                    batch.enter(LoaderState::Connected);
                },
                RowResult::Rejected(reason) => {
                    let err = IngestError::RowRejected {
                        row: insert.row_number,
                        reason,
                    };
                    warn!(error = %err, "Row rolled back to savepoint");
                    batch.outcome.rejected += 1;
                    batch.enter(LoaderState::Connected);
                },
                RowResult::SessionFatal { cause, source } => {
                    let err = IngestError::SessionFatal {
                        row: insert.row_number,
                        source,
                    };
                    error!(error = %err, insert_error = %cause, "Session unusable; reconnecting");
                    batch.outcome.rejected += 1;
                    batch.enter(LoaderState::Reconnecting);

                    match self.reconnect(session, &mut batch).await {
                        Some(fresh) => {
                            session = fresh;
                            batch.enter(LoaderState::Connected);
                        },
                        None => return batch.close_without_session(),
                    }
                },
            }
        }

        batch.commit(session).await
    }

    /// Replace a broken session: best-effort rollback and close, fixed pause,
    /// one connection attempt.
    async fn reconnect(&self, broken: C::Session, batch: &mut BatchState) -> Option<C::Session> {
        let mut broken = broken;
        if let Err(e) = broken.rollback().await {
            debug!(error = %e, "Rollback on broken session failed");
        }
        broken.close().await;

        // Whatever the abandoned transaction held is gone with it.
        batch.abandon_pending();

        tokio::time::sleep(self.reconnect_delay).await;

        match self.connector.connect().await {
            Ok(session) => {
                batch.outcome.reconnect_count += 1;
                info!(
                    reconnects = batch.outcome.reconnect_count,
                    "Reconnected; continuing with next row"
                );
                Some(session)
            },
            Err(e) => {
                let err = IngestError::ReconnectFailed(e);
                error!(error = %err, "Reconnection failed; stopping processing");
                batch.outcome.halt(HaltReason::ReconnectFailed, err.to_string());
                None
            },
        }
    }
}

/// Mutable bookkeeping for one run.
struct BatchState {
    outcome: BatchOutcome,
    state: LoaderState,
    /// Inserts released inside the currently open transaction
    pending: u64,
}

impl BatchState {
    fn new(outcome: BatchOutcome) -> Self {
        Self {
            outcome,
            state: LoaderState::Connected,
            pending: 0,
        }
    }

    fn enter(&mut self, next: LoaderState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Loader state change");
            self.state = next;
        }
    }

    fn abandon_pending(&mut self) {
        self.outcome.discarded += self.pending;
        self.pending = 0;
    }

    fn close(mut self, committed: bool) -> BatchOutcome {
        self.enter(LoaderState::Closed { committed });
        self.outcome.finish(committed);
        self.outcome.log_summary();
        self.outcome
    }

    /// Reconnect failed: there is no transaction left to commit.
    fn close_without_session(mut self) -> BatchOutcome {
        self.abandon_pending();
        self.close(false)
    }

    async fn commit<S: Session>(mut self, mut session: S) -> BatchOutcome {
        let committed = match session.commit().await {
            Ok(()) => {
                info!(inserted = self.pending, "Committed transaction");
                self.pending = 0;
                true
            },
            Err(e) => {
                let err = IngestError::CommitFailed(e);
                error!(error = %err, "Commit failed; discarding transaction");
                if let Err(e) = session.rollback().await {
                    debug!(error = %e, "Rollback after failed commit also failed");
                }
                self.outcome.halt(HaltReason::CommitFailed, err.to_string());
                self.abandon_pending();
                false
            },
        };

        session.close().await;
        self.close(committed)
    }
}
