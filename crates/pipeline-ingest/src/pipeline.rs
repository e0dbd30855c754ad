//! End-to-end ingestion of one uploaded object

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::error::IngestError;
use crate::loader::TransactionalLoader;
use crate::report::{BatchOutcome, HaltReason};
use crate::session::Connector;
use crate::source::RecordSource;
use crate::storage::{FetchError, ObjectRef, ObjectStore};

/// Runs one batch for one object. Implemented by [`IngestPipeline`]; the
/// trigger surface only depends on this.
#[async_trait]
pub trait BatchRunner: Send + Sync {
    async fn run_batch(&self, object: ObjectRef) -> BatchOutcome;
}

pub struct IngestPipeline<C: Connector> {
    store: Arc<dyn ObjectStore>,
    loader: TransactionalLoader<C>,
}

impl<C: Connector> IngestPipeline<C> {
    pub fn new(store: Arc<dyn ObjectStore>, loader: TransactionalLoader<C>) -> Self {
        Self { store, loader }
    }

    /// Fetch, parse, and load one object. Always returns a report.
    #[instrument(skip(self, object), fields(object = %object))]
    pub async fn ingest(&self, object: ObjectRef) -> BatchOutcome {
        let mut outcome = BatchOutcome::for_object(object.clone());
        info!(batch_id = %outcome.batch_id, "Event received");

        let fetched = match self.store.fetch_text(&object).await {
            Ok(fetched) => fetched,
            Err(e) => {
                let err = if matches!(e, FetchError::NotFound(_)) {
                    IngestError::SourceUnavailable(e.to_string())
                } else {
                    IngestError::Storage(e)
                };
                error!(error = %err, "Source unavailable; no database work attempted");
                outcome.halt(HaltReason::SourceUnavailable, err.to_string());
                outcome.finish(false);
                outcome.log_summary();
                return outcome;
            },
        };

        if fetched.lossy {
            warn!("Object was not valid UTF-8; decoded with replacement characters");
        }

        let source = RecordSource::from_text(&fetched.text);
        info!(columns = ?source.columns(), "Parsed header");

        let outcome = self.loader.load(source, outcome).await;
        info!(
            inserted = outcome.inserted,
            status = ?outcome.status(),
            "Done processing object"
        );
        outcome
    }
}

#[async_trait]
impl<C: Connector> BatchRunner for IngestPipeline<C> {
    async fn run_batch(&self, object: ObjectRef) -> BatchOutcome {
        self.ingest(object).await
    }
}
