//! PostgreSQL session over a single dedicated connection

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{Connector, Session, SessionError, ROW_SAVEPOINT};
use crate::statement::{BoundInsert, ColumnTypes, QualifiedTable};

const COLUMN_TYPES_QUERY: &str = r#"
    SELECT a.attname::text, pg_catalog.format_type(a.atttypid, a.atttypmod)
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relname = $2
      AND a.attnum > 0
      AND NOT a.attisdropped
"#;

/// Opens one [`PgSession`] per call; no pooling.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
    table: QualifiedTable,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new(options: PgConnectOptions, table: QualifiedTable, connect_timeout: Duration) -> Self {
        Self {
            options,
            table,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Session = PgSession;

    /// Handshake, catalog lookup and `BEGIN` share one deadline.
    #[instrument(skip(self), fields(table = %self.table))]
    async fn connect(&self) -> Result<PgSession, SessionError> {
        tokio::time::timeout(self.connect_timeout, self.open())
            .await
            .map_err(|_| SessionError::Timeout(self.connect_timeout))?
    }
}

impl PgConnector {
    async fn open(&self) -> Result<PgSession, SessionError> {
        let mut conn = PgConnection::connect_with(&self.options).await?;

        let rows: Vec<(String, String)> = sqlx::query_as(COLUMN_TYPES_QUERY)
            .bind(self.table.schema())
            .bind(self.table.table())
            .fetch_all(&mut conn)
            .await?;
        let column_types: ColumnTypes = rows.into_iter().collect();

        if column_types.is_empty() {
            info!("Target table not found in catalog; placeholders stay untyped");
        } else {
            debug!(columns = column_types.len(), "Loaded target column types");
        }

        sqlx::query("BEGIN").execute(&mut conn).await?;

        Ok(PgSession { conn, column_types })
    }
}

/// One live connection with an open transaction.
pub struct PgSession {
    conn: PgConnection,
    column_types: ColumnTypes,
}

impl PgSession {
    async fn run(&mut self, sql: &str) -> Result<(), SessionError> {
        sqlx::query(sql).execute(&mut self.conn).await?;
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn savepoint(&mut self) -> Result<(), SessionError> {
        self.run(&format!("SAVEPOINT {}", ROW_SAVEPOINT)).await
    }

    async fn release_savepoint(&mut self) -> Result<(), SessionError> {
        self.run(&format!("RELEASE SAVEPOINT {}", ROW_SAVEPOINT)).await
    }

    async fn rollback_to_savepoint(&mut self) -> Result<(), SessionError> {
        self.run(&format!("ROLLBACK TO SAVEPOINT {}", ROW_SAVEPOINT)).await
    }

    async fn execute(&mut self, insert: &BoundInsert) -> Result<(), SessionError> {
        let sql = self.render(insert);
        let mut query = sqlx::query(&sql);
        for value in &insert.values {
            query = query.bind(value.as_deref());
        }
        query.execute(&mut self.conn).await?;
        Ok(())
    }

    fn render(&self, insert: &BoundInsert) -> String {
        insert.statement.sql_with_types(&self.column_types)
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        self.run("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        self.run("ROLLBACK").await
    }

    async fn close(self) {
        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "Ignoring error while closing connection");
        }
    }
}
