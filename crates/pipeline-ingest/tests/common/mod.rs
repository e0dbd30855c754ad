//! PostgreSQL test container for loader integration tests
//!
//! Each test gets its own container and a `company.employee` table shaped
//! like the production target.


use anyhow::{Context, Result};
use pipeline_ingest::session::PgConnector;
use pipeline_ingest::statement::QualifiedTable;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

pub const SCHEMA: &str = "company";
pub const TABLE: &str = "employee";

/// Target table with a capitalised-department check, so lowercase
/// departments are rejected row by row.
pub const EMPLOYEE_DDL: &[&str] = &[
    "CREATE SCHEMA company",
    r#"CREATE TABLE company.employee (
        id INTEGER NOT NULL,
        name TEXT NOT NULL,
        dept TEXT NOT NULL CHECK (dept ~ '^[A-Z]')
    )"#,
];

pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        Self::start_with_ddl(EMPLOYEE_DDL).await
    }

    /// Start a container and run `ddl` statements in order.
    pub async fn start_with_ddl(ddl: &[&str]) -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        for statement in ddl {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .with_context(|| format!("Failed to run DDL: {}", statement))?;
        }

        Ok(Self {
            _container: container,
            pool,
            connection_string,
        })
    }

    pub fn table(&self) -> QualifiedTable {
        QualifiedTable::new(SCHEMA, TABLE).expect("static table name is valid")
    }

    pub fn connector(&self) -> PgConnector {
        let options =
            PgConnectOptions::from_str(&self.connection_string).expect("container URL parses");
        PgConnector::new(options, self.table(), Duration::from_secs(10))
    }

    /// `(id, name, dept)` rows currently visible, ordered by id.
    pub async fn employees(&self) -> Result<Vec<(i32, String, String)>> {
        sqlx::query_as("SELECT id, name, dept FROM company.employee ORDER BY id, name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read employees")
    }
}
