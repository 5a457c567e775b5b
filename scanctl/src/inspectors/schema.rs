//! Direct database access for reading and enabling row-level security.
//!
//! Every call opens its own connection and closes it before returning, whether the
//! statement succeeded or not. Connections are never pooled: scans are infrequent,
//! each targets a different project, and the password is only valid for the request
//! that carried it.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::{info, instrument, warn};

use super::DatabaseCatalog;
use crate::config::{DatabaseConfig, TlsPolicy};
use crate::credentials::DatabaseAccess;
use crate::errors::{Error, Result};
use crate::report::TableRecord;
use crate::types::TableIdentifier;

const PUBLIC_SCHEMA: &str = "public";

const LIST_TABLES_QUERY: &str = "SELECT tablename::text, rowsecurity FROM pg_catalog.pg_tables WHERE schemaname = $1 ORDER BY tablename";

/// The one statement that interpolates an identifier. Only a [`TableIdentifier`] is
/// accepted, so the allow-list check has already happened.
pub fn enable_rls_statement(table: &TableIdentifier) -> String {
    format!("ALTER TABLE {PUBLIC_SCHEMA}.\"{table}\" ENABLE ROW LEVEL SECURITY")
}

/// The concrete implementation of [`DatabaseCatalog`].
pub struct PgCatalog {
    config: DatabaseConfig,
}

impl PgCatalog {
    pub fn new(config: DatabaseConfig) -> Self {
        if config.tls == TlsPolicy::Disable {
            warn!("Database TLS is disabled; credentials will cross the network in clear text");
        }
        Self { config }
    }

    /// Connection options for a project's database. The statement and lock timeouts
    /// are enforced by the server for the lifetime of the session.
    pub fn connect_options(&self, access: &DatabaseAccess) -> PgConnectOptions {
        let timeout_ms = self.config.statement_timeout.as_millis().to_string();
        let mut options = PgConnectOptions::new()
            .host(&self.config.host_for(&access.project_ref))
            .port(self.config.port)
            .username(&self.config.user)
            .password(&access.password)
            .database(&self.config.name)
            .ssl_mode(self.config.tls.into())
            .options([("statement_timeout", timeout_ms.as_str()), ("lock_timeout", timeout_ms.as_str())]);

        if let Some(ca) = &self.config.ca_cert_path {
            options = options.ssl_root_cert(ca);
        }

        options
    }

    async fn connect(&self, access: &DatabaseAccess) -> std::result::Result<PgConnection, String> {
        let options = self.connect_options(access);
        let host = self.config.host_for(&access.project_ref);
        info!("Connecting to database at {}", host);

        match tokio::time::timeout(self.config.connect_timeout, options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out connecting to {host} after {:?}", self.config.connect_timeout)),
        }
    }

    /// Run a statement under `statement_timeout`, in case the server never answers.
    async fn bounded<T, F>(&self, statement: F) -> std::result::Result<T, String>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.config.statement_timeout, statement).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("statement timed out after {:?}", self.config.statement_timeout)),
        }
    }
}

/// Close a connection, logging rather than failing when the close itself errors.
async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        warn!("Error closing database connection: {}", e);
    }
}

#[async_trait]
impl DatabaseCatalog for PgCatalog {
    #[instrument(skip_all, fields(project_ref = %access.project_ref))]
    async fn list_public_tables(&self, access: &DatabaseAccess) -> Result<Vec<TableRecord>> {
        let mut conn = self.connect(access).await.map_err(|message| Error::SchemaFetch { message })?;

        let rows = self
            .bounded(
                sqlx::query_as::<_, (String, bool)>(LIST_TABLES_QUERY)
                    .bind(PUBLIC_SCHEMA)
                    .fetch_all(&mut conn),
            )
            .await;

        release(conn).await;

        let rows = rows.map_err(|message| Error::SchemaFetch { message })?;
        info!("Found {} tables in the {} schema", rows.len(), PUBLIC_SCHEMA);

        Ok(rows
            .into_iter()
            .map(|(table_name, rls_enabled)| TableRecord { table_name, rls_enabled })
            .collect())
    }

    #[instrument(skip_all, fields(project_ref = %access.project_ref, table = %table))]
    async fn enable_row_level_security(&self, access: &DatabaseAccess, table: &TableIdentifier) -> Result<()> {
        let mut conn = self.connect(access).await.map_err(|message| Error::RemediationFailed {
            status: None,
            message: format!("Database connection failed: {message}"),
        })?;

        let statement = enable_rls_statement(table);
        let result = self.bounded(sqlx::query(&statement).execute(&mut conn)).await;

        release(conn).await;

        result.map_err(|e| Error::RemediationFailed {
            status: None,
            message: format!("Failed to enable RLS for table {table}: {e}"),
        })?;

        info!("Row level security enabled");
        Ok(())
    }
}
