//! Clients for the three backends a scan talks to.
//!
//! Each backend sits behind a trait so the scan pipeline and the remediation
//! dispatcher can be exercised against in-memory fakes. The concrete implementations
//! are:
//!
//! - [`identity::IdentityApiReqwest`]: the identity admin API (user list, MFA factors)
//! - [`schema::PgCatalog`]: a direct Postgres connection (RLS flags, RLS enablement)
//! - [`project::ManagementApiReqwest`]: the management API (PITR setting)

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::Config;
use crate::credentials::{DatabaseAccess, ManagementAccess};
use crate::errors::Result;
use crate::report::{ProjectRecord, TableRecord, UserRecord};
use crate::types::TableIdentifier;

pub mod http;
pub mod identity;
pub mod project;
pub mod schema;

/// Reads the user list from the identity admin API.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn list_users(&self, endpoint: &Url, service_role_key: &str) -> Result<Vec<UserRecord>>;
}

/// Reads and alters row-level security through a direct database connection.
#[async_trait]
pub trait DatabaseCatalog: Send + Sync {
    async fn list_public_tables(&self, access: &DatabaseAccess) -> Result<Vec<TableRecord>>;

    async fn enable_row_level_security(&self, access: &DatabaseAccess, table: &TableIdentifier) -> Result<()>;
}

/// Reads and updates project settings through the management API.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn project_settings(&self, access: &ManagementAccess) -> Result<ProjectRecord>;

    async fn enable_point_in_time_recovery(&self, access: &ManagementAccess) -> Result<()>;
}

/// The backend clients shared by every request.
#[derive(Clone)]
pub struct Backends {
    pub identity: Arc<dyn IdentityApi>,
    pub catalog: Arc<dyn DatabaseCatalog>,
    pub management: Arc<dyn ManagementApi>,
}

impl Backends {
    /// Build the production clients. HTTP clients are created once and reused.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            identity: Arc::new(identity::IdentityApiReqwest::new(&config.identity)?),
            catalog: Arc::new(schema::PgCatalog::new(config.database.clone())),
            management: Arc::new(project::ManagementApiReqwest::new(&config.management)?),
        })
    }
}
