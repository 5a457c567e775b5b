//! In-memory backends and app construction for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use crate::config::Config;
use crate::credentials::{CredentialValidator, DatabaseAccess, ManagementAccess, RawCredentials};
use crate::errors::{Error, Result};
use crate::inspectors::{Backends, DatabaseCatalog, IdentityApi, ManagementApi};
use crate::narrative::{NarrativeAnalyzer, TextGenerator};
use crate::report::{ProjectRecord, TableRecord, UserRecord};
use crate::types::TableIdentifier;
use crate::{AppState, Application};

/// reqwest is built without a default crypto provider; install one for tests that
/// build real clients. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// A complete, well-formed credential bundle for project `abcd1234`.
pub fn valid_credentials() -> RawCredentials {
    RawCredentials {
        supabase_url: Some("https://abcd1234.supabase.co".to_string()),
        service_role_key: Some("eyJhbGciOiJIUzI1NiJ9.test".to_string()),
        db_password: Some("hunter2".to_string()),
        management_token: Some("sbp_0123456789".to_string()),
    }
}

/// [`valid_credentials`] as a request body.
pub fn valid_credentials_json() -> serde_json::Value {
    serde_json::json!({
        "supabaseUrl": "https://abcd1234.supabase.co",
        "serviceRoleKey": "eyJhbGciOiJIUzI1NiJ9.test",
        "dbPassword": "hunter2",
        "managementToken": "sbp_0123456789"
    })
}

/// Stands in for all three backends and records every call made to it.
pub struct FakePlatform {
    pub users: Vec<UserRecord>,
    pub tables: Vec<TableRecord>,
    pub project: ProjectRecord,
    /// When set, the identity listing fails with a 401 carrying this message
    pub identity_failure: Option<String>,
    /// When set, both remediation actions fail with a 403 carrying this message
    pub remediation_failure: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakePlatform {
    /// Two users (one with MFA), three tables (two with RLS), PITR off.
    pub fn scenario() -> Self {
        let user = |id: &str, mfa_enabled| UserRecord {
            id: id.to_string(),
            email: format!("user{id}@example.com"),
            mfa_enabled,
            last_sign_in: None,
        };
        let table = |name: &str, rls_enabled| TableRecord {
            table_name: name.to_string(),
            rls_enabled,
        };

        Self {
            users: vec![user("1", true), user("2", false)],
            tables: vec![table("profiles", true), table("orders", true), table("audit_log", false)],
            project: ProjectRecord {
                project_id: "abcd1234".to_string(),
                name: "production".to_string(),
                pitr_enabled: false,
            },
            identity_failure: None,
            remediation_failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn backends(self: &Arc<Self>) -> Backends {
        Backends {
            identity: self.clone(),
            catalog: self.clone(),
            management: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn remediation_result(&self) -> Result<()> {
        match &self.remediation_failure {
            Some(message) => Err(Error::RemediationFailed {
                status: Some(403),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IdentityApi for FakePlatform {
    async fn list_users(&self, _endpoint: &Url, _service_role_key: &str) -> Result<Vec<UserRecord>> {
        self.record("list_users");
        match &self.identity_failure {
            Some(message) => Err(Error::IdentityFetch {
                status: Some(401),
                message: message.clone(),
            }),
            None => Ok(self.users.clone()),
        }
    }
}

#[async_trait]
impl DatabaseCatalog for FakePlatform {
    async fn list_public_tables(&self, _access: &DatabaseAccess) -> Result<Vec<TableRecord>> {
        self.record("list_public_tables");
        Ok(self.tables.clone())
    }

    async fn enable_row_level_security(&self, _access: &DatabaseAccess, table: &TableIdentifier) -> Result<()> {
        self.record(format!("enable_row_level_security:{table}"));
        self.remediation_result()
    }
}

#[async_trait]
impl ManagementApi for FakePlatform {
    async fn project_settings(&self, _access: &ManagementAccess) -> Result<ProjectRecord> {
        self.record("project_settings");
        Ok(self.project.clone())
    }

    async fn enable_point_in_time_recovery(&self, _access: &ManagementAccess) -> Result<()> {
        self.record("enable_point_in_time_recovery");
        self.remediation_result()
    }
}

/// A text generator with a canned reply that remembers the last prompt it saw.
pub struct FakeGenerator {
    reply: std::result::Result<String, String>,
    last_prompt: Mutex<Option<(String, String)>>,
}

impl FakeGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            last_prompt: Mutex::new(None),
        }
    }

    /// The (system, user) pair from the most recent call.
    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        *self.last_prompt.lock().unwrap() = Some((system.to_string(), user.to_string()));
        self.reply.clone().map_err(|message| Error::NarrativeService { message })
    }
}

/// Build a test server whose backends are the given fakes.
pub fn create_test_app(platform: Arc<FakePlatform>, generator: Arc<FakeGenerator>, config: Config) -> axum_test::TestServer {
    let state = AppState::builder()
        .validator(CredentialValidator::new(&config.credentials))
        .backends(platform.backends())
        .narrator(Arc::new(NarrativeAnalyzer::new(generator).expect("Failed to build narrative analyzer")))
        .config(config)
        .build();

    Application::from_state(state)
        .expect("Failed to build application")
        .into_test_server()
}
