//! The scan pipeline: validate credentials, run the inspectors, aggregate.

use chrono::Utc;
use tracing::{info, instrument};

use crate::credentials::{CredentialValidator, RawCredentials};
use crate::errors::Result;
use crate::inspectors::Backends;
use crate::report::{ComplianceReport, aggregate};

/// Run a full compliance scan of one project.
///
/// Credentials are validated before any backend is contacted. The three inspectors
/// then run concurrently; the first failure aborts the others and fails the scan, so
/// a report is either complete or not produced at all.
#[instrument(skip_all)]
pub async fn run_scan(backends: &Backends, validator: &CredentialValidator, raw: &RawCredentials) -> Result<ComplianceReport> {
    let credentials = validator.validate(raw)?;
    let database = credentials.database_access();
    let management = credentials.management_access();

    info!(
        project_ref = %credentials.project_ref,
        host = credentials.endpoint.host_str().unwrap_or_default(),
        "Starting compliance scan"
    );

    let (users, tables, project) = tokio::try_join!(
        backends.identity.list_users(&credentials.endpoint, &credentials.service_role_key),
        backends.catalog.list_public_tables(&database),
        backends.management.project_settings(&management),
    )?;

    let report = aggregate(users, tables, vec![project], Utc::now());
    info!(
        users = report.mfa.total_users,
        tables = report.rls.total_tables,
        "Compliance scan complete"
    );

    Ok(report)
}
