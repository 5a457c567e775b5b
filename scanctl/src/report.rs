//! Compliance report model and the aggregation, scoring and finding rules applied to it.
//!
//! Everything here is pure: the inspectors produce records, [`aggregate`] folds them into
//! a [`ComplianceReport`], and [`Analysis::of`] derives scores, findings and
//! recommendations from a report (either one we just built or one a caller sent back).
//!
//! Scores are integer percentages. A category with no items scores 0, and the overall
//! score is the plain mean of the three category scores, so each category carries equal
//! weight regardless of how many users, tables or projects it covers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{Error, Result};
use crate::types::{FindingCategory, Severity};

/// A user of the project's identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub mfa_enabled: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_sign_in: Option<DateTime<Utc>>,
}

/// A table in the `public` schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableRecord {
    #[serde(alias = "table")]
    pub table_name: String,
    pub rls_enabled: bool,
}

/// The scanned project's recovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(alias = "id")]
    pub project_id: String,
    pub name: String,
    pub pitr_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MfaSection {
    pub total_users: usize,
    pub compliant_users: usize,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RlsSection {
    pub total_tables: usize,
    pub compliant_tables: usize,
    #[serde(default)]
    pub tables: Vec<TableRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PitrSection {
    pub total_projects: usize,
    pub compliant_projects: usize,
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
}

/// The result of one scan. Reports sent back by callers may omit the item lists,
/// in which case only the counts are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComplianceReport {
    #[serde(default = "Utc::now")]
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: DateTime<Utc>,
    pub mfa: MfaSection,
    pub rls: RlsSection,
    pub pitr: PitrSection,
}

/// Fold inspector output into a report.
pub fn aggregate(users: Vec<UserRecord>, tables: Vec<TableRecord>, projects: Vec<ProjectRecord>, timestamp: DateTime<Utc>) -> ComplianceReport {
    ComplianceReport {
        timestamp,
        mfa: MfaSection {
            total_users: users.len(),
            compliant_users: users.iter().filter(|u| u.mfa_enabled).count(),
            users,
        },
        rls: RlsSection {
            total_tables: tables.len(),
            compliant_tables: tables.iter().filter(|t| t.rls_enabled).count(),
            tables,
        },
        pitr: PitrSection {
            total_projects: projects.len(),
            compliant_projects: projects.iter().filter(|p| p.pitr_enabled).count(),
            projects,
        },
    }
}

/// Compliant and total item counts for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub compliant: usize,
    pub total: usize,
}

impl Tally {
    fn checked(category: FindingCategory, compliant: usize, total: usize, listed: usize) -> Result<Self> {
        if compliant > total {
            return Err(Error::MalformedReportInput {
                message: format!("{category} compliant count ({compliant}) exceeds total ({total})"),
            });
        }
        if listed != 0 && listed != total {
            return Err(Error::MalformedReportInput {
                message: format!("{category} total ({total}) does not match the {listed} listed items"),
            });
        }
        Ok(Self { compliant, total })
    }

    /// Integer percentage, 0 for an empty category.
    pub fn score(&self) -> u8 {
        category_score(self.compliant, self.total)
    }
}

pub fn category_score(compliant: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = compliant.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}

impl ComplianceReport {
    /// Per-category tallies in MFA, RLS, PITR order, after checking the count invariants.
    pub fn tallies(&self) -> Result<[Tally; 3]> {
        Ok([
            Tally::checked(FindingCategory::Mfa, self.mfa.compliant_users, self.mfa.total_users, self.mfa.users.len())?,
            Tally::checked(FindingCategory::Rls, self.rls.compliant_tables, self.rls.total_tables, self.rls.tables.len())?,
            Tally::checked(
                FindingCategory::Pitr,
                self.pitr.compliant_projects,
                self.pitr.total_projects,
                self.pitr.projects.len(),
            )?,
        ])
    }

    /// Parse a caller-supplied report, mapping shape errors to `MalformedReportInput`.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let report: Self = serde_json::from_value(value).map_err(|e| Error::MalformedReportInput { message: e.to_string() })?;
        report.tallies()?;
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScoreSet {
    pub overall: u8,
    pub mfa: u8,
    pub rls: u8,
    pub pitr: u8,
}

impl ScoreSet {
    pub fn from_report(report: &ComplianceReport) -> Result<Self> {
        let [mfa, rls, pitr] = report.tallies()?;
        Ok(Self::from_category_scores(mfa.score(), rls.score(), pitr.score()))
    }

    /// Overall is the unweighted mean of the three category scores.
    pub fn from_category_scores(mfa: u8, rls: u8, pitr: u8) -> Self {
        let sum = u32::from(mfa) + u32::from(rls) + u32::from(pitr);
        let overall = (f64::from(sum) / 3.0).round() as u8;
        Self { overall, mfa, rls, pitr }
    }

    pub fn for_category(&self, category: FindingCategory) -> u8 {
        match category {
            FindingCategory::Mfa => self.mfa,
            FindingCategory::Rls => self.rls,
            FindingCategory::Pitr => self.pitr,
        }
    }
}

/// A compliance shortfall in one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Finding {
    pub category: FindingCategory,
    pub severity: Severity,
    pub description: String,
}

fn severity_for(category: FindingCategory) -> Severity {
    match category {
        FindingCategory::Mfa | FindingCategory::Rls => Severity::High,
        FindingCategory::Pitr => Severity::Medium,
    }
}

fn shortfall_description(category: FindingCategory) -> &'static str {
    match category {
        FindingCategory::Mfa => "MFA not enabled for all users",
        FindingCategory::Rls => "RLS not enabled for all tables",
        FindingCategory::Pitr => "PITR not enabled for all projects",
    }
}

/// Canned remediation advice for a category shortfall.
pub fn recommendation(category: FindingCategory) -> &'static str {
    match category {
        FindingCategory::Mfa => "Enable MFA for all users to enhance account security",
        FindingCategory::Rls => "Enable RLS on all tables to prevent unauthorized data access",
        FindingCategory::Pitr => "Enable PITR to ensure data recovery capabilities",
    }
}

/// One finding per category scoring below 100, in MFA, RLS, PITR order.
pub fn findings(scores: &ScoreSet) -> Vec<Finding> {
    FindingCategory::ALL
        .into_iter()
        .filter(|category| scores.for_category(*category) < 100)
        .map(|category| Finding {
            category,
            severity: severity_for(category),
            description: shortfall_description(category).to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Risks {
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl Risks {
    fn from_findings(findings: &[Finding]) -> Self {
        let mut risks = Risks::default();
        for finding in findings {
            let bucket = match finding.severity {
                Severity::High => &mut risks.high,
                Severity::Medium => &mut risks.medium,
                Severity::Low => &mut risks.low,
            };
            bucket.push(finding.description.clone());
        }
        risks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDetail {
    pub compliant_count: usize,
    pub total_count: usize,
    pub percentage: u8,
}

impl From<Tally> for CategoryDetail {
    fn from(tally: Tally) -> Self {
        Self {
            compliant_count: tally.compliant,
            total_count: tally.total,
            percentage: tally.score(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisDetails {
    pub mfa: CategoryDetail,
    pub rls: CategoryDetail,
    pub pitr: CategoryDetail,
}

/// Structured view of a report: scores, findings grouped by severity, and advice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Analysis {
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: DateTime<Utc>,
    pub scores: ScoreSet,
    pub risks: Risks,
    pub recommendations: Vec<String>,
    pub findings: Vec<Finding>,
    pub details: AnalysisDetails,
}

impl Analysis {
    pub fn of(report: &ComplianceReport, timestamp: DateTime<Utc>) -> Result<Self> {
        let [mfa, rls, pitr] = report.tallies()?;
        let scores = ScoreSet::from_category_scores(mfa.score(), rls.score(), pitr.score());
        let findings = findings(&scores);

        Ok(Self {
            timestamp,
            scores,
            risks: Risks::from_findings(&findings),
            recommendations: findings.iter().map(|f| recommendation(f.category).to_string()).collect(),
            details: AnalysisDetails {
                mfa: mfa.into(),
                rls: rls.into(),
                pitr: pitr.into(),
            },
            findings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str, mfa_enabled: bool) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            mfa_enabled,
            last_sign_in: None,
        }
    }

    fn table(name: &str, rls_enabled: bool) -> TableRecord {
        TableRecord {
            table_name: name.to_string(),
            rls_enabled,
        }
    }

    fn project(pitr_enabled: bool) -> ProjectRecord {
        ProjectRecord {
            project_id: "abcd1234".to_string(),
            name: "prod".to_string(),
            pitr_enabled,
        }
    }

    #[test]
    fn test_aggregate_counts() {
        let report = aggregate(
            vec![user("1", true), user("2", false)],
            vec![table("a", true), table("b", true), table("c", false)],
            vec![project(false)],
            Utc::now(),
        );

        assert_eq!(report.mfa.total_users, 2);
        assert_eq!(report.mfa.compliant_users, 1);
        assert_eq!(report.rls.total_tables, 3);
        assert_eq!(report.rls.compliant_tables, 2);
        assert_eq!(report.pitr.total_projects, 1);
        assert_eq!(report.pitr.compliant_projects, 0);
        assert_eq!(report.pitr.projects.len(), 1);
    }

    #[test]
    fn test_scan_scenario_scores_and_findings() {
        let report = aggregate(
            vec![user("1", true), user("2", false)],
            vec![table("a", true), table("b", true), table("c", false)],
            vec![project(false)],
            Utc::now(),
        );

        let scores = ScoreSet::from_report(&report).unwrap();
        assert_eq!(
            scores,
            ScoreSet {
                overall: 39,
                mfa: 50,
                rls: 67,
                pitr: 0
            }
        );

        let found = findings(&scores);
        assert_eq!(found.len(), 3);
        assert_eq!((found[0].category, found[0].severity), (FindingCategory::Mfa, Severity::High));
        assert_eq!((found[1].category, found[1].severity), (FindingCategory::Rls, Severity::High));
        assert_eq!((found[2].category, found[2].severity), (FindingCategory::Pitr, Severity::Medium));
    }

    #[test]
    fn test_empty_category_scores_zero() {
        assert_eq!(category_score(0, 0), 0);

        let report = aggregate(vec![], vec![table("a", true)], vec![project(true)], Utc::now());
        let scores = ScoreSet::from_report(&report).unwrap();
        assert_eq!(scores.mfa, 0);
        assert_eq!(scores.rls, 100);
        assert_eq!(scores.overall, 67);
    }

    #[test]
    fn test_overall_is_equal_weight() {
        let tables = (0..100).map(|i| table(&format!("t{i}"), false)).collect();
        let report = aggregate(vec![user("1", true)], tables, vec![project(true)], Utc::now());

        let scores = ScoreSet::from_report(&report).unwrap();
        assert_eq!(scores.rls, 0);
        assert_eq!(scores.overall, 67);
    }

    #[test]
    fn test_scores_bounded() {
        for total in 0..12usize {
            for compliant in 0..=total {
                let score = category_score(compliant, total);
                assert!(score <= 100);
                if total > 0 && compliant == total {
                    assert_eq!(score, 100);
                }
            }
        }
        assert_eq!(category_score(1, 3), 33);
        assert_eq!(category_score(2, 3), 67);
        assert_eq!(category_score(1, 8), 13);
    }

    #[test]
    fn test_full_compliance_has_no_findings() {
        let scores = ScoreSet::from_category_scores(100, 100, 100);
        assert_eq!(scores.overall, 100);
        assert!(findings(&scores).is_empty());
    }

    #[test]
    fn test_single_shortfall_yields_single_finding() {
        let scores = ScoreSet::from_category_scores(100, 100, 0);
        let found = findings(&scores);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, FindingCategory::Pitr);
        assert_eq!(found[0].severity, Severity::Medium);

        let scores = ScoreSet::from_category_scores(99, 100, 100);
        let found = findings(&scores);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::High);
    }

    #[test]
    fn test_analysis_groups_risks_and_recommendations() {
        let report = aggregate(vec![user("1", false)], vec![table("a", true)], vec![project(false)], Utc::now());
        let analysis = Analysis::of(&report, Utc::now()).unwrap();

        assert_eq!(analysis.risks.high, vec!["MFA not enabled for all users"]);
        assert_eq!(analysis.risks.medium, vec!["PITR not enabled for all projects"]);
        assert!(analysis.risks.low.is_empty());
        assert_eq!(
            analysis.recommendations,
            vec![
                "Enable MFA for all users to enhance account security",
                "Enable PITR to ensure data recovery capabilities"
            ]
        );
        assert_eq!(
            analysis.details.rls,
            CategoryDetail {
                compliant_count: 1,
                total_count: 1,
                percentage: 100
            }
        );
    }

    #[test]
    fn test_report_wire_format() {
        let report = aggregate(vec![user("1", true)], vec![table("a", false)], vec![project(true)], Utc::now());
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["mfa"]["totalUsers"], 1);
        assert_eq!(value["mfa"]["users"][0]["mfaEnabled"], true);
        assert_eq!(value["rls"]["tables"][0]["tableName"], "a");
        assert_eq!(value["pitr"]["projects"][0]["pitrEnabled"], true);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_counts_only_report_from_caller() {
        let report = ComplianceReport::from_value(json!({
            "mfa": { "totalUsers": 4, "compliantUsers": 3 },
            "rls": { "totalTables": 0, "compliantTables": 0 },
            "pitr": { "totalProjects": 1, "compliantProjects": 1 }
        }))
        .unwrap();

        let scores = ScoreSet::from_report(&report).unwrap();
        assert_eq!(scores.mfa, 75);
        assert_eq!(scores.rls, 0);
        assert_eq!(scores.overall, 58);
    }

    #[test]
    fn test_malformed_reports_rejected() {
        let missing_section = json!({
            "mfa": { "totalUsers": 1, "compliantUsers": 1 },
            "rls": { "totalTables": 1, "compliantTables": 1 }
        });
        assert!(matches!(
            ComplianceReport::from_value(missing_section),
            Err(Error::MalformedReportInput { .. })
        ));

        let over_count = json!({
            "mfa": { "totalUsers": 1, "compliantUsers": 2 },
            "rls": { "totalTables": 1, "compliantTables": 1 },
            "pitr": { "totalProjects": 1, "compliantProjects": 1 }
        });
        assert!(matches!(
            ComplianceReport::from_value(over_count),
            Err(Error::MalformedReportInput { .. })
        ));

        let mismatched_list = json!({
            "mfa": { "totalUsers": 3, "compliantUsers": 1, "users": [
                { "id": "1", "email": "a@x.com", "mfaEnabled": true, "lastSignIn": null }
            ]},
            "rls": { "totalTables": 1, "compliantTables": 1 },
            "pitr": { "totalProjects": 1, "compliantProjects": 1 }
        });
        assert!(matches!(
            ComplianceReport::from_value(mismatched_list),
            Err(Error::MalformedReportInput { .. })
        ));
    }

    #[test]
    fn test_legacy_record_keys_accepted() {
        let report = ComplianceReport::from_value(json!({
            "timestamp": "2024-05-01T12:00:00Z",
            "mfa": { "totalUsers": 0, "compliantUsers": 0 },
            "rls": { "totalTables": 1, "compliantTables": 1, "tables": [{ "table": "profiles", "rlsEnabled": true }] },
            "pitr": { "totalProjects": 1, "compliantProjects": 0, "projects": [{ "id": "abcd1234", "name": "abcd1234", "pitrEnabled": false }] }
        }))
        .unwrap();

        assert_eq!(report.rls.tables[0].table_name, "profiles");
        assert_eq!(report.pitr.projects[0].project_id, "abcd1234");
    }
}
