//! Bulk workflow operations driven by a CSV of issue keys.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::model::work_item::IssueType;
use crate::providers::IssueTracker;
use crate::update::{read_records, record_key, record_value, CsvRecord};
use crate::workflow::{self, CloseOutcome, TransitionOutcome};

/// Final status for an issue type: epics and stories are closed, everything
/// else is done.
pub fn target_for_type(issue_type: &IssueType) -> &'static str {
    match issue_type {
        IssueType::Epic | IssueType::Story => "Closed",
        _ => "Done",
    }
}

const REPORT_HEADER: [&str; 6] = [
    "Issue Key",
    "Summary",
    "Issue Type",
    "Target Status",
    "Result",
    "Message",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowResult {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    #[serde(rename = "Issue Key")]
    pub key: String,
    #[serde(rename = "Summary")]
    pub summary: String,
    #[serde(rename = "Issue Type")]
    pub issue_type: String,
    #[serde(rename = "Target Status")]
    pub target: String,
    #[serde(rename = "Result")]
    pub result: RowResult,
    #[serde(rename = "Message")]
    pub message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BulkSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BulkSummary {
    fn count(&mut self, result: RowResult) {
        match result {
            RowResult::Success => self.succeeded += 1,
            RowResult::Skipped => self.skipped += 1,
            RowResult::Failed => self.failed += 1,
        }
    }
}

async fn already_in(tracker: &dyn IssueTracker, key: &str, target: &str) -> bool {
    match tracker.get_issue(key).await {
        Ok(issue) => issue
            .status_name()
            .is_some_and(|s| s.eq_ignore_ascii_case(target)),
        Err(_) => false,
    }
}

async fn transition_row(
    tracker: &dyn IssueTracker,
    key: &str,
    target: &str,
) -> (RowResult, String) {
    let failure = match workflow::transition_issue(tracker, key, target).await {
        Ok(TransitionOutcome::Transitioned {
            transition,
            to_status,
            resolution_warning,
            ..
        }) => {
            let mut message = format!("'{transition}' -> {to_status}");
            if resolution_warning {
                message.push_str(" (resolution still Unresolved)");
            }
            return (RowResult::Success, message);
        }
        Ok(TransitionOutcome::NotAvailable { available, .. }) => {
            format!("No '{target}' transition. Available: {}", available.join(", "))
        }
        Err(e) => e.to_string(),
    };
    if already_in(tracker, key, target).await {
        (RowResult::Skipped, format!("Already in {target}"))
    } else {
        (RowResult::Failed, failure)
    }
}

/// Records with an issue key, first occurrence of each key only.
fn unique_keyed(records: &[CsvRecord]) -> Vec<(&str, &CsvRecord)> {
    let mut seen = HashSet::new();
    let mut keyed = Vec::new();
    for record in records {
        let Some(key) = record_key(record) else {
            log::warn!("Skipping row without an issue key");
            continue;
        };
        if !seen.insert(key.to_uppercase()) {
            log::debug!("Ignoring repeated key {key}");
            continue;
        }
        keyed.push((key, record));
    }
    keyed
}

/// One issue and the status it should end up in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransition {
    pub key: String,
    pub summary: String,
    pub issue_type: IssueType,
    pub target: String,
}

/// Read the issues listed in `source` and decide each target status without
/// contacting the tracker. `forced_target` overrides the per-type target.
pub fn plan_transitions(
    source: &Path,
    forced_target: Option<&str>,
) -> Result<Vec<PlannedTransition>> {
    let records = read_records(source)?;
    Ok(unique_keyed(&records)
        .into_iter()
        .map(|(key, record)| {
            let issue_type =
                IssueType::from(record_value(record, "IssueType").unwrap_or_default());
            let target = forced_target
                .unwrap_or_else(|| target_for_type(&issue_type))
                .to_string();
            PlannedTransition {
                key: key.to_string(),
                summary: record_value(record, "Summary").unwrap_or_default().to_string(),
                issue_type,
                target,
            }
        })
        .collect())
}

/// Move every planned issue to its target status and write a per-row report.
pub async fn bulk_transition(
    tracker: &dyn IssueTracker,
    plan: &[PlannedTransition],
    report: &Path,
) -> Result<(BulkSummary, Vec<ReportRow>)> {
    let mut summary = BulkSummary::default();
    let mut rows = Vec::new();

    for planned in plan {
        let key = planned.key.as_str();
        let (result, message) = transition_row(tracker, key, &planned.target).await;
        match result {
            RowResult::Failed => log::error!("{key}: {message}"),
            _ => log::info!("{key}: {message}"),
        }
        summary.count(result);
        rows.push(ReportRow {
            key: planned.key.clone(),
            summary: planned.summary.clone(),
            issue_type: planned.issue_type.to_string(),
            target: planned.target.clone(),
            result,
            message,
        });
    }

    if let Some(parent) = report.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(report)?;
    if rows.is_empty() {
        wtr.write_record(REPORT_HEADER)?;
    }
    for row in &rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    log::info!(
        "Bulk transition: {} succeeded, {} skipped, {} failed. Report: {}",
        summary.succeeded,
        summary.skipped,
        summary.failed,
        report.display()
    );
    Ok((summary, rows))
}

/// A closed issue whose resolution is still `Unresolved`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedIssue {
    pub key: String,
    pub summary: String,
    pub status: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnresolvedScan {
    pub checked: usize,
    /// Keys that could not be fetched.
    pub failed: usize,
    pub unresolved: Vec<UnresolvedIssue>,
}

/// Look up every key in `source` and collect the closed but unresolved
/// issues. Read-only.
pub async fn scan_unresolved(tracker: &dyn IssueTracker, source: &Path) -> Result<UnresolvedScan> {
    let records = read_records(source)?;
    let mut scan = UnresolvedScan::default();

    for (key, _) in unique_keyed(&records) {
        scan.checked += 1;
        let issue = match tracker.get_issue(key).await {
            Ok(issue) => issue,
            Err(e) => {
                log::error!("Could not fetch {key}: {e}");
                scan.failed += 1;
                continue;
            }
        };
        let status = issue.status_name().unwrap_or_default();
        if !workflow::is_closed_status(status) || !issue.is_unresolved() {
            continue;
        }
        log::info!("{key} is {status} but Unresolved");
        scan.unresolved.push(UnresolvedIssue {
            key: key.to_string(),
            summary: issue.summary().unwrap_or_default().to_string(),
            status: status.to_string(),
        });
    }
    Ok(scan)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FixSummary {
    pub fixed: usize,
    pub still_unresolved: usize,
    pub failed: usize,
}

/// Give each issue found by [`scan_unresolved`] a resolution.
pub async fn fix_unresolved(
    tracker: &dyn IssueTracker,
    issues: &[UnresolvedIssue],
    preferred_resolution: &str,
) -> FixSummary {
    let mut summary = FixSummary::default();
    for issue in issues {
        let key = issue.key.as_str();
        let outcome =
            workflow::transition_to_done_with_resolution(tracker, key, preferred_resolution).await;
        match outcome {
            Ok(outcome) if outcome.is_resolved() => summary.fixed += 1,
            Ok(CloseOutcome::NotAvailable { available }) => {
                log::warn!("{key}: no closing transition. Available: {}", available.join(", "));
                summary.still_unresolved += 1;
            }
            Ok(_) => summary.still_unresolved += 1,
            Err(e) => {
                log::error!("Failed to fix {key}: {e}");
                summary.failed += 1;
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tests::{transition, MockTracker};
    use serde_json::json;

    #[test]
    fn targets_by_type() {
        assert_eq!(target_for_type(&IssueType::Epic), "Closed");
        assert_eq!(target_for_type(&IssueType::Story), "Closed");
        assert_eq!(target_for_type(&IssueType::Task), "Done");
        assert_eq!(target_for_type(&IssueType::SubTask), "Done");
        assert_eq!(target_for_type(&IssueType::Other("Bug".into())), "Done");
    }

    #[tokio::test]
    async fn reports_success_skip_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("issues.csv");
        let report = dir.path().join("report.csv");
        std::fs::write(
            &source,
            "Created Issue ID,Summary,IssueType\n\
             PROJ-1,Epic work,Epic\n\
             PROJ-2,Task work,Task\n\
             PROJ-3,Stuck,Task\n",
        )
        .unwrap();
        let tracker = MockTracker::new()
            .with_status("PROJ-1", "In Progress")
            .with_transitions("PROJ-1", vec![transition("21", "Closed", "Closed", &["Done"])])
            .with_status("PROJ-2", "Done")
            .with_status("PROJ-3", "To Do")
            .with_transitions("PROJ-3", vec![transition("11", "Start", "In Progress", &[])]);

        let plan = plan_transitions(&source, None).unwrap();
        let (summary, rows) = bulk_transition(&tracker, &plan, &report).await.unwrap();
        assert_eq!(
            summary,
            BulkSummary {
                succeeded: 1,
                skipped: 1,
                failed: 1,
            }
        );
        assert_eq!(rows[0].target, "Closed");
        assert_eq!(rows[1].result, RowResult::Skipped);
        assert_eq!(rows[2].result, RowResult::Failed);
        assert!(rows[2].message.contains("Start"));

        let text = std::fs::read_to_string(&report).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Issue Key,Summary,Issue Type,Target Status,Result,Message"
        );
        assert!(lines.next().unwrap().starts_with("PROJ-1,Epic work,Epic,Closed,Success,"));
        assert_eq!(tracker.issue("PROJ-1").unwrap().resolution_name(), "Done");
    }

    #[test]
    fn forced_target_overrides_type() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("issues.csv");
        std::fs::write(&source, "Issue Key,IssueType\nPROJ-1,Epic\nPROJ-2,Story\n").unwrap();
        let plan = plan_transitions(&source, Some("Done")).unwrap();
        assert!(plan.iter().all(|p| p.target == "Done"));
        let plan = plan_transitions(&source, None).unwrap();
        assert_eq!(plan[0].target, "Closed");
        assert_eq!(plan[1].issue_type, IssueType::Story);
    }

    #[tokio::test]
    async fn repeated_keys_are_transitioned_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("issues.csv");
        std::fs::write(
            &source,
            "Created Issue ID,IssueType\nPROJ-1,Task\nPROJ-1,Task\nproj-1,Task\n,Task\n",
        )
        .unwrap();
        let plan = plan_transitions(&source, None).unwrap();
        assert_eq!(plan.len(), 1);

        let tracker = MockTracker::new()
            .with_status("PROJ-1", "To Do")
            .with_transitions("PROJ-1", vec![transition("31", "Done", "Done", &[])]);
        let (summary, rows) = bulk_transition(&tracker, &plan, &dir.path().join("r.csv"))
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(tracker.mutating_calls().len(), 1);
    }

    #[tokio::test]
    async fn scan_finds_closed_unresolved_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("issues.csv");
        std::fs::write(
            &source,
            "Created Issue ID\nPROJ-1\nPROJ-2\nPROJ-3\nPROJ-9\nPROJ-1\n",
        )
        .unwrap();
        let tracker = MockTracker::new()
            .with_status("PROJ-1", "Closed")
            .with_issue(
                "PROJ-2",
                json!({ "status": { "name": "Done" }, "resolution": { "name": "Done" } }),
            )
            .with_status("PROJ-3", "In Progress");

        let scan = scan_unresolved(&tracker, &source).await.unwrap();
        assert_eq!(scan.checked, 4);
        assert_eq!(scan.failed, 1);
        assert_eq!(scan.unresolved.len(), 1);
        assert_eq!(scan.unresolved[0].key, "PROJ-1");
        assert_eq!(scan.unresolved[0].status, "Closed");
        assert!(tracker.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn fixes_scanned_issues() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("issues.csv");
        std::fs::write(&source, "Created Issue ID\nPROJ-1\nPROJ-3\n").unwrap();
        let tracker = MockTracker::new()
            .with_status("PROJ-1", "Closed")
            .with_status("PROJ-3", "In Progress");

        let scan = scan_unresolved(&tracker, &source).await.unwrap();
        let summary = fix_unresolved(&tracker, &scan.unresolved, "Done").await;
        assert_eq!(
            summary,
            FixSummary {
                fixed: 1,
                still_unresolved: 0,
                failed: 0,
            }
        );
        assert_eq!(tracker.issue("PROJ-1").unwrap().resolution_name(), "Done");
        assert!(tracker.issue("PROJ-3").unwrap().is_unresolved());
    }
}
