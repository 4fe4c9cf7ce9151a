//! Export issues and field metadata to CSV.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

use crate::model::field_map::FieldRoles;
use crate::model::issue::RemoteIssue;
use crate::model::work_item::{IssueType, WorkItemRow};
use crate::providers::IssueTracker;
use crate::util::time::format_seconds;

pub const MY_ISSUES_JQL: &str =
    "assignee = currentUser() OR reporter = currentUser() ORDER BY updated DESC";

pub const PAGE_SIZE: u32 = 100;

/// Fields holding durations in seconds.
const SECONDS_FIELDS: [&str; 6] = [
    "timespent",
    "timeoriginalestimate",
    "timeestimate",
    "aggregatetimespent",
    "aggregatetimeoriginalestimate",
    "aggregatetimeestimate",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// The work-item columns only, ready to be edited and fed to `update`.
    Focused,
    /// Every field, one column per field id.
    Full,
}

/// Run `jql` to completion, one page at a time.
pub async fn fetch_all(tracker: &dyn IssueTracker, jql: &str) -> Result<Vec<RemoteIssue>> {
    let mut issues = Vec::new();
    loop {
        let start_at = issues.len() as u32;
        let page = tracker.search(jql, start_at, PAGE_SIZE).await?;
        let received = page.issues.len();
        log::debug!(
            "Fetched {received} issues at {start_at} (total {})",
            page.total
        );
        issues.extend(page.issues);
        if received == 0 || received < PAGE_SIZE as usize || issues.len() >= page.total as usize {
            break;
        }
    }
    log::info!("Fetched {} issues", issues.len());
    Ok(issues)
}

fn seconds_text(issue: &RemoteIssue, id: &str) -> String {
    issue
        .field(id)
        .and_then(Value::as_i64)
        .map(format_seconds)
        .unwrap_or_default()
}

pub fn focused_row(issue: &RemoteIssue, roles: &FieldRoles) -> WorkItemRow {
    let original_estimate = issue
        .field("timetracking")
        .and_then(|t| t.get("originalEstimate"))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| seconds_text(issue, "timeoriginalestimate"));
    WorkItemRow {
        project: issue.project_key().unwrap_or_default().to_string(),
        summary: issue.summary().unwrap_or_default().to_string(),
        issue_type: IssueType::from(issue.issue_type().unwrap_or_default()),
        parent: issue.parent_key().unwrap_or_default().to_string(),
        start_date: issue.field_text(&roles.start_date),
        story_points: issue.field_text(&roles.story_points),
        original_estimate,
        time_spent: seconds_text(issue, "timespent"),
        priority: issue.priority_name().unwrap_or_default().to_string(),
        created_issue_id: issue.key.clone(),
    }
}

fn full_cell(issue: &RemoteIssue, id: &str) -> String {
    if SECONDS_FIELDS.contains(&id) {
        return seconds_text(issue, id);
    }
    issue.field_text(id)
}

fn create_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))
}

pub fn write_issues(
    path: &Path,
    issues: &[RemoteIssue],
    mode: ExportMode,
    roles: &FieldRoles,
) -> Result<()> {
    let mut wtr = create_writer(path)?;
    match mode {
        ExportMode::Focused => {
            if issues.is_empty() {
                wtr.write_record(crate::model::work_item::HEADER)?;
            }
            for issue in issues {
                wtr.serialize(focused_row(issue, roles))?;
            }
        }
        ExportMode::Full => {
            let ids: BTreeSet<&str> = issues
                .iter()
                .flat_map(|i| i.fields.keys().map(String::as_str))
                .collect();
            let mut header: Vec<&str> = ids.iter().copied().collect();
            header.push("Created Issue ID");
            wtr.write_record(&header)?;
            for issue in issues {
                let mut record: Vec<String> = ids.iter().map(|id| full_cell(issue, id)).collect();
                record.push(issue.key.clone());
                wtr.write_record(&record)?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Export the issues the current user is assigned or reported.
pub async fn export_my_issues(
    tracker: &dyn IssueTracker,
    path: &Path,
    mode: ExportMode,
    roles: &FieldRoles,
) -> Result<usize> {
    let issues = fetch_all(tracker, MY_ISSUES_JQL).await?;
    write_issues(path, &issues, mode, roles)?;
    log::info!("Exported {} issues to {}", issues.len(), path.display());
    Ok(issues.len())
}

/// All remote fields with whether they are editable on `sample_key`, or on
/// the first of the user's issues when no sample is given.
pub async fn export_field_metadata(
    tracker: &dyn IssueTracker,
    path: &Path,
    sample_key: Option<&str>,
) -> Result<usize> {
    let fields = tracker.list_fields().await?;
    let sample = match sample_key {
        Some(key) => Some(key.to_string()),
        None => tracker
            .search(MY_ISSUES_JQL, 0, 1)
            .await?
            .issues
            .into_iter()
            .next()
            .map(|i| i.key),
    };
    let editable = match &sample {
        Some(key) => tracker.edit_meta(key).await?,
        None => {
            log::warn!("No sample issue found; editable column will be empty");
            Default::default()
        }
    };

    let mut wtr = create_writer(path)?;
    wtr.write_record(["id", "name", "description", "editable"])?;
    for field in &fields {
        let is_editable = match &sample {
            Some(_) => editable.contains(&field.id).to_string(),
            None => String::new(),
        };
        wtr.write_record([
            field.id.as_str(),
            field.name.as_str(),
            field.description.as_deref().unwrap_or_default(),
            is_editable.as_str(),
        ])?;
    }
    wtr.flush()?;
    log::info!("Exported {} field definitions to {}", fields.len(), path.display());
    Ok(fields.len())
}
