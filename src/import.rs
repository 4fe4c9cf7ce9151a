//! Bulk creation of work items from the prepared CSV.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::config::{AppConfig, Assignee};
use crate::error::ApiError;
use crate::ledger::Ledger;
use crate::model::field_map::FieldRoles;
use crate::model::work_item::WorkItemRow;
use crate::providers::jira::assignee_value;
use crate::providers::{IssueTracker, NewIssue};
use crate::util::time::is_iso_date;

const WORKLOG_COMMENT: &str = "Logged from calendar import";

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub roles: FieldRoles,
    pub assignee: Option<Assignee>,
}

impl ImportOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            roles: config.field_map.roles.clone(),
            assignee: config.assignee.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Post-creation steps that failed on issues that were created.
    pub step_failures: usize,
}

/// Read work-item rows, skipping malformed records.
pub fn read_work_items(path: &Path) -> Result<Vec<WorkItemRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, record) in rdr.deserialize::<WorkItemRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => log::warn!("Skipping malformed row {} in {}: {e}", i + 2, path.display()),
        }
    }
    Ok(rows)
}

/// Parent references resolve by issue key or by summary, exact first and
/// then case-insensitively.
#[derive(Debug, Default)]
struct ParentLookup {
    exact: HashMap<String, String>,
    folded: HashMap<String, String>,
}

impl ParentLookup {
    fn insert(&mut self, summary: &str, key: &str) {
        for name in [key, summary] {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            self.exact.insert(name.to_string(), key.to_string());
            self.folded.insert(name.to_lowercase(), key.to_string());
        }
    }

    fn get(&self, reference: &str) -> Option<&str> {
        let reference = reference.trim();
        self.exact
            .get(reference)
            .or_else(|| self.folded.get(&reference.to_lowercase()))
            .map(String::as_str)
    }

    fn len(&self) -> usize {
        self.exact.len()
    }
}

async fn resolve_parent(
    tracker: &dyn IssueTracker,
    lookup: &ParentLookup,
    reference: &str,
) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if let Some(key) = lookup.get(reference) {
        return Some(key.to_string());
    }
    match tracker.get_issue(reference).await {
        Ok(issue) => Some(issue.key),
        Err(e) => {
            match e.downcast_ref::<ApiError>().map(ApiError::status) {
                Some(404) => log::debug!("No issue matches parent '{reference}'"),
                _ => log::warn!("Parent lookup for '{reference}' failed: {e}"),
            }
            None
        }
    }
}

fn single(id: &str, value: Value) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(id.to_string(), value);
    fields
}

/// Creation payload extras: the row's priority and the configured assignee.
fn prepare_issue(issue: NewIssue, row: &WorkItemRow, options: &ImportOptions) -> NewIssue {
    let issue = issue.with_assignee(options.assignee.clone());
    match row.priority.trim() {
        "" => issue,
        name => issue.with_field("priority", json!({ "name": name })),
    }
}

/// Best-effort field updates on a freshly created issue. Returns how many
/// steps failed.
async fn post_create(
    tracker: &dyn IssueTracker,
    key: &str,
    row: &WorkItemRow,
    parent_link: Option<&str>,
    options: &ImportOptions,
) -> usize {
    let mut steps: Vec<(&str, Map<String, Value>)> = Vec::new();
    let mut failures = 0;

    let points = row.story_points.trim();
    if !points.is_empty() {
        match points.parse::<f64>() {
            Ok(n) => steps.push(("story points", single(&options.roles.story_points, json!(n)))),
            Err(_) => {
                log::warn!("{key}: story points '{points}' is not a number");
                failures += 1;
            }
        }
    }
    let estimate = row.original_estimate.trim();
    if !estimate.is_empty() {
        steps.push((
            "original estimate",
            single("timetracking", json!({ "originalEstimate": estimate })),
        ));
    }
    let start = row.start_date.trim();
    if is_iso_date(start) {
        steps.push(("start date", single(&options.roles.start_date, json!(start))));
    } else if !start.is_empty() {
        log::warn!("{key}: start date '{start}' is not YYYY-MM-DD, not set");
    }
    // Sent again after creation; some projects drop it from the create call.
    if let Some(assignee) = &options.assignee {
        steps.push(("assignee", single("assignee", assignee_value(assignee))));
    }

    for (step, fields) in steps {
        if let Err(e) = tracker.update_fields(key, fields).await {
            log::error!("{key}: failed to set {step}: {e}");
            failures += 1;
        }
    }

    let spent = row.time_spent.trim();
    if !spent.is_empty() {
        if let Err(e) = tracker.log_work(key, spent, Some(WORKLOG_COMMENT)).await {
            log::error!("{key}: failed to log {spent}: {e}");
            failures += 1;
        }
    }

    if let Some(parent) = parent_link {
        let fields = single("parent", json!({ "key": parent }));
        if let Err(e) = tracker.update_fields(key, fields).await {
            log::error!("{key}: failed to link parent {parent}: {e}");
            failures += 1;
        }
    }
    failures
}

/// Create every unprocessed row of `source`, top-level issues before
/// sub-tasks. Newly created rows are appended to `ledger`; `source` is only
/// read.
pub async fn import_work_items(
    tracker: &dyn IssueTracker,
    source: &Path,
    ledger: &Ledger,
    options: &ImportOptions,
) -> Result<ImportSummary> {
    let rows = read_work_items(source)?;
    let mut summary = ImportSummary::default();
    let mut lookup = ParentLookup::default();

    for row in ledger.read()?.iter().chain(rows.iter()) {
        if row.is_processed() && !row.issue_type.is_subtask() {
            lookup.insert(&row.summary, &row.created_issue_id);
        }
    }
    log::debug!("Parent lookup seeded with {} names", lookup.len());

    let mut top_level = Vec::new();
    let mut subtasks = Vec::new();
    for row in rows {
        if row.is_processed() {
            summary.skipped += 1;
        } else if row.summary.trim().is_empty() {
            log::warn!("Skipping row without a summary in project '{}'", row.project);
            summary.skipped += 1;
        } else if row.issue_type.is_subtask() {
            subtasks.push(row);
        } else {
            top_level.push(row);
        }
    }
    log::info!(
        "Importing {} top-level issues and {} sub-tasks from {}",
        top_level.len(),
        subtasks.len(),
        source.display()
    );

    let mut created_rows = Vec::new();

    // Create every top-level issue before linking, so a story can point at
    // an epic listed after it.
    let mut fresh = Vec::new();
    for mut row in top_level {
        let issue = prepare_issue(
            NewIssue::top_level(&row.project, &row.summary, row.issue_type.clone()),
            &row,
            options,
        );
        match tracker.create_issue(&issue).await {
            Ok(created) => {
                lookup.insert(&row.summary, &created.key);
                row.created_issue_id = created.key;
                fresh.push(row);
            }
            Err(e) => {
                log::error!("Failed to create '{}': {e}", row.summary);
                summary.failed += 1;
            }
        }
    }
    for row in fresh {
        let key = row.created_issue_id.as_str();
        let parent_ref = row.parent.trim();
        let link = if parent_ref.is_empty() {
            None
        } else {
            let resolved = resolve_parent(tracker, &lookup, parent_ref).await;
            if resolved.is_none() {
                log::warn!("{key}: parent '{parent_ref}' not found, not linked");
                summary.step_failures += 1;
            }
            resolved
        };
        summary.step_failures += post_create(tracker, key, &row, link.as_deref(), options).await;
        summary.created += 1;
        created_rows.push(row);
    }

    for mut row in subtasks {
        let Some(parent) = resolve_parent(tracker, &lookup, &row.parent).await else {
            log::warn!(
                "Parent '{}' not found for sub-task '{}', skipping",
                row.parent,
                row.summary
            );
            summary.skipped += 1;
            continue;
        };
        let issue = prepare_issue(
            NewIssue::subtask(&row.project, &row.summary, &parent),
            &row,
            options,
        );
        let key = match tracker.create_issue(&issue).await {
            Ok(created) => created.key,
            Err(e) => {
                log::error!("Failed to create sub-task '{}': {e}", row.summary);
                summary.failed += 1;
                continue;
            }
        };
        summary.step_failures += post_create(tracker, &key, &row, None, options).await;
        row.created_issue_id = key;
        summary.created += 1;
        created_rows.push(row);
    }

    ledger.append(&created_rows)?;
    log::info!(
        "Import finished: {} created, {} skipped, {} failed, {} step failures",
        summary.created,
        summary.skipped,
        summary.failed,
        summary.step_failures
    );
    Ok(summary)
}
