//! Push CSV edits back to existing issues, sending only what changed.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::model::field_map::FieldRoles;
use crate::model::issue::{display_value, RemoteIssue};
use crate::providers::IssueTracker;

/// Columns that identify the row or are never written back.
const IGNORED_COLUMNS: [&str; 5] = [
    "created issue id",
    "issue key",
    "project",
    "issuetype",
    "time spent",
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// One CSV row keyed by header name.
pub type CsvRecord = Vec<(String, String)>;

pub fn read_records(path: &Path) -> Result<Vec<CsvRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        match result {
            Ok(record) => records.push(
                headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(String::from))
                    .collect(),
            ),
            Err(e) => log::warn!("Skipping malformed row {} in {}: {e}", i + 2, path.display()),
        }
    }
    Ok(records)
}

pub fn record_value<'a>(record: &'a CsvRecord, column: &str) -> Option<&'a str> {
    record
        .iter()
        .find(|(h, _)| h.eq_ignore_ascii_case(column))
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

pub fn record_key(record: &CsvRecord) -> Option<&str> {
    record_value(record, "Created Issue ID").or_else(|| record_value(record, "Issue Key"))
}

fn split_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn current_list(issue: &RemoteIssue, id: &str) -> BTreeSet<String> {
    split_list(&issue.field_text(id))
}

fn same_number(current: Option<&Value>, wanted: f64) -> bool {
    current
        .and_then(Value::as_f64)
        .is_some_and(|c| (c - wanted).abs() < 1e-9)
}

/// Render a value for an arbitrary field id, shaped like what the issue
/// already holds there.
fn render_like(current: Option<&Value>, raw: &str) -> Value {
    match current {
        Some(Value::Object(obj)) if obj.contains_key("value") => json!({ "value": raw }),
        Some(Value::Object(_)) => json!({ "name": raw }),
        Some(Value::Array(_)) => {
            Value::Array(split_list(raw).into_iter().map(Value::from).collect())
        }
        Some(Value::Number(_)) => raw
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| json!(raw)),
        _ => json!(raw),
    }
}

/// The update body for one row: only editable fields whose CSV value
/// differs from the issue.
pub fn diff_fields(
    record: &CsvRecord,
    issue: &RemoteIssue,
    editable: &HashSet<String>,
    roles: &FieldRoles,
) -> Map<String, Value> {
    let mut changes = Map::new();
    for (column, raw) in record {
        let raw = raw.trim();
        let lower = column.trim().to_lowercase();
        if raw.is_empty() || IGNORED_COLUMNS.contains(&lower.as_str()) {
            continue;
        }
        let change = match lower.as_str() {
            "summary" => {
                (issue.summary() != Some(raw)).then(|| ("summary".to_string(), json!(raw)))
            }
            "priority" => (issue.priority_name() != Some(raw))
                .then(|| ("priority".to_string(), json!({ "name": raw }))),
            "parent" => (issue.parent_key() != Some(raw))
                .then(|| ("parent".to_string(), json!({ "key": raw }))),
            "labels" => {
                let wanted = split_list(raw);
                (current_list(issue, "labels") != wanted)
                    .then(|| ("labels".to_string(), json!(wanted)))
            }
            "components" => {
                let wanted = split_list(raw);
                (current_list(issue, "components") != wanted).then(|| {
                    let names: Vec<Value> = wanted.iter().map(|n| json!({ "name": n })).collect();
                    ("components".to_string(), Value::Array(names))
                })
            }
            "story points" => match raw.parse::<f64>() {
                Ok(n) if !same_number(issue.field(&roles.story_points), n) => {
                    Some((roles.story_points.clone(), json!(n)))
                }
                Ok(_) => None,
                Err(_) => {
                    log::warn!("{}: story points '{raw}' is not a number", issue.key);
                    None
                }
            },
            "original estimate" => {
                let current = issue
                    .field("timetracking")
                    .and_then(|t| t.get("originalEstimate"))
                    .and_then(Value::as_str);
                (current != Some(raw)).then(|| {
                    (
                        "timetracking".to_string(),
                        json!({ "originalEstimate": raw }),
                    )
                })
            }
            "start date" => (issue.field_text(&roles.start_date) != raw)
                .then(|| (roles.start_date.clone(), json!(raw))),
            _ => {
                let id = column.trim();
                let current = issue.field(id);
                (editable.contains(id) && current.map(display_value).as_deref() != Some(raw))
                    .then(|| (id.to_string(), render_like(current, raw)))
            }
        };
        if let Some((id, value)) = change {
            if editable.contains(&id) {
                changes.insert(id, value);
            } else {
                log::debug!("{}: '{id}' is not editable, leaving it", issue.key);
            }
        }
    }
    changes
}

pub async fn update_from_csv(
    tracker: &dyn IssueTracker,
    path: &Path,
    roles: &FieldRoles,
) -> Result<UpdateSummary> {
    let records = read_records(path)?;
    let mut summary = UpdateSummary::default();

    for record in &records {
        let Some(key) = record_key(record) else {
            summary.skipped += 1;
            continue;
        };
        let outcome = async {
            let issue = tracker.get_issue(key).await?;
            let editable = tracker.edit_meta(key).await?;
            let changes = diff_fields(record, &issue, &editable, roles);
            if changes.is_empty() {
                return Ok::<bool, anyhow::Error>(false);
            }
            log::info!(
                "Updating {key}: {}",
                changes.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            tracker.update_fields(key, changes).await?;
            Ok(true)
        }
        .await;
        match outcome {
            Ok(true) => summary.updated += 1,
            Ok(false) => {
                log::debug!("{key}: nothing to update");
                summary.unchanged += 1;
            }
            Err(e) => {
                log::error!("Failed to update {key}: {e}");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tests::{Call, MockTracker};

    fn roles() -> FieldRoles {
        FieldRoles {
            story_points: "customfield_10037".into(),
            start_date: "customfield_10008".into(),
        }
    }

    fn record(pairs: &[(&str, &str)]) -> CsvRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn editable(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn issue() -> RemoteIssue {
        serde_json::from_value(json!({
            "key": "PROJ-1",
            "fields": {
                "summary": "Week12 Planning",
                "priority": { "name": "Medium" },
                "labels": ["calendar"],
                "customfield_10037": 1.5,
                "customfield_10008": "2025-03-17",
                "customfield_10100": { "value": "Blue", "id": "1" },
                "timetracking": { "originalEstimate": "1h 30m" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn unchanged_values_produce_no_update() {
        let rec = record(&[
            ("Created Issue ID", "PROJ-1"),
            ("Summary", "Week12 Planning"),
            ("Priority", "Medium"),
            ("Labels", "calendar"),
            ("Story Points", "1.50"),
            ("Original Estimate", "1h 30m"),
            ("Start Date", "2025-03-17"),
            ("IssueType", "Epic"),
            ("Time spent", "9h"),
        ]);
        let all = editable(&[
            "summary",
            "priority",
            "labels",
            "customfield_10037",
            "customfield_10008",
            "timetracking",
            "issuetype",
        ]);
        assert!(diff_fields(&rec, &issue(), &all, &roles()).is_empty());
    }

    #[test]
    fn only_editable_differences_are_sent() {
        let rec = record(&[
            ("Created Issue ID", "PROJ-1"),
            ("Priority", "High"),
            ("Labels", "calendar, review"),
            ("Story Points", "2"),
            ("Parent", "PROJ-9"),
            ("customfield_10100", "Green"),
        ]);
        let changes = diff_fields(
            &rec,
            &issue(),
            &editable(&["priority", "labels", "customfield_10100"]),
            &roles(),
        );
        assert_eq!(changes.len(), 3);
        assert_eq!(changes["priority"], json!({ "name": "High" }));
        assert_eq!(changes["labels"], json!(["calendar", "review"]));
        assert_eq!(changes["customfield_10100"], json!({ "value": "Green" }));
    }

    #[tokio::test]
    async fn updates_rows_and_counts_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.csv");
        std::fs::write(
            &path,
            "Issue Key,Summary,Priority\nPROJ-1,Renamed,\nPROJ-2,Same,\nPROJ-404,X,\n,No key,\n",
        )
        .unwrap();
        let tracker = MockTracker::new()
            .with_issue("PROJ-1", json!({ "summary": "Old name" }))
            .with_issue("PROJ-2", json!({ "summary": "Same" }))
            .with_editable("PROJ-1", &["summary"])
            .with_editable("PROJ-2", &["summary"]);

        let summary = update_from_csv(&tracker, &path, &roles()).await.unwrap();
        assert_eq!(
            summary,
            UpdateSummary {
                updated: 1,
                unchanged: 1,
                skipped: 1,
                failed: 1,
            }
        );
        let mut expected = Map::new();
        expected.insert("summary".into(), json!("Renamed"));
        assert_eq!(
            tracker.mutating_calls(),
            vec![Call::Update("PROJ-1".into(), expected)]
        );
        assert_eq!(tracker.issue("PROJ-1").unwrap().summary(), Some("Renamed"));
    }
}
