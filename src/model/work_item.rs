use serde::{Deserialize, Serialize};
use std::fmt;

/// Column order of the work-item CSV, the import source and the ledger.
pub const HEADER: [&str; 10] = [
    "Project",
    "Summary",
    "IssueType",
    "Parent",
    "Start Date",
    "Story Points",
    "Original Estimate",
    "Time spent",
    "Priority",
    "Created Issue ID",
];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IssueType {
    Epic,
    #[default]
    Story,
    Task,
    SubTask,
    /// Any other type the remote project defines (Bug, Spike, ...).
    Other(String),
}

impl IssueType {
    pub const CHOICES: [IssueType; 4] = [
        IssueType::Epic,
        IssueType::Story,
        IssueType::Task,
        IssueType::SubTask,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            IssueType::Epic => "Epic",
            IssueType::Story => "Story",
            IssueType::Task => "Task",
            IssueType::SubTask => "Sub-task",
            IssueType::Other(name) => name,
        }
    }

    pub fn is_subtask(&self) -> bool {
        matches!(self, IssueType::SubTask)
    }

    /// Types that may carry a parent reference when rows are prepared.
    pub fn takes_parent(&self) -> bool {
        matches!(self, IssueType::Story | IssueType::SubTask)
    }
}

impl From<String> for IssueType {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_lowercase().as_str() {
            "" | "story" => IssueType::Story,
            "epic" => IssueType::Epic,
            "task" => IssueType::Task,
            "sub-task" | "subtask" | "sub task" => IssueType::SubTask,
            _ => IssueType::Other(trimmed.to_string()),
        }
    }
}

impl From<&str> for IssueType {
    fn from(raw: &str) -> Self {
        IssueType::from(raw.to_string())
    }
}

impl From<IssueType> for String {
    fn from(t: IssueType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the work-item CSV. Missing columns deserialize empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkItemRow {
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Summary")]
    pub summary: String,
    #[serde(rename = "IssueType")]
    pub issue_type: IssueType,
    #[serde(rename = "Parent")]
    pub parent: String,
    #[serde(rename = "Start Date")]
    pub start_date: String,
    #[serde(rename = "Story Points")]
    pub story_points: String,
    #[serde(rename = "Original Estimate")]
    pub original_estimate: String,
    #[serde(rename = "Time spent")]
    pub time_spent: String,
    #[serde(rename = "Priority")]
    pub priority: String,
    #[serde(rename = "Created Issue ID")]
    pub created_issue_id: String,
}

impl WorkItemRow {
    pub fn is_processed(&self) -> bool {
        !self.created_issue_id.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_type_parses_loosely() {
        assert_eq!(IssueType::from("sub-task"), IssueType::SubTask);
        assert_eq!(IssueType::from(" Subtask "), IssueType::SubTask);
        assert_eq!(IssueType::from("EPIC"), IssueType::Epic);
        assert_eq!(IssueType::from(""), IssueType::Story);
        assert_eq!(IssueType::from("Bug"), IssueType::Other("Bug".into()));
        assert_eq!(IssueType::SubTask.to_string(), "Sub-task");
    }

    #[test]
    fn reads_rows_with_missing_columns() {
        let data = "Project,Summary,IssueType\nPROJ,Write docs,Task\n";
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<WorkItemRow> = rdr.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].issue_type, IssueType::Task);
        assert_eq!(rows[0].created_issue_id, "");
        assert!(!rows[0].is_processed());
    }

    #[test]
    fn writes_canonical_header() {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.serialize(WorkItemRow {
            project: "PROJ".into(),
            summary: "Standup".into(),
            ..Default::default()
        })
        .unwrap();
        let out = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let header = out.lines().next().unwrap();
        assert_eq!(header, HEADER.join(","));
        assert!(out.contains("PROJ,Standup,Story"));
    }
}
