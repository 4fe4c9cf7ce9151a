pub mod jira;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::config::Assignee;
use crate::model::issue::{CreatedIssue, FieldMeta, RemoteIssue, SearchPage};
use crate::model::transition::Transition;
use crate::model::work_item::IssueType;

/// Everything needed to create one issue. Build with [`NewIssue::top_level`]
/// or [`NewIssue::subtask`]; the latter is the only way to set a parent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIssue {
    pub project: String,
    pub summary: String,
    pub issue_type: IssueType,
    parent: Option<String>,
    pub assignee: Option<Assignee>,
    /// Merged over the configured `FIELD_<NAME>` defaults.
    pub fields: Map<String, Value>,
}

impl NewIssue {
    pub fn top_level(project: &str, summary: &str, issue_type: IssueType) -> Self {
        Self {
            project: project.trim().to_string(),
            summary: summary.trim().to_string(),
            issue_type,
            parent: None,
            assignee: None,
            fields: Map::new(),
        }
    }

    pub fn subtask(project: &str, summary: &str, parent_key: &str) -> Self {
        Self {
            parent: Some(parent_key.trim().to_string()),
            ..Self::top_level(project, summary, IssueType::SubTask)
        }
    }

    pub fn with_assignee(mut self, assignee: Option<Assignee>) -> Self {
        self.assignee = assignee;
        self
    }

    pub fn with_field(mut self, id: &str, value: Value) -> Self {
        self.fields.insert(id.to_string(), value);
        self
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }
}

/// The subset of the issue tracker's REST API this toolkit drives. Every
/// call is a fresh request; nothing is cached.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn get_issue(&self, key: &str) -> Result<RemoteIssue>;
    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue>;
    async fn update_fields(&self, key: &str, fields: Map<String, Value>) -> Result<()>;
    async fn log_work(&self, key: &str, time_spent: &str, comment: Option<&str>) -> Result<()>;
    /// Ids of the fields currently settable on the issue.
    async fn edit_meta(&self, key: &str) -> Result<HashSet<String>>;
    async fn list_fields(&self) -> Result<Vec<FieldMeta>>;
    /// Transitions available from the issue's current status, with field
    /// metadata expanded.
    async fn transitions(&self, key: &str) -> Result<Vec<Transition>>;
    async fn execute_transition(
        &self,
        key: &str,
        transition_id: &str,
        fields: Option<Map<String, Value>>,
    ) -> Result<()>;
    async fn search(&self, jql: &str, start_at: u32, max_results: u32) -> Result<SearchPage>;
}

#[cfg(test)]
pub mod tests;
