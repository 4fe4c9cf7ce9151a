use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{IssueTracker, NewIssue};
use crate::error::ApiError;
use crate::model::issue::{CreatedIssue, FieldMeta, RemoteIssue, SearchPage};
use crate::model::transition::{AllowedValue, StatusRef, Transition, TransitionField};
use crate::model::work_item::IssueType;

/// Requests the mock received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetIssue(String),
    Create(NewIssue),
    Update(String, Map<String, Value>),
    LogWork(String, String),
    EditMeta(String),
    Transitions(String),
    Transition(String, String, Option<Map<String, Value>>),
    Search(u32),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Call::Create(_) | Call::Update(..) | Call::LogWork(..) | Call::Transition(..)
        )
    }
}

/// In-memory tracker that records every call. Transitions move the stored
/// issue to the target status; a `resolution` field is applied only when
/// `honour_resolution` is set, mimicking workflows that drop it.
pub struct MockTracker {
    issues: Mutex<BTreeMap<String, RemoteIssue>>,
    transitions: Mutex<HashMap<String, Vec<Transition>>>,
    editable: Mutex<HashMap<String, HashSet<String>>>,
    pub field_meta: Vec<FieldMeta>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
    next_id: Mutex<u32>,
    pub honour_resolution: bool,
}

impl MockTracker {
    pub fn new() -> Self {
        Self {
            issues: Mutex::new(BTreeMap::new()),
            transitions: Mutex::new(HashMap::new()),
            editable: Mutex::new(HashMap::new()),
            field_meta: Vec::new(),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            next_id: Mutex::new(1),
            honour_resolution: true,
        }
    }

    pub fn ignoring_resolution(mut self) -> Self {
        self.honour_resolution = false;
        self
    }

    pub fn with_issue(self, key: &str, fields: Value) -> Self {
        let issue: RemoteIssue =
            serde_json::from_value(json!({ "key": key, "fields": fields })).unwrap();
        self.issues.lock().unwrap().insert(key.to_string(), issue);
        self
    }

    pub fn with_status(self, key: &str, status: &str) -> Self {
        self.with_issue(key, json!({ "status": { "name": status }, "resolution": null }))
    }

    pub fn with_transitions(self, key: &str, transitions: Vec<Transition>) -> Self {
        self.transitions
            .lock()
            .unwrap()
            .insert(key.to_string(), transitions);
        self
    }

    pub fn with_editable(self, key: &str, ids: &[&str]) -> Self {
        self.editable
            .lock()
            .unwrap()
            .insert(key.to_string(), ids.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Make every call of `op` ("create", "update", "log_work", "get_issue",
    /// "transition") answer 400.
    pub fn failing(self, op: &'static str) -> Self {
        self.failing.lock().unwrap().insert(op);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn issue(&self, key: &str) -> Option<RemoteIssue> {
        self.issues.lock().unwrap().get(key).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(ApiError::Status {
                status: 400,
                body: format!("mock {op} failure"),
            }
            .into());
        }
        Ok(())
    }

    fn set_field(&self, key: &str, id: &str, value: Value) {
        if let Some(issue) = self.issues.lock().unwrap().get_mut(key) {
            issue.fields.insert(id.to_string(), value);
        }
    }
}

pub fn transition(id: &str, name: &str, to: &str, resolutions: &[&str]) -> Transition {
    let mut fields = BTreeMap::new();
    if !resolutions.is_empty() {
        fields.insert(
            "resolution".to_string(),
            TransitionField {
                required: false,
                name: Some("Resolution".into()),
                allowed_values: resolutions
                    .iter()
                    .map(|r| AllowedValue {
                        name: Some(r.to_string()),
                        value: None,
                    })
                    .collect(),
            },
        );
    }
    Transition {
        id: id.into(),
        name: name.into(),
        to: Some(StatusRef { name: to.into() }),
        fields,
    }
}

#[async_trait]
impl IssueTracker for MockTracker {
    async fn get_issue(&self, key: &str) -> Result<RemoteIssue> {
        self.record(Call::GetIssue(key.to_string()));
        self.check("get_issue")?;
        self.issue(key).ok_or_else(|| {
            ApiError::Status {
                status: 404,
                body: format!("Issue {key} does not exist"),
            }
            .into()
        })
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue> {
        self.record(Call::Create(issue.clone()));
        self.check("create")?;
        let mut next = self.next_id.lock().unwrap();
        let key = format!("{}-{}", issue.project, *next);
        *next += 1;
        let mut fields = json!({
            "summary": issue.summary,
            "issuetype": { "name": issue.issue_type.as_str() },
            "project": { "key": issue.project },
            "status": { "name": "To Do" },
            "resolution": null
        });
        if let Some(parent) = issue.parent() {
            fields["parent"] = json!({ "key": parent });
        }
        let stored: RemoteIssue =
            serde_json::from_value(json!({ "key": key, "fields": fields })).unwrap();
        self.issues.lock().unwrap().insert(key.clone(), stored);
        Ok(CreatedIssue { key })
    }

    async fn update_fields(&self, key: &str, fields: Map<String, Value>) -> Result<()> {
        self.record(Call::Update(key.to_string(), fields.clone()));
        self.check("update")?;
        for (id, value) in fields {
            if id == "resolution" && !self.honour_resolution {
                continue;
            }
            self.set_field(key, &id, value);
        }
        Ok(())
    }

    async fn log_work(&self, key: &str, time_spent: &str, _comment: Option<&str>) -> Result<()> {
        self.record(Call::LogWork(key.to_string(), time_spent.to_string()));
        self.check("log_work")
    }

    async fn edit_meta(&self, key: &str) -> Result<HashSet<String>> {
        self.record(Call::EditMeta(key.to_string()));
        Ok(self
            .editable
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_fields(&self) -> Result<Vec<FieldMeta>> {
        Ok(self.field_meta.clone())
    }

    async fn transitions(&self, key: &str) -> Result<Vec<Transition>> {
        self.record(Call::Transitions(key.to_string()));
        Ok(self
            .transitions
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_transition(
        &self,
        key: &str,
        transition_id: &str,
        fields: Option<Map<String, Value>>,
    ) -> Result<()> {
        self.record(Call::Transition(
            key.to_string(),
            transition_id.to_string(),
            fields.clone(),
        ));
        self.check("transition")?;
        let target = self
            .transitions
            .lock()
            .unwrap()
            .get(key)
            .and_then(|ts| ts.iter().find(|t| t.id == transition_id).cloned());
        if let Some(t) = target {
            self.set_field(key, "status", json!({ "name": t.to_status() }));
        }
        if let Some(resolution) = fields.and_then(|mut f| f.remove("resolution")) {
            if self.honour_resolution {
                self.set_field(key, "resolution", resolution);
            }
        }
        Ok(())
    }

    async fn search(&self, _jql: &str, start_at: u32, max_results: u32) -> Result<SearchPage> {
        self.record(Call::Search(start_at));
        let issues = self.issues.lock().unwrap();
        let page: Vec<RemoteIssue> = issues
            .values()
            .skip(start_at as usize)
            .take(max_results as usize)
            .cloned()
            .collect();
        Ok(SearchPage {
            total: issues.len() as u32,
            issues: page,
        })
    }
}

#[test]
fn subtask_constructor_is_the_only_parent_path() {
    let top = NewIssue::top_level("PROJ", "Epic work", IssueType::Epic);
    assert_eq!(top.parent(), None);
    let sub = NewIssue::subtask("PROJ", "Child", " PROJ-1 ");
    assert_eq!(sub.parent(), Some("PROJ-1"));
    assert_eq!(sub.issue_type, IssueType::SubTask);
}

#[tokio::test]
async fn mock_assigns_sequential_keys() {
    let tracker = MockTracker::new();
    let a = tracker
        .create_issue(&NewIssue::top_level("PROJ", "A", IssueType::Story))
        .await
        .unwrap();
    let b = tracker
        .create_issue(&NewIssue::top_level("PROJ", "B", IssueType::Story))
        .await
        .unwrap();
    assert_eq!(a.key, "PROJ-1");
    assert_eq!(b.key, "PROJ-2");
    assert_eq!(tracker.issue("PROJ-2").unwrap().summary(), Some("B"));
}

#[tokio::test]
async fn mock_failure_is_api_error() {
    let tracker = MockTracker::new().with_status("PROJ-1", "To Do").failing("update");
    let err = tracker
        .update_fields("PROJ-1", Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.downcast_ref::<ApiError>().unwrap().status(), 400);
    assert_eq!(tracker.mutating_calls().len(), 1);
}

#[tokio::test]
async fn mock_transition_moves_status() {
    let tracker = MockTracker::new()
        .with_status("PROJ-1", "To Do")
        .with_transitions("PROJ-1", vec![transition("31", "Done", "Done", &[])]);
    tracker
        .execute_transition("PROJ-1", "31", None)
        .await
        .unwrap();
    assert_eq!(tracker.issue("PROJ-1").unwrap().status_name(), Some("Done"));
}
