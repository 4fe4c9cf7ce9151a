use serde::Deserialize;
use serde_json::{Map, Value};

use crate::util::adf;

/// Resolution name reported when an issue has no resolution set.
pub const UNRESOLVED: &str = "Unresolved";

/// An issue as returned by the tracker. Only the key is typed; fields are
/// read on demand from the raw map.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteIssue {
    pub key: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RemoteIssue {
    fn nested_str(&self, field: &str, attr: &str) -> Option<&str> {
        self.fields.get(field)?.get(attr)?.as_str()
    }

    pub fn summary(&self) -> Option<&str> {
        self.fields.get("summary")?.as_str()
    }

    pub fn status_name(&self) -> Option<&str> {
        self.nested_str("status", "name")
    }

    pub fn resolution_name(&self) -> &str {
        self.nested_str("resolution", "name").unwrap_or(UNRESOLVED)
    }

    pub fn is_unresolved(&self) -> bool {
        self.resolution_name().eq_ignore_ascii_case(UNRESOLVED)
    }

    pub fn issue_type(&self) -> Option<&str> {
        self.nested_str("issuetype", "name")
    }

    pub fn project_key(&self) -> Option<&str> {
        self.nested_str("project", "key")
    }

    pub fn parent_key(&self) -> Option<&str> {
        self.nested_str("parent", "key")
    }

    pub fn priority_name(&self) -> Option<&str> {
        self.nested_str("priority", "name")
    }

    pub fn field(&self, id: &str) -> Option<&Value> {
        self.fields.get(id).filter(|v| !v.is_null())
    }

    /// Field rendered as a single CSV cell; empty when absent.
    pub fn field_text(&self, id: &str) -> String {
        self.field(id).map(display_value).unwrap_or_default()
    }
}

/// Flatten a field value: objects by `name`, `key`, `value` or `summary`,
/// arrays joined with `, `, rich text to plain text.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(obj) => {
            if adf::is_adf_document(value) {
                return adf::extract_text_from_adf(value).unwrap_or_default();
            }
            ["name", "key", "value", "summary"]
                .iter()
                .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
                .map(display_value)
                .unwrap_or_else(|| value.to_string())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub issues: Vec<RemoteIssue>,
}

/// Entry of `GET /rest/api/3/field`.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(fields: Value) -> RemoteIssue {
        serde_json::from_value(json!({ "key": "PROJ-1", "fields": fields })).unwrap()
    }

    #[test]
    fn reads_nested_names() {
        let issue = issue(json!({
            "summary": "Week12 Planning",
            "status": { "name": "In Progress" },
            "issuetype": { "name": "Story" },
            "project": { "key": "PROJ" },
            "resolution": null
        }));
        assert_eq!(issue.summary(), Some("Week12 Planning"));
        assert_eq!(issue.status_name(), Some("In Progress"));
        assert_eq!(issue.issue_type(), Some("Story"));
        assert_eq!(issue.project_key(), Some("PROJ"));
        assert_eq!(issue.parent_key(), None);
        assert_eq!(issue.resolution_name(), UNRESOLVED);
        assert!(issue.is_unresolved());
        assert!(issue.field("resolution").is_none());
    }

    #[test]
    fn flattens_values_for_csv() {
        assert_eq!(display_value(&json!({ "name": "High", "id": "2" })), "High");
        assert_eq!(display_value(&json!({ "key": "PROJ-4" })), "PROJ-4");
        assert_eq!(
            display_value(&json!([{ "name": "api" }, { "name": "ui" }])),
            "api, ui"
        );
        assert_eq!(display_value(&json!(["a", "b"])), "a, b");
        assert_eq!(display_value(&json!(2.5)), "2.5");
        assert_eq!(display_value(&Value::Null), "");
        let doc = crate::util::adf::paragraph("notes here");
        assert_eq!(display_value(&doc), "notes here");
        assert_eq!(display_value(&json!({ "x": 1 })), r#"{"x":1}"#);
    }

    #[test]
    fn resolved_issue_reports_name() {
        let issue = issue(json!({ "resolution": { "name": "Done" } }));
        assert_eq!(issue.resolution_name(), "Done");
        assert!(!issue.is_unresolved());
    }
}
