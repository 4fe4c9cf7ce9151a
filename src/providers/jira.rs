use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

use super::{IssueTracker, NewIssue};
use crate::config::{AppConfig, Assignee, JiraConfig};
use crate::error::ApiError;
use crate::model::issue::{CreatedIssue, FieldMeta, RemoteIssue, SearchPage};
use crate::model::transition::{Transition, TransitionList};
use crate::util::adf;

pub struct JiraClient {
    base_url: String,
    auth_header: String,
    client: reqwest::Client,
    field_defaults: Map<String, Value>,
}

impl JiraClient {
    pub fn new(jira: &JiraConfig, field_defaults: Map<String, Value>) -> Self {
        let creds = format!("{}:{}", jira.email, jira.api_token);
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        Self {
            base_url: jira.base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {encoded}"),
            client: reqwest::Client::new(),
            field_defaults,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jira, config.field_defaults.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn issue_url(&self, key: &str, suffix: &str) -> String {
        format!(
            "{}/rest/api/3/issue/{}{suffix}",
            self.base_url,
            urlencoding::encode(key.trim())
        )
    }

    /// Attach auth headers, send, and turn any non-2xx into [`ApiError`].
    async fn send(&self, req: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let resp = req
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Jira request failed: {what}"))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        log::error!("{what}: Jira API error: {} {body}", status.as_u16());
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        }
        .into())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let resp = self.send(self.client.get(url), what).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse Jira response: {what}"))
    }
}

/// Create payload: configured defaults first, then the issue's own fields,
/// then the identity fields which nothing may override.
pub fn build_create_payload(issue: &NewIssue, defaults: &Map<String, Value>) -> Value {
    let mut fields = defaults.clone();
    for (k, v) in &issue.fields {
        fields.insert(k.clone(), v.clone());
    }
    fields.insert("project".into(), json!({ "key": issue.project }));
    fields.insert("summary".into(), json!(issue.summary));
    fields.insert("issuetype".into(), json!({ "name": issue.issue_type.as_str() }));
    if let Some(parent) = issue.parent() {
        fields.insert("parent".into(), json!({ "key": parent }));
    }
    if let Some(assignee) = &issue.assignee {
        fields.insert("assignee".into(), assignee_value(assignee));
    }
    json!({ "fields": fields })
}

pub fn assignee_value(assignee: &Assignee) -> Value {
    match assignee {
        Assignee::AccountId(id) => json!({ "id": id }),
        Assignee::Name(name) => json!({ "name": name }),
    }
}

#[derive(Deserialize)]
struct EditMetaResponse {
    #[serde(default)]
    fields: Map<String, Value>,
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn get_issue(&self, key: &str) -> Result<RemoteIssue> {
        log::debug!("Fetching issue {key}");
        self.get_json(&self.issue_url(key, ""), &format!("get issue {key}"))
            .await
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue> {
        let url = format!("{}/rest/api/3/issue", self.base_url);
        let payload = build_create_payload(issue, &self.field_defaults);
        log::info!(
            "Creating {} in project {} with summary '{}'",
            issue.issue_type,
            issue.project,
            issue.summary
        );
        log::debug!("Payload for issue creation: {payload}");
        let resp = self
            .send(self.client.post(&url).json(&payload), "create issue")
            .await?;
        let created: CreatedIssue = resp
            .json()
            .await
            .context("Failed to parse create issue response")?;
        log::info!("Created issue {}", created.key);
        Ok(created)
    }

    async fn update_fields(&self, key: &str, fields: Map<String, Value>) -> Result<()> {
        let payload = json!({ "fields": fields });
        log::debug!("Payload for update of {key}: {payload}");
        self.send(
            self.client.put(self.issue_url(key, "")).json(&payload),
            &format!("update {key}"),
        )
        .await?;
        Ok(())
    }

    async fn log_work(&self, key: &str, time_spent: &str, comment: Option<&str>) -> Result<()> {
        let mut body = json!({ "timeSpent": time_spent });
        if let Some(comment) = comment {
            body["comment"] = adf::paragraph(comment);
        }
        log::info!("Logging work for {key}: {time_spent}");
        self.send(
            self.client.post(self.issue_url(key, "/worklog")).json(&body),
            &format!("log work on {key}"),
        )
        .await?;
        Ok(())
    }

    async fn edit_meta(&self, key: &str) -> Result<HashSet<String>> {
        let meta: EditMetaResponse = self
            .get_json(&self.issue_url(key, "/editmeta"), &format!("editmeta {key}"))
            .await?;
        Ok(meta.fields.into_iter().map(|(id, _)| id).collect())
    }

    async fn list_fields(&self) -> Result<Vec<FieldMeta>> {
        let url = format!("{}/rest/api/3/field", self.base_url);
        self.get_json(&url, "list fields").await
    }

    async fn transitions(&self, key: &str) -> Result<Vec<Transition>> {
        let url = self.issue_url(key, "/transitions?expand=transitions.fields");
        let list: TransitionList = self
            .get_json(&url, &format!("transitions for {key}"))
            .await?;
        Ok(list.transitions)
    }

    async fn execute_transition(
        &self,
        key: &str,
        transition_id: &str,
        fields: Option<Map<String, Value>>,
    ) -> Result<()> {
        let mut body = json!({ "transition": { "id": transition_id } });
        if let Some(fields) = fields {
            body["fields"] = Value::Object(fields);
        }
        log::debug!("Payload for transition of {key}: {body}");
        self.send(
            self.client
                .post(self.issue_url(key, "/transitions"))
                .json(&body),
            &format!("transition {key}"),
        )
        .await?;
        Ok(())
    }

    async fn search(&self, jql: &str, start_at: u32, max_results: u32) -> Result<SearchPage> {
        let url = format!(
            "{}/rest/api/3/search?jql={}&startAt={start_at}&maxResults={max_results}&expand=names",
            self.base_url,
            urlencoding::encode(jql)
        );
        self.get_json(&url, "search").await
    }
}
