use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::field_map::FieldMap;
use serde_json::{Map, Value};

/// Environment variable naming an explicit settings file.
pub const SETTINGS_ENV: &str = "JIRA_CSV_ENV";

#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

/// Who new issues are assigned to. Cloud instances want an account id; the
/// name form is kept for server installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignee {
    AccountId(String),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jira: JiraConfig,
    pub project_id: Option<String>,
    pub assignee: Option<Assignee>,
    pub output_dir: PathBuf,
    pub field_map: FieldMap,
    /// Rendered `FIELD_<NAME>` defaults merged into every create payload.
    pub field_defaults: Map<String, Value>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| strip_quotes(v).to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let base_url = require("JIRA_URL")?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "JIRA_URL".into(),
                reason: format!("'{base_url}' is not an http(s) URL"),
            }
            .into());
        }
        let jira = JiraConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            email: require("JIRA_EMAIL")?,
            api_token: require("JIRA_TOKEN")?,
        };

        let assignee = get("JIRA_ASSIGNEE_ACCOUNTID")
            .map(Assignee::AccountId)
            .or_else(|| get("JIRA_ASSIGNEE").map(Assignee::Name));

        let field_map = match get("JIRA_FIELD_MAP") {
            Some(path) => FieldMap::load(Path::new(&path))?,
            None => FieldMap::default(),
        };

        let mut defaults: Vec<(&String, &String)> = vars
            .iter()
            .filter(|(k, _)| k.starts_with("FIELD_"))
            .collect();
        defaults.sort();
        let field_defaults = field_map.render_defaults(
            defaults
                .into_iter()
                .map(|(k, v)| (k.as_str(), strip_quotes(v))),
        );

        Ok(Self {
            jira,
            project_id: get("JIRA_PROJECT_ID"),
            assignee,
            output_dir: get("JIRA_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            field_map,
            field_defaults,
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.output_dir.join("tracker.csv")
    }

    pub fn prepared_csv_path(&self) -> PathBuf {
        self.output_file("output.csv")
    }

    pub fn output_file(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

fn strip_quotes(v: &str) -> &str {
    v.trim().trim_matches('"').trim_matches('\'')
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".jira-csv")
}

/// Settings file candidates, most specific first.
fn settings_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(explicit) = std::env::var(SETTINGS_ENV) {
        paths.push(PathBuf::from(explicit));
    }
    paths.push(PathBuf::from(".env"));
    paths.push(data_dir().join(".env"));
    paths
}

/// Load the first settings file found into the process environment.
/// Variables already set in the environment win.
pub fn load_settings_file() -> Result<Option<PathBuf>> {
    for path in settings_candidates() {
        if path.is_file() {
            dotenvy::from_path(&path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?;
            return Ok(Some(path));
        }
    }
    Ok(None)
}
