use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Version of the built-in mapping table. Bump when a built-in id changes.
pub const FIELD_MAP_VERSION: u32 = 1;

const DEFAULT_STORY_POINTS: &str = "customfield_10037";
const DEFAULT_START_DATE: &str = "customfield_10008";

/// How a raw `FIELD_<NAME>` string is shaped into a Jira field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Single select list: `{"value": "..."}`
    Option,
    Text,
    Number,
    /// Comma separated list of plain strings
    Labels,
    /// Comma separated list of `{"name": "..."}` objects
    Components,
}

impl ValueKind {
    pub fn render(self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self {
            ValueKind::Option => Some(json!({ "value": raw })),
            ValueKind::Text => Some(Value::String(raw.to_string())),
            ValueKind::Number => raw.parse::<f64>().ok().map(|n| json!(n)),
            ValueKind::Labels => Some(Value::Array(
                split_list(raw).map(|s| Value::String(s.to_string())).collect(),
            )),
            ValueKind::Components => Some(Value::Array(
                split_list(raw).map(|s| json!({ "name": s })).collect(),
            )),
        }
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DefaultField {
    pub id: String,
    pub kind: ValueKind,
}

/// Remote field ids for the columns the importer writes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRoles {
    pub story_points: String,
    pub start_date: String,
}

/// Explicit field role -> remote field id table, plus the registry of
/// `FIELD_<NAME>` creation defaults.
#[derive(Debug, Clone)]
pub struct FieldMap {
    pub version: u32,
    pub roles: FieldRoles,
    defaults: BTreeMap<String, DefaultField>,
}

#[derive(Debug, Deserialize, Default)]
struct FieldMapFile {
    version: Option<u32>,
    #[serde(default)]
    roles: RolesFile,
    #[serde(default)]
    defaults: BTreeMap<String, DefaultField>,
}

#[derive(Debug, Deserialize, Default)]
struct RolesFile {
    story_points: Option<String>,
    start_date: Option<String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert(
            "LABELS".to_string(),
            DefaultField {
                id: "labels".into(),
                kind: ValueKind::Labels,
            },
        );
        defaults.insert(
            "COMPONENTS".to_string(),
            DefaultField {
                id: "components".into(),
                kind: ValueKind::Components,
            },
        );
        Self {
            version: FIELD_MAP_VERSION,
            roles: FieldRoles {
                story_points: DEFAULT_STORY_POINTS.into(),
                start_date: DEFAULT_START_DATE.into(),
            },
            defaults,
        }
    }
}

impl FieldMap {
    /// Merge a TOML override over the built-in table.
    pub fn with_overrides(mut self, toml_src: &str) -> Result<Self> {
        let file: FieldMapFile =
            toml::from_str(toml_src).context("Failed to parse field map")?;
        if let Some(version) = file.version {
            self.version = version;
        }
        if let Some(id) = file.roles.story_points {
            self.roles.story_points = id;
        }
        if let Some(id) = file.roles.start_date {
            self.roles.start_date = id;
        }
        for (name, field) in file.defaults {
            self.defaults.insert(name.to_uppercase(), field);
        }
        Ok(self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read field map from {}", path.display()))?;
        Self::default().with_overrides(&contents)
    }

    /// Registered `FIELD_<NAME>` descriptors, by name.
    pub fn registered(&self) -> impl Iterator<Item = (&str, &DefaultField)> {
        self.defaults.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Look up the descriptor for `FIELD_<name>`. Unregistered names of the
    /// form `CUSTOMFIELD_NNNNN` address that field id directly as a select list.
    pub fn default_field(&self, name: &str) -> Option<DefaultField> {
        let name = name.to_uppercase();
        if let Some(field) = self.defaults.get(&name) {
            return Some(field.clone());
        }
        let suffix = name.strip_prefix("CUSTOMFIELD_")?;
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(DefaultField {
            id: format!("customfield_{suffix}"),
            kind: ValueKind::Option,
        })
    }

    /// Turn `FIELD_<NAME>=value` pairs into a creation field map. Unknown
    /// names and unparseable values are logged and skipped.
    pub fn render_defaults<I, K, V>(&self, vars: I) -> Map<String, Value>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut out = Map::new();
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix("FIELD_") else {
                continue;
            };
            let Some(field) = self.default_field(name) else {
                log::warn!("No field mapping for FIELD_{name}; ignoring default");
                continue;
            };
            match field.kind.render(value.as_ref()) {
                Some(v) => {
                    out.insert(field.id, v);
                }
                None => log::warn!("Ignoring empty or invalid default for FIELD_{name}"),
            }
        }
        out
    }
}
