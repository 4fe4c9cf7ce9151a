use serde::Deserialize;
use std::collections::BTreeMap;

use super::issue::UNRESOLVED;

#[derive(Debug, Clone, Deserialize)]
pub struct StatusRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllowedValue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl AllowedValue {
    pub fn label(&self) -> Option<&str> {
        self.name.as_deref().or(self.value.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionField {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub allowed_values: Vec<AllowedValue>,
}

/// A workflow edge available from an issue's current status, as listed by
/// `GET .../transitions?expand=transitions.fields`.
#[derive(Debug, Clone, Deserialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub to: Option<StatusRef>,
    #[serde(default)]
    pub fields: BTreeMap<String, TransitionField>,
}

impl Transition {
    pub fn to_status(&self) -> &str {
        self.to.as_ref().map(|s| s.name.as_str()).unwrap_or("Unknown")
    }

    pub fn resolution_field(&self) -> Option<&TransitionField> {
        self.fields.get("resolution")
    }

    /// Resolution names this transition offers, `Unresolved` included.
    pub fn resolution_options(&self) -> Vec<&str> {
        self.resolution_field()
            .map(|f| f.allowed_values.iter().filter_map(AllowedValue::label).collect())
            .unwrap_or_default()
    }

    /// Fields the transition screen insists on, by display name.
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.required)
            .map(|(id, f)| f.name.as_deref().unwrap_or(id))
            .collect()
    }

    pub fn settable_resolutions(&self) -> Vec<&str> {
        self.resolution_options()
            .into_iter()
            .filter(|r| !r.eq_ignore_ascii_case(UNRESOLVED))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionList {
    #[serde(default)]
    pub transitions: Vec<Transition>,
}
