//! Workflow transitions with resolution inference.
//!
//! All state lives in the remote workflow: every operation starts by
//! fetching the transitions available to the issue right now. Setting a
//! resolution depends on how the remote workflow is configured, so the
//! contract here is best effort with an explicit report when the issue ends
//! up closed but `Unresolved`.

use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::model::transition::Transition;
use crate::providers::IssueTracker;

/// Target name that means "whichever closing transition this issue has".
pub const CLOSE_BY_TYPE: &str = "close_by_type";

/// Closing transition names, in preference order.
pub const CLOSING_KEYWORDS: [&str; 5] = ["Done", "Closed", "Resolve", "Complete", "Finished"];

/// Resolution names, in preference order.
pub const RESOLUTION_PRIORITY: [&str; 4] = ["Done", "Completed", "Fixed", "Resolved"];

/// Status names treated as already closed.
pub const CLOSED_STATUSES: [&str; 5] = ["done", "closed", "complete", "resolved", "finished"];

/// Names that stand in for one another when the requested transition does
/// not exist. Each group is tried in order.
const ALIAS_GROUPS: &[&[&str]] = &[
    &["done", "closed", "complete", "resolve", "finished"],
    &["in progress", "start progress", "start"],
    &["to do", "open", "reopen", "backlog"],
];

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Transitioned {
        transition: String,
        to_status: String,
        resolution: Option<String>,
        /// Closing transition succeeded but the issue is still `Unresolved`.
        resolution_warning: bool,
    },
    /// Nothing matched; the remote issue was not touched.
    NotAvailable {
        requested: String,
        available: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    AlreadyResolved { resolution: String },
    /// Issue was closed already; its resolution field was written directly.
    ResolutionUpdated { resolved: bool },
    TransitionedWithResolution {
        transition: String,
        resolution: Option<String>,
        resolved: bool,
    },
    /// No resolution-capable closing transition: bare transition plus a
    /// direct resolution update that the workflow may reject.
    BareTransition { transition: String, resolved: bool },
    NotAvailable { available: Vec<String> },
}

impl CloseOutcome {
    pub fn is_resolved(&self) -> bool {
        match self {
            CloseOutcome::AlreadyResolved { .. } => true,
            CloseOutcome::ResolutionUpdated { resolved }
            | CloseOutcome::TransitionedWithResolution { resolved, .. }
            | CloseOutcome::BareTransition { resolved, .. } => *resolved,
            CloseOutcome::NotAvailable { .. } => false,
        }
    }
}

pub fn is_closing(name: &str) -> bool {
    closing_rank(name).is_some()
}

fn closing_rank(name: &str) -> Option<usize> {
    let lower = name.to_lowercase();
    CLOSING_KEYWORDS
        .iter()
        .position(|k| lower.contains(&k.to_lowercase()))
}

pub fn is_closed_status(status: &str) -> bool {
    CLOSED_STATUSES.contains(&status.trim().to_lowercase().as_str())
}

fn find_named<'a>(available: &'a [Transition], name: &str) -> Option<&'a Transition> {
    available.iter().find(|t| t.name.eq_ignore_ascii_case(name.trim()))
}

/// Map a requested name onto one of the available transitions.
pub fn resolve_target<'a>(available: &'a [Transition], target: &str) -> Option<&'a Transition> {
    if target.eq_ignore_ascii_case(CLOSE_BY_TYPE) {
        return CLOSING_KEYWORDS
            .iter()
            .find_map(|k| find_named(available, k));
    }
    if let Some(t) = find_named(available, target) {
        return Some(t);
    }
    let wanted = target.trim().to_lowercase();
    ALIAS_GROUPS
        .iter()
        .find(|group| group.contains(&wanted.as_str()))
        .and_then(|group| group.iter().find_map(|alias| find_named(available, alias)))
}

/// Pick a resolution from the offered names: the priority list first, then
/// anything that is not `Unresolved`.
pub fn select_resolution<'a>(options: &[&'a str]) -> Option<&'a str> {
    RESOLUTION_PRIORITY
        .iter()
        .find_map(|wanted| options.iter().find(|o| o.eq_ignore_ascii_case(wanted)))
        .or_else(|| {
            options
                .iter()
                .find(|o| !o.eq_ignore_ascii_case(crate::model::issue::UNRESOLVED))
        })
        .copied()
}

fn resolution_fields(name: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("resolution".into(), json!({ "name": name }));
    fields
}

/// Re-read the issue after closing. `None` when the re-fetch itself failed.
async fn check_resolved(tracker: &dyn IssueTracker, key: &str) -> Option<bool> {
    match tracker.get_issue(key).await {
        Ok(issue) => Some(!issue.is_unresolved()),
        Err(e) => {
            log::warn!("Could not re-fetch {key} to verify resolution: {e}");
            None
        }
    }
}

pub async fn transition_issue(
    tracker: &dyn IssueTracker,
    key: &str,
    target: &str,
) -> Result<TransitionOutcome> {
    let available = tracker.transitions(key).await?;
    let Some(chosen) = resolve_target(&available, target) else {
        let names: Vec<String> = available.iter().map(|t| t.name.clone()).collect();
        log::warn!(
            "Transition '{target}' not available for {key}. Available: {}",
            names.join(", ")
        );
        return Ok(TransitionOutcome::NotAvailable {
            requested: target.to_string(),
            available: names,
        });
    };

    let closing = is_closing(&chosen.name);
    let resolution = if closing {
        select_resolution(&chosen.resolution_options()).map(String::from)
    } else {
        None
    };
    if closing && chosen.resolution_field().is_some() && resolution.is_none() {
        log::warn!("{key}: '{}' offers no usable resolution value", chosen.name);
    }

    log::info!(
        "Transitioning {key} via '{}' to {}{}",
        chosen.name,
        chosen.to_status(),
        resolution
            .as_deref()
            .map(|r| format!(" with resolution {r}"))
            .unwrap_or_default()
    );
    tracker
        .execute_transition(key, &chosen.id, resolution.as_deref().map(resolution_fields))
        .await?;

    let mut resolution_warning = false;
    if closing && check_resolved(tracker, key).await == Some(false) {
        resolution_warning = true;
        if resolution.is_some() {
            log::warn!(
                "{key} closed via '{}': workflow ignored the resolution, still Unresolved",
                chosen.name
            );
        } else {
            log::warn!(
                "{key} closed via '{}' but is Unresolved; the transition has no resolution field",
                chosen.name
            );
        }
    }

    Ok(TransitionOutcome::Transitioned {
        transition: chosen.name.clone(),
        to_status: chosen.to_status().to_string(),
        resolution,
        resolution_warning,
    })
}

/// The closing transition that also exposes a resolution field, preferring
/// the closing keyword order.
pub async fn find_closing_transition_with_resolution(
    tracker: &dyn IssueTracker,
    key: &str,
) -> Result<Option<Transition>> {
    let available = tracker.transitions(key).await?;
    Ok(pick_closing_with_resolution(&available).cloned())
}

fn pick_closing_with_resolution(available: &[Transition]) -> Option<&Transition> {
    available
        .iter()
        .filter(|t| t.resolution_field().is_some())
        .filter_map(|t| closing_rank(&t.name).map(|rank| (rank, t)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, t)| t)
}

/// Write the resolution field directly.
pub async fn set_resolution(tracker: &dyn IssueTracker, key: &str, name: &str) -> Result<()> {
    log::info!("Setting resolution of {key} to {name}");
    tracker.update_fields(key, resolution_fields(name)).await
}

pub async fn transition_to_done_with_resolution(
    tracker: &dyn IssueTracker,
    key: &str,
    preferred_resolution: &str,
) -> Result<CloseOutcome> {
    let issue = tracker.get_issue(key).await?;
    let status = issue.status_name().unwrap_or_default().to_string();

    if is_closed_status(&status) {
        if !issue.is_unresolved() {
            return Ok(CloseOutcome::AlreadyResolved {
                resolution: issue.resolution_name().to_string(),
            });
        }
        set_resolution(tracker, key, preferred_resolution).await?;
        let resolved = check_resolved(tracker, key).await.unwrap_or(false);
        if !resolved {
            log::warn!("{key} is {status} but still Unresolved after a direct update");
        }
        return Ok(CloseOutcome::ResolutionUpdated { resolved });
    }

    if let Some(chosen) = find_closing_transition_with_resolution(tracker, key).await? {
        let options = chosen.resolution_options();
        let resolution = options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(preferred_resolution))
            .copied()
            .or_else(|| select_resolution(&options))
            .map(String::from);
        log::info!(
            "Closing {key} via '{}' with resolution {}",
            chosen.name,
            resolution.as_deref().unwrap_or("none")
        );
        tracker
            .execute_transition(key, &chosen.id, resolution.as_deref().map(resolution_fields))
            .await?;
        let resolved = check_resolved(tracker, key).await.unwrap_or(false);
        if !resolved {
            log::warn!("{key} closed via '{}' but still Unresolved", chosen.name);
        }
        return Ok(CloseOutcome::TransitionedWithResolution {
            transition: chosen.name,
            resolution,
            resolved,
        });
    }

    match transition_issue(tracker, key, CLOSE_BY_TYPE).await? {
        TransitionOutcome::NotAvailable { available, .. } => {
            Ok(CloseOutcome::NotAvailable { available })
        }
        TransitionOutcome::Transitioned {
            transition,
            resolution_warning,
            ..
        } => {
            let mut resolved = !resolution_warning;
            if resolution_warning {
                // Many workflows reject this once the issue is closed.
                match set_resolution(tracker, key, preferred_resolution).await {
                    Ok(()) => resolved = check_resolved(tracker, key).await.unwrap_or(false),
                    Err(e) => log::warn!("Direct resolution update for {key} failed: {e}"),
                }
            }
            Ok(CloseOutcome::BareTransition {
                transition,
                resolved,
            })
        }
    }
}
