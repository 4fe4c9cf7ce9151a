//! Interactive fallbacks for arguments not given on the command line.

use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::path::{Path, PathBuf};

use crate::model::work_item::IssueType;

pub fn text(prompt: &str) -> Result<String> {
    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact_text()?;
    Ok(value.trim().to_string())
}

/// Empty input means "none".
pub fn optional_text(prompt: &str) -> Result<Option<String>> {
    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

pub fn text_or(prompt: &str, default: &str) -> Result<String> {
    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()?;
    Ok(value.trim().to_string())
}

pub fn path_or(prompt: &str, default: &Path) -> Result<PathBuf> {
    text_or(prompt, &default.to_string_lossy()).map(PathBuf::from)
}

pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

pub fn issue_type() -> Result<IssueType> {
    let choices = IssueType::CHOICES;
    let labels: Vec<&str> = choices.iter().map(IssueType::as_str).collect();
    let idx = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Issue type for every entry")
        .items(&labels)
        .default(1)
        .interact()?;
    Ok(choices[idx].clone())
}

/// Use the argument when given, otherwise ask.
pub fn or_ask(arg: Option<String>, prompt: &str) -> Result<String> {
    match arg {
        Some(v) => Ok(v),
        None => text(prompt),
    }
}

pub fn path_or_ask(arg: Option<PathBuf>, prompt: &str, default: &Path) -> Result<PathBuf> {
    match arg {
        Some(p) => Ok(p),
        None => path_or(prompt, default),
    }
}
