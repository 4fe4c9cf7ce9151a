//! Calendar export normalization: Outlook/Teams CSV in, work-item CSV out.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

use crate::model::work_item::{IssueType, WorkItemRow};

static DMY_LONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("valid regex"));
static DMY_SHORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2})$").expect("valid regex"));
static DURATION_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*([hm])").expect("valid regex"));

const TIME_FORMATS: [&str; 4] = ["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];
const EXCLUDED_PHRASES: [&str; 3] = ["cancelled", "canceled", "out of office"];

/// A calendar export after quote stripping and date normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CleanedExport {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows dropped because their field count did not match the header.
    pub dropped: usize,
}

/// Rewrite `D/M/YYYY` or `D/M/YY` as `YYYY-MM-DD`. Two-digit years are taken
/// as 20YY. Anything else is returned unchanged.
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(c) = DMY_LONG.captures(raw) {
        return format!("{}-{:0>2}-{:0>2}", &c[3], &c[2], &c[1]);
    }
    if let Some(c) = DMY_SHORT.captures(raw) {
        let year = 2000 + c[3].parse::<u32>().unwrap_or(0);
        return format!("{year}-{:0>2}-{:0>2}", &c[2], &c[1]);
    }
    raw.to_string()
}

fn split_clean(line: &str) -> Vec<String> {
    line.replace('"', "")
        .trim()
        .split(',')
        .map(|f| f.trim().to_string())
        .collect()
}

pub fn clean_export(raw: &str) -> CleanedExport {
    let mut lines = raw.lines();
    let Some(first) = lines.next() else {
        return CleanedExport::default();
    };
    let header: Vec<String> = split_clean(&first.replace('\u{feff}', ""))
        .into_iter()
        .map(|h| {
            if h.eq_ignore_ascii_case("subject") {
                "Summary".to_string()
            } else {
                h
            }
        })
        .collect();
    let date_idx = header
        .iter()
        .position(|h| h.eq_ignore_ascii_case("start date"));

    let mut rows = Vec::new();
    let mut dropped = 0;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut row = split_clean(line);
        if row.len() != header.len() {
            dropped += 1;
            continue;
        }
        if let Some(idx) = date_idx {
            row[idx] = normalize_date(&row[idx]);
        }
        rows.push(row);
    }
    CleanedExport {
        header,
        rows,
        dropped,
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
        .with_context(|| {
            format!("Time '{raw}' is not in a recognized format (expected HH:MM or HH:MM:SS)")
        })
}

/// Whole hours and minutes between two times, as `Xh Ym`, `Xh`, `Ym` or `0m`.
pub fn duration(start: &str, end: &str) -> Result<String> {
    let start = parse_time(start)?;
    let end = parse_time(end)?;
    let minutes = (end - start).num_minutes();
    if minutes < 0 {
        bail!("End time {end} is before start time {start}");
    }
    Ok(format_minutes(minutes))
}

pub fn format_minutes(total: i64) -> String {
    let (hours, minutes) = (total / 60, total % 60);
    match (hours, minutes) {
        (0, 0) => "0m".to_string(),
        (h, 0) => format!("{h}h"),
        (0, m) => format!("{m}m"),
        (h, m) => format!("{h}h {m}m"),
    }
}

/// `"1h 30m"` -> 1.5, rounded to two decimals.
pub fn duration_to_hours(duration: &str) -> f64 {
    let hours: f64 = DURATION_PART
        .captures_iter(duration)
        .filter_map(|c| {
            let n: f64 = c[1].parse().ok()?;
            Some(if &c[2] == "h" { n } else { n / 60.0 })
        })
        .sum();
    (hours * 100.0).round() / 100.0
}

/// Story point text for a duration: always at least one decimal place.
pub fn story_points(duration: &str) -> String {
    let hours = duration_to_hours(duration);
    if hours.fract() == 0.0 {
        format!("{hours:.1}")
    } else {
        format!("{hours}")
    }
}

pub fn is_excluded(summary: &str) -> bool {
    let lower = summary.to_lowercase();
    EXCLUDED_PHRASES.iter().any(|p| lower.contains(p))
}

/// ISO week label for a `YYYY-MM-DD` date, e.g. `Week12`.
pub fn week_label(date: &str) -> Result<String> {
    let parsed = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .with_context(|| format!("Start Date '{date}' is not YYYY-MM-DD"))?;
    Ok(format!("Week{}", parsed.iso_week().week()))
}

#[derive(Debug, Clone)]
pub struct PrepOptions {
    pub project: String,
    pub issue_type: IssueType,
    /// Applied to every row when the issue type takes a parent.
    pub parent: Option<String>,
}

#[derive(Debug, Default)]
pub struct PrepReport {
    pub rows: Vec<WorkItemRow>,
    pub excluded: usize,
    pub failed: usize,
    pub dropped: usize,
}

fn build_header_map(header: &[String]) -> HashMap<String, usize> {
    header
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase(), i))
        .collect()
}

fn column<'a>(row: &'a [String], map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    map.get(name)
        .and_then(|&i| row.get(i))
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
}

fn summary_of<'a>(row: &'a [String], map: &HashMap<String, usize>) -> &'a str {
    column(row, map, "summary")
        .or_else(|| column(row, map, "subject"))
        .unwrap_or_default()
}

fn build_row(
    row: &[String],
    map: &HashMap<String, usize>,
    opts: &PrepOptions,
) -> Result<WorkItemRow> {
    let summary = summary_of(row, map);
    let start_date = column(row, map, "start date").context("Missing 'Start Date'")?;
    let week = week_label(start_date)?;
    let (Some(start), Some(end)) = (
        column(row, map, "start time"),
        column(row, map, "end time"),
    ) else {
        bail!("Missing 'Start Time' or 'End Time' column in row");
    };
    let estimate = duration(start, end)?;
    let parent = match (&opts.parent, opts.issue_type.takes_parent()) {
        (Some(p), true) => p.clone(),
        _ => String::new(),
    };
    Ok(WorkItemRow {
        project: opts.project.clone(),
        summary: format!("{week} {summary}"),
        issue_type: opts.issue_type.clone(),
        parent,
        start_date: start_date.to_string(),
        story_points: story_points(&estimate),
        original_estimate: estimate.clone(),
        time_spent: estimate,
        priority: String::new(),
        created_issue_id: String::new(),
    })
}

pub fn to_work_items(cleaned: &CleanedExport, opts: &PrepOptions) -> PrepReport {
    let map = build_header_map(&cleaned.header);
    let mut report = PrepReport {
        dropped: cleaned.dropped,
        ..Default::default()
    };
    for row in &cleaned.rows {
        if row.iter().all(|f| f.is_empty()) {
            continue;
        }
        let summary = summary_of(row, &map);
        if is_excluded(summary) {
            log::debug!("Excluding '{summary}'");
            report.excluded += 1;
            continue;
        }
        match build_row(row, &map, opts) {
            Ok(item) => report.rows.push(item),
            Err(e) => {
                log::warn!("Error processing row {row:?}: {e}");
                report.failed += 1;
            }
        }
    }
    report
}

pub fn write_work_items(path: &Path, rows: &[WorkItemRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    if rows.is_empty() {
        wtr.write_record(crate::model::work_item::HEADER)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Normalize `input` and write the work-item CSV to `output`.
pub fn prepare_file(input: &Path, output: &Path, opts: &PrepOptions) -> Result<PrepReport> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let cleaned = clean_export(&raw);
    let report = to_work_items(&cleaned, opts);
    write_work_items(output, &report.rows)?;
    log::info!(
        "Prepared {} rows from {} ({} excluded, {} failed, {} malformed)",
        report.rows.len(),
        input.display(),
        report.excluded,
        report.failed,
        report.dropped
    );
    Ok(report)
}
