//! Append-only record of issues created by previous imports.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::model::work_item::WorkItemRow;

pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append rows; the header is written only when the file is new or empty.
    /// Existing lines are never touched.
    pub fn append(&self, rows: &[WorkItemRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let is_new = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger {}", self.path.display()))?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        log::info!("Appended {} rows to {}", rows.len(), self.path.display());
        Ok(rows.len())
    }

    /// Rows recorded so far; empty when the ledger does not exist yet.
    pub fn read(&self) -> Result<Vec<WorkItemRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to read ledger {}", self.path.display()))?;
        let mut rows = Vec::new();
        for (i, row) in rdr.deserialize::<WorkItemRow>().enumerate() {
            match row {
                Ok(row) => rows.push(row),
                Err(e) => log::warn!("Skipping malformed ledger row {}: {e}", i + 2),
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::work_item::HEADER;

    fn row(summary: &str, key: &str) -> WorkItemRow {
        WorkItemRow {
            project: "PROJ".into(),
            summary: summary.into(),
            created_issue_id: key.into(),
            ..Default::default()
        }
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("nested").join("tracker.csv"));
        ledger.append(&[row("A", "PROJ-1")]).unwrap();
        ledger.append(&[row("B", "PROJ-2")]).unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        let header = HEADER.join(",");
        assert_eq!(text.matches(&header).count(), 1);
        assert_eq!(text.lines().count(), 3);
        let keys: Vec<String> = ledger
            .read()
            .unwrap()
            .into_iter()
            .map(|r| r.created_issue_id)
            .collect();
        assert_eq!(keys, vec!["PROJ-1", "PROJ-2"]);
    }

    #[test]
    fn existing_content_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.csv");
        let before = format!("{}\nPROJ,Old,Story,,,,,,,PROJ-7\n", HEADER.join(","));
        std::fs::write(&path, &before).unwrap();

        let ledger = Ledger::new(&path);
        ledger.append(&[row("New", "PROJ-8")]).unwrap();
        let after = std::fs::read_to_string(&path).unwrap();
        assert!(after.starts_with(&before));
        assert_eq!(after.lines().count(), 3);
    }

    #[test]
    fn empty_append_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("tracker.csv"));
        assert_eq!(ledger.append(&[]).unwrap(), 0);
        assert!(!ledger.path().exists());
        assert!(ledger.read().unwrap().is_empty());
    }
}
