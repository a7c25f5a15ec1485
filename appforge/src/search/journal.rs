//! Append-only insight journal capped at the most recent entries.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::cache::{read_json_or_default, write_atomic};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub insights: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A JSON array of [`JournalEntry`] on disk.
#[derive(Debug)]
pub struct InsightJournal {
    path: PathBuf,
    cap: usize,
    write_lock: Mutex<()>,
}

impl InsightJournal {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap: cap.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Append one entry, dropping the oldest beyond the cap.
    pub fn append(&self, insights: &[String]) -> Result<()> {
        if insights.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        let mut entries: Vec<JournalEntry> = read_json_or_default(&self.path);
        entries.push(JournalEntry {
            insights: insights.to_vec(),
            timestamp: Utc::now(),
        });
        if entries.len() > self.cap {
            let excess = entries.len() - self.cap;
            entries.drain(..excess);
        }
        write_atomic(&self.path, &serde_json::to_vec_pretty(&entries)?)
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> Vec<JournalEntry> {
        read_json_or_default(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_most_recent_entries() {
        let dir = tempfile::tempdir().unwrap();
        let journal = InsightJournal::new(dir.path().join("insights.json"), 3);
        for i in 0..5 {
            journal.append(&[format!("insight {i}")]).unwrap();
        }
        let kept: Vec<String> = journal
            .entries()
            .into_iter()
            .map(|e| e.insights[0].clone())
            .collect();
        assert_eq!(kept, ["insight 2", "insight 3", "insight 4"]);
    }

    #[test]
    fn empty_append_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let journal = InsightJournal::new(dir.path().join("insights.json"), 100);
        journal.append(&[]).unwrap();
        assert!(journal.entries().is_empty());
        assert!(!dir.path().join("insights.json").exists());
    }

    #[test]
    fn corrupt_journal_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insights.json");
        std::fs::write(&path, "[{\"broken\"").unwrap();
        let journal = InsightJournal::new(&path, 100);
        assert!(journal.entries().is_empty());
        journal.append(&["fresh".to_string()]).unwrap();
        assert_eq!(journal.entries().len(), 1);
    }
}
