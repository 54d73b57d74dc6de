use crate::error::Result;
use crate::store;
use common::{HistoryEntry, HistoryRow, Job};
use std::path::{Path, PathBuf};

/// Name shown for entries whose job no longer exists.
pub const UNKNOWN_JOB: &str = "Unknown";

/// Append-only execution log, rewritten in full to `history.json` on every
/// append.
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
    path: PathBuf,
}

impl HistoryLog {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            path: path.into(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = store::load_array(&path)?;
        Ok(Self { entries, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        store::save_json(&self.path, &self.entries)
    }

    /// Records the entry in memory, then persists the whole log. The entry
    /// stays recorded even when persisting fails.
    pub fn append(&mut self, entry: HistoryEntry) -> Result<()> {
        self.entries.push(entry);
        self.save()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Entries newest first, joined with the current job names. With a
    /// filter, only entries whose job currently carries that name are kept;
    /// orphaned entries therefore only show up unfiltered.
    pub fn rows(&self, jobs: &[Job], job_name: Option<&str>) -> Vec<HistoryRow> {
        let mut rows: Vec<HistoryRow> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let job = jobs.iter().find(|j| j.id == entry.job_id);
                if let Some(wanted) = job_name {
                    if job.map(|j| j.name.as_str()) != Some(wanted) {
                        return None;
                    }
                }
                Some(HistoryRow {
                    job_name: job.map_or_else(|| UNKNOWN_JOB.to_string(), |j| j.name.clone()),
                    entry: entry.clone(),
                })
            })
            .collect();
        // stable sort keeps append order among equal timestamps
        rows.sort_by(|a, b| b.entry.timestamp.cmp(&a.entry.timestamp));
        rows
    }

    pub fn recent(&self, jobs: &[Job], n: usize) -> Vec<HistoryRow> {
        let mut rows = self.rows(jobs, None);
        rows.truncate(n);
        rows
    }
}
