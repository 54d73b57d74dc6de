use crate::job::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One execution outcome, one element of `history.json`. Never modified once
/// appended. `job_id` may point at a job that has since been deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub job_id: JobId,
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arguments: String,
}

impl HistoryEntry {
    pub fn status(&self) -> &'static str {
        if self.success {
            "Success"
        } else {
            "Failed"
        }
    }
}
