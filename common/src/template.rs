use crate::job::{IntervalUnit, JobSpec, ScriptType};
use serde::{Deserialize, Serialize};

/// Reusable preset of job-creation fields. Field names follow the template
/// file format (`script-type`, `interval-unit`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub name: String,
    #[serde(rename = "script-type")]
    pub script_type: ScriptType,
    #[serde(rename = "script-content")]
    pub script_content: String,
    #[serde(rename = "interval")]
    pub interval_value: u64,
    #[serde(rename = "interval-unit")]
    pub interval_unit: IntervalUnit,
    pub enabled: bool,
}

impl Template {
    /// Copies the preset into the fields of a new job.
    pub fn to_job_spec(&self, name: &str, arguments: Option<String>) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            script_content: self.script_content.clone(),
            script_type: self.script_type.clone(),
            interval_value: self.interval_value,
            interval_unit: self.interval_unit.clone(),
            enabled: self.enabled,
            arguments,
        }
    }
}
