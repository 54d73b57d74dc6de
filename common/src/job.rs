use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Language of a job's script, which selects the interpreter that runs it.
///
/// Serialized as the bare file extension (`"py"`, `"sh"`, ...). Strings that
/// are not in the table deserialize to `Other` so stale records still load;
/// running one of those yields an "Unsupported script type" failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScriptType {
    Python,
    Shell,
    Php,
    Node,
    Ruby,
    Perl,
    PowerShell,
    Bat,
    Cmd,
    R,
    Lua,
    Go,
    Sql,
    Other(String),
}

impl ScriptType {
    /// Extensions of every supported type, in the order forms list them.
    pub const EXTENSIONS: [&'static str; 13] = [
        "py", "sh", "php", "js", "rb", "pl", "ps1", "bat", "cmd", "r", "lua", "go", "sql",
    ];

    pub fn extension(&self) -> &str {
        match self {
            ScriptType::Python => "py",
            ScriptType::Shell => "sh",
            ScriptType::Php => "php",
            ScriptType::Node => "js",
            ScriptType::Ruby => "rb",
            ScriptType::Perl => "pl",
            ScriptType::PowerShell => "ps1",
            ScriptType::Bat => "bat",
            ScriptType::Cmd => "cmd",
            ScriptType::R => "r",
            ScriptType::Lua => "lua",
            ScriptType::Go => "go",
            ScriptType::Sql => "sql",
            ScriptType::Other(s) => s,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ScriptType::Other(_))
    }

    /// Types whose script files get the executable bit on creation.
    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            ScriptType::Shell
                | ScriptType::Perl
                | ScriptType::Ruby
                | ScriptType::Python
                | ScriptType::Php
                | ScriptType::Node
                | ScriptType::Lua
                | ScriptType::R
                | ScriptType::Bat
                | ScriptType::Cmd
        )
    }

    /// sqlite3 reads the script through `-init`, so there is nowhere to put
    /// extra arguments.
    pub fn accepts_arguments(&self) -> bool {
        !matches!(self, ScriptType::Sql | ScriptType::Other(_))
    }
}

impl From<String> for ScriptType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "py" => ScriptType::Python,
            "sh" => ScriptType::Shell,
            "php" => ScriptType::Php,
            "js" => ScriptType::Node,
            "rb" => ScriptType::Ruby,
            "pl" => ScriptType::Perl,
            "ps1" => ScriptType::PowerShell,
            "bat" => ScriptType::Bat,
            "cmd" => ScriptType::Cmd,
            "r" => ScriptType::R,
            "lua" => ScriptType::Lua,
            "go" => ScriptType::Go,
            "sql" => ScriptType::Sql,
            _ => ScriptType::Other(s),
        }
    }
}

impl From<ScriptType> for String {
    fn from(t: ScriptType) -> Self {
        match t {
            ScriptType::Other(s) => s,
            known => known.extension().to_string(),
        }
    }
}

impl FromStr for ScriptType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ScriptType::from(s.to_string()))
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Unit of a job's user-facing interval.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntervalUnit {
    #[default]
    Minutes,
    Hours,
    Days,
    /// Anything else counts as plain seconds.
    Other(String),
}

impl IntervalUnit {
    pub fn multiplier(&self) -> u64 {
        match self {
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3600,
            IntervalUnit::Days => 86400,
            IntervalUnit::Other(_) => 1,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            IntervalUnit::Minutes => "minutes",
            IntervalUnit::Hours => "hours",
            IntervalUnit::Days => "days",
            IntervalUnit::Other(s) => s,
        }
    }
}

impl From<String> for IntervalUnit {
    fn from(s: String) -> Self {
        match s.as_str() {
            "minutes" => IntervalUnit::Minutes,
            "hours" => IntervalUnit::Hours,
            "days" => IntervalUnit::Days,
            _ => IntervalUnit::Other(s),
        }
    }
}

impl From<IntervalUnit> for String {
    fn from(u: IntervalUnit) -> Self {
        match u {
            IntervalUnit::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(IntervalUnit::from(s.to_string()))
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied fields for creating or updating a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub name: String,
    pub script_content: String,
    pub script_type: ScriptType,
    pub interval_value: u64,
    pub interval_unit: IntervalUnit,
    pub enabled: bool,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Persisted job record, one element of `jobs.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub script_path: PathBuf,
    pub script_type: ScriptType,
    pub interval_value: u64,
    pub interval_unit: IntervalUnit,
    pub interval_seconds: u64,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp::option")]
    pub last_run: Option<DateTime<Utc>>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_arguments: Option<String>,
}

impl Job {
    /// Default argument string for manual runs, empty when none is set.
    pub fn default_arguments(&self) -> &str {
        self.script_arguments.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_type_table_round_trips_every_extension() {
        for ext in ScriptType::EXTENSIONS {
            let t: ScriptType = ext.parse().unwrap();
            assert!(t.is_supported(), "{} should be supported", ext);
            assert_eq!(t.extension(), ext);
        }
    }

    #[test]
    fn test_unknown_script_type_is_preserved() {
        let t: ScriptType = serde_json::from_str("\"xyz\"").unwrap();
        assert_eq!(t, ScriptType::Other("xyz".to_string()));
        assert!(!t.is_supported());
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"xyz\"");
    }

    #[test]
    fn test_sql_and_go_flags() {
        assert!(!ScriptType::Sql.accepts_arguments());
        assert!(!ScriptType::Sql.is_executable());
        assert!(!ScriptType::Go.is_executable());
        assert!(ScriptType::Go.accepts_arguments());
        assert!(ScriptType::Shell.is_executable());
    }

    #[test]
    fn test_interval_unit_multipliers() {
        assert_eq!(IntervalUnit::Minutes.multiplier(), 60);
        assert_eq!(IntervalUnit::Hours.multiplier(), 3600);
        assert_eq!(IntervalUnit::Days.multiplier(), 86400);
        assert_eq!("weeks".parse::<IntervalUnit>().unwrap().multiplier(), 1);
    }

    #[test]
    fn test_job_without_arguments_omits_the_key() {
        let job = Job {
            id: JobId::from("a"),
            name: "A".to_string(),
            script_path: PathBuf::from("scripts/a.sh"),
            script_type: ScriptType::Shell,
            interval_value: 1,
            interval_unit: IntervalUnit::Minutes,
            interval_seconds: 60,
            created_at: "2024-05-01T10:00:00Z".parse().unwrap(),
            last_run: None,
            enabled: true,
            script_arguments: None,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert!(value.get("script_arguments").is_none());
        assert_eq!(value["last_run"], serde_json::Value::Null);
        assert_eq!(value["script_type"], "sh");
        assert_eq!(value["interval_unit"], "minutes");
    }
}
