pub mod history;
pub mod ipc;
pub mod job;
pub mod schedule;
pub mod template;
pub mod timestamp;

pub use history::HistoryEntry;
pub use ipc::{HistoryRow, JobView, Reply, Request, Response, Summary};
pub use job::{IntervalUnit, Job, JobId, JobSpec, ScriptType};
pub use schedule::{interval_seconds, next_run_after, parse_interval};
pub use template::Template;

// Production paths (follow FHS - Filesystem Hierarchy Standard)
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/scriptsched/scriptsched.sock";
pub const DEFAULT_DATA_DIR: &str = "/var/lib/scriptsched";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/scriptsched/config.yaml";
pub const DEFAULT_LOG_FILE: &str = "/var/log/scriptsched/daemon.log";
pub const DEFAULT_JOBS_LOG_FILE: &str = "/var/log/scriptsched/jobs.log";

// Fallback paths for non-root users, relative to the working directory
pub const USER_SOCKET_PATH: &str = "/tmp/scriptsched.sock";
pub const USER_DATA_DIR: &str = "data";
pub const USER_SCRIPTS_DIR: &str = "scripts";
pub const USER_TEMPLATES_DIR: &str = "templates";
pub const USER_CONFIG_PATH: &str = "scriptsched.yaml";
pub const USER_LOG_FILE: &str = "scriptsched-daemon.log";
pub const USER_JOBS_LOG_FILE: &str = "scriptsched-jobs.log";

/// Socket the client should dial when none is given: the system socket when a
/// system daemon is running, the per-user one otherwise.
pub fn default_socket_path() -> &'static str {
    if std::path::Path::new(DEFAULT_SOCKET_PATH).exists() {
        DEFAULT_SOCKET_PATH
    } else {
        USER_SOCKET_PATH
    }
}
