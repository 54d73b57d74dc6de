use crate::history::HistoryEntry;
use crate::job::{Job, JobId, JobSpec};
use crate::template::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One request per line on the daemon socket.
#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    CreateJob(JobSpec),
    UpdateJob(JobId, JobSpec),
    ToggleJob(JobId),
    RemoveJob(JobId),
    ListJobs,
    GetJob(JobId),
    GetScript(JobId),
    RunJob {
        id: JobId,
        /// `None` runs with the job's default arguments.
        arguments: Option<String>,
    },
    CheckScheduled,
    GetHistory {
        job_name: Option<String>,
    },
    ListTemplates,
    SaveTemplate(Template),
    DeleteTemplate(String),
    CreateFromTemplate {
        template: String,
        name: String,
        arguments: Option<String>,
    },
    Summary,
    Metrics,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Error(String),
    Created(JobId),
    JobList(Vec<JobView>),
    JobDetail(JobView),
    Script(String),
    RunResult { success: bool, output: String },
    Checked { executed: usize },
    HistoryList(Vec<HistoryRow>),
    TemplateList(Vec<Template>),
    Summary(Summary),
    Metrics(String),
}

/// Response plus any persistence warnings raised while producing it. The
/// operation itself went through even when warnings are present.
#[derive(Debug, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub warnings: Vec<String>,
    pub response: Response,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
}

/// History entry joined with the current name of its job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRow {
    pub job_name: String,
    #[serde(flatten)]
    pub entry: HistoryEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub total_jobs: usize,
    pub active_jobs: usize,
    pub inactive_jobs: usize,
    pub recent: Vec<HistoryRow>,
}
