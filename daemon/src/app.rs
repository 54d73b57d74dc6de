use crate::config::StorageConfig;
use crate::error::{Result, SchedError};
use crate::history::HistoryLog;
use crate::metrics::MetricsCollector;
use crate::registry::JobRegistry;
use crate::runner;
use crate::script_store::ScriptStore;
use crate::templates::{slugify, TemplateStore};
use chrono::{DateTime, Utc};
use common::{
    HistoryEntry, HistoryRow, Job, JobId, JobSpec, JobView, ScriptType, Summary, Template,
};
use std::path::Path;
use std::sync::Arc;

const RECENT_EXECUTIONS: usize = 5;

/// Scheduler state shared by every request: jobs, history and templates.
///
/// Mutations are applied in memory first and persisted afterwards. A failed
/// write leaves the in-memory state in place and is queued as a warning for
/// the caller (see [`App::take_warnings`]).
pub struct App {
    pub(crate) registry: JobRegistry,
    pub(crate) history: HistoryLog,
    templates: TemplateStore,
    metrics: Arc<MetricsCollector>,
    pub(crate) warnings: Vec<String>,
}

impl App {
    pub fn open(storage: &StorageConfig, metrics: Arc<MetricsCollector>, now: DateTime<Utc>) -> Self {
        let mut warnings = Vec::new();
        let scripts = ScriptStore::new(&storage.scripts_dir);

        let registry = JobRegistry::load(storage.jobs_file(), scripts.clone(), now).unwrap_or_else(|e| {
            log::error!("Error loading jobs: {}", e);
            warnings.push(format!("Error loading jobs: {}", e));
            JobRegistry::empty(storage.jobs_file(), scripts)
        });
        let history = HistoryLog::load(storage.history_file()).unwrap_or_else(|e| {
            log::error!("Error loading history: {}", e);
            warnings.push(format!("Error loading history: {}", e));
            HistoryLog::empty(storage.history_file())
        });

        log::info!(
            "Loaded {} history entries from {:?}",
            history.entries().len(),
            history.path()
        );
        let templates = TemplateStore::new(&storage.templates_dir);
        log::info!(
            "Scripts in {:?}, templates in {:?}",
            registry.scripts().dir(),
            templates.dir()
        );

        let app = Self {
            registry,
            history,
            templates,
            metrics,
            warnings,
        };
        app.refresh_gauges();
        app
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Drains the persistence warnings raised since the last call.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, e: SchedError) {
        log::warn!("{}", e);
        self.warnings.push(e.to_string());
    }

    pub(crate) fn persist_jobs(&mut self) {
        if let Err(e) = self.registry.save() {
            self.warn(e);
        }
        self.refresh_gauges();
    }

    fn refresh_gauges(&self) {
        let enabled = self.registry.list().iter().filter(|j| j.enabled).count();
        self.metrics.set_enabled_jobs(enabled as u64);
    }

    fn view(&self, job: &Job) -> JobView {
        JobView {
            job: job.clone(),
            next_run: self.registry.next_run(&job.id),
        }
    }

    pub fn create_job(&mut self, spec: JobSpec, now: DateTime<Utc>) -> Result<JobId> {
        let id = self.registry.create(spec, now)?;
        self.persist_jobs();
        Ok(id)
    }

    pub fn update_job(&mut self, id: &JobId, spec: JobSpec, now: DateTime<Utc>) -> Result<()> {
        self.registry.update(id, spec, now)?;
        self.persist_jobs();
        Ok(())
    }

    pub fn toggle_enabled(&mut self, id: &JobId, now: DateTime<Utc>) -> Result<bool> {
        let enabled = self.registry.toggle_enabled(id, now)?;
        self.persist_jobs();
        Ok(enabled)
    }

    /// Removes the job and its script. History entries for it are kept.
    pub fn delete_job(&mut self, id: &JobId) -> Result<()> {
        self.registry.delete(id)?;
        self.persist_jobs();
        Ok(())
    }

    pub fn list_jobs(&self) -> Vec<JobView> {
        self.registry.list().iter().map(|j| self.view(j)).collect()
    }

    pub fn get_job(&self, id: &JobId) -> Result<JobView> {
        self.registry
            .get(id)
            .map(|j| self.view(j))
            .ok_or_else(|| SchedError::NotFound(id.clone()))
    }

    pub fn job_script(&self, id: &JobId) -> Result<String> {
        self.registry.script_content(id)
    }

    /// Runs a script and records the outcome in the history log, whatever it
    /// was. Returns stdout on success and stderr (or the reason nothing ran)
    /// on failure.
    pub fn execute(
        &mut self,
        job_id: &JobId,
        script_path: &Path,
        script_type: &ScriptType,
        arguments: &str,
        now: DateTime<Utc>,
    ) -> (bool, String) {
        log::info!("Executing job {} ({}) {}", job_id, script_type, arguments);

        let (entry, duration_ms) = match runner::run(script_type, script_path, arguments) {
            Ok(out) => {
                log::info!(
                    "Job {} finished with exit code {:?} in {}ms",
                    job_id,
                    out.exit_code,
                    out.duration.as_millis()
                );
                log::info!(target: "job_output", "Job: {}\nStdout:\n{}\nStderr:\n{}", job_id, out.stdout, out.stderr);
                let entry = HistoryEntry {
                    job_id: job_id.clone(),
                    timestamp: now,
                    success: out.success(),
                    output: out.stdout,
                    error: out.stderr,
                    arguments: arguments.to_string(),
                };
                (entry, Some(out.duration.as_millis() as u64))
            }
            Err(e) => {
                log::error!("Job {} could not run: {}", job_id, e);
                let entry = HistoryEntry {
                    job_id: job_id.clone(),
                    timestamp: now,
                    success: false,
                    output: String::new(),
                    error: e.to_string(),
                    arguments: arguments.to_string(),
                };
                (entry, None)
            }
        };

        self.metrics.record_execution(&job_id.0, entry.success, duration_ms);
        let success = entry.success;
        let captured = if success {
            entry.output.clone()
        } else {
            entry.error.clone()
        };
        if let Err(e) = self.history.append(entry) {
            self.warn(e);
        }
        (success, captured)
    }

    /// Manual run. `None` uses the job's default arguments. Like a scheduled
    /// run it sets `last_run` and, for an enabled job, restarts the interval.
    pub fn run_job_now(
        &mut self,
        id: &JobId,
        arguments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(bool, String)> {
        let job = self
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| SchedError::NotFound(id.clone()))?;
        let arguments = arguments.unwrap_or_else(|| job.default_arguments().to_string());

        let result = self.execute(&job.id, &job.script_path, &job.script_type, &arguments, now);
        self.registry.mark_ran(id, now)?;
        self.persist_jobs();
        Ok(result)
    }

    pub fn list_history(&self, job_name: Option<&str>) -> Vec<HistoryRow> {
        self.history.rows(self.registry.list(), job_name)
    }

    pub fn list_templates(&mut self) -> Vec<Template> {
        let (templates, errors) = self.templates.list();
        for e in errors {
            self.warnings.push(e.to_string());
        }
        templates.into_values().map(|s| s.template).collect()
    }

    pub fn save_template(&mut self, template: &Template) -> Result<()> {
        if slugify(&template.name).is_empty() {
            return Err(SchedError::InvalidTemplateName(template.name.clone()));
        }
        self.templates.save(template)?;
        Ok(())
    }

    pub fn delete_template(&mut self, name: &str) -> Result<()> {
        let (mut templates, _) = self.templates.list();
        let stored = templates
            .remove(name)
            .ok_or_else(|| SchedError::TemplateNotFound(name.to_string()))?;
        self.templates.delete(&stored.path);
        Ok(())
    }

    /// Creates a job from a copy of the template's fields.
    pub fn create_job_from_template(
        &mut self,
        template: &str,
        name: &str,
        arguments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<JobId> {
        let (templates, _) = self.templates.list();
        let stored = templates
            .get(template)
            .ok_or_else(|| SchedError::TemplateNotFound(template.to_string()))?;
        let spec = stored.template.to_job_spec(name, arguments);
        self.create_job(spec, now)
    }

    pub fn summary(&self) -> Summary {
        let jobs = self.registry.list();
        let active = jobs.iter().filter(|j| j.enabled).count();
        Summary {
            total_jobs: jobs.len(),
            active_jobs: active,
            inactive_jobs: jobs.len() - active,
            recent: self.history.recent(jobs, RECENT_EXECUTIONS),
        }
    }
}
