use crate::error::{Result, SchedError};
use crate::script_store::ScriptStore;
use crate::store;
use chrono::{DateTime, Utc};
use common::{interval_seconds, next_run_after, Job, JobId, JobSpec};
use std::collections::HashMap;
use std::path::PathBuf;

/// All job definitions in insertion order, plus the next-run index.
///
/// The index is derived state: it is never persisted and holds an entry for
/// a job exactly when that job is enabled.
pub struct JobRegistry {
    jobs: Vec<Job>,
    next_runs: HashMap<JobId, DateTime<Utc>>,
    scripts: ScriptStore,
    path: PathBuf,
}

impl JobRegistry {
    pub fn empty(path: impl Into<PathBuf>, scripts: ScriptStore) -> Self {
        Self {
            jobs: Vec::new(),
            next_runs: HashMap::new(),
            scripts,
            path: path.into(),
        }
    }

    /// Loads `jobs.json` and rebuilds the index from `(last_run or now) +
    /// interval` for every enabled job.
    pub fn load(path: impl Into<PathBuf>, scripts: ScriptStore, now: DateTime<Utc>) -> Result<Self> {
        let mut registry = Self::empty(path, scripts);
        registry.jobs = store::load_array(&registry.path)?;
        for job in &registry.jobs {
            if job.enabled {
                let anchor = job.last_run.unwrap_or(now);
                registry
                    .next_runs
                    .insert(job.id.clone(), next_run_after(anchor, job.interval_seconds));
            }
        }
        log::info!(
            "Loaded {} jobs ({} enabled) from {:?}",
            registry.jobs.len(),
            registry.next_runs.len(),
            registry.path
        );
        Ok(registry)
    }

    pub fn scripts(&self) -> &ScriptStore {
        &self.scripts
    }

    pub fn save(&self) -> Result<()> {
        store::save_json(&self.path, &self.jobs)
    }

    pub fn list(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    fn get_mut(&mut self, id: &JobId) -> Result<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| SchedError::NotFound(id.clone()))
    }

    pub fn next_run(&self, id: &JobId) -> Option<DateTime<Utc>> {
        self.next_runs.get(id).copied()
    }

    pub fn create(&mut self, spec: JobSpec, now: DateTime<Utc>) -> Result<JobId> {
        check_interval(&spec)?;
        let script_path = self.scripts.create(&spec.script_content, &spec.script_type)?;
        let id = JobId(uuid::Uuid::new_v4().to_string());
        let job = Job {
            id: id.clone(),
            name: spec.name,
            script_path,
            script_type: spec.script_type,
            interval_seconds: interval_seconds(spec.interval_value, &spec.interval_unit),
            interval_value: spec.interval_value,
            interval_unit: spec.interval_unit,
            created_at: now,
            last_run: None,
            enabled: spec.enabled,
            script_arguments: spec.arguments,
        };
        if job.enabled {
            self.next_runs
                .insert(id.clone(), next_run_after(now, job.interval_seconds));
        }
        log::info!("Created job {} ({}) every {}s", job.name, id, job.interval_seconds);
        self.jobs.push(job);
        Ok(id)
    }

    /// Replaces the job's fields. A new script file is written only when the
    /// content or type changed; the old file is then removed best-effort.
    pub fn update(&mut self, id: &JobId, spec: JobSpec, now: DateTime<Utc>) -> Result<()> {
        check_interval(&spec)?;
        let (old_path, old_type) = {
            let job = self.get(id).ok_or_else(|| SchedError::NotFound(id.clone()))?;
            (job.script_path.clone(), job.script_type.clone())
        };
        let old_content = self.scripts.read(&old_path);
        let script_path = if spec.script_content != old_content || spec.script_type != old_type {
            let new_path = self.scripts.create(&spec.script_content, &spec.script_type)?;
            self.scripts.delete(&old_path);
            new_path
        } else {
            old_path
        };

        let job = self.get_mut(id)?;
        job.name = spec.name;
        job.script_path = script_path;
        job.script_type = spec.script_type;
        job.interval_seconds = interval_seconds(spec.interval_value, &spec.interval_unit);
        job.interval_value = spec.interval_value;
        job.interval_unit = spec.interval_unit;
        job.enabled = spec.enabled;
        job.script_arguments = spec.arguments;
        let (enabled, anchor, interval) = (job.enabled, job.last_run.unwrap_or(now), job.interval_seconds);

        self.reschedule(id, enabled, anchor, interval);
        log::info!("Updated job {}", id);
        Ok(())
    }

    /// Flips `enabled` and returns the new state.
    pub fn toggle_enabled(&mut self, id: &JobId, now: DateTime<Utc>) -> Result<bool> {
        let job = self.get_mut(id)?;
        job.enabled = !job.enabled;
        let (enabled, anchor, interval) = (job.enabled, job.last_run.unwrap_or(now), job.interval_seconds);

        self.reschedule(id, enabled, anchor, interval);
        log::info!("Job {} {}", id, if enabled { "enabled" } else { "disabled" });
        Ok(enabled)
    }

    pub fn delete(&mut self, id: &JobId) -> Result<Job> {
        let idx = self
            .jobs
            .iter()
            .position(|j| &j.id == id)
            .ok_or_else(|| SchedError::NotFound(id.clone()))?;
        let job = self.jobs.remove(idx);
        self.scripts.delete(&job.script_path);
        self.next_runs.remove(id);
        log::info!("Deleted job {} ({})", job.name, id);
        Ok(job)
    }

    /// Enabled jobs whose next run is at or before `now`, in registry order.
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|j| j.enabled && self.next_runs.get(&j.id).is_some_and(|next| *next <= now))
            .cloned()
            .collect()
    }

    /// Records an execution at `now` and, for an enabled job, moves the next
    /// run to `now + interval`.
    pub fn mark_ran(&mut self, id: &JobId, now: DateTime<Utc>) -> Result<()> {
        let job = self.get_mut(id)?;
        job.last_run = Some(now);
        let (enabled, interval) = (job.enabled, job.interval_seconds);
        self.reschedule(id, enabled, now, interval);
        Ok(())
    }

    fn reschedule(&mut self, id: &JobId, enabled: bool, anchor: DateTime<Utc>, interval: u64) {
        if enabled {
            self.next_runs.insert(id.clone(), next_run_after(anchor, interval));
        } else {
            self.next_runs.remove(id);
        }
    }

    pub fn script_content(&self, id: &JobId) -> Result<String> {
        let job = self.get(id).ok_or_else(|| SchedError::NotFound(id.clone()))?;
        Ok(self.scripts.read(&job.script_path))
    }
}

/// A zero-length interval would make the job due on every check.
fn check_interval(spec: &JobSpec) -> Result<()> {
    if spec.interval_value == 0 {
        return Err(SchedError::InvalidInterval(spec.interval_value));
    }
    Ok(())
}
