use crate::app::App;
use chrono::{DateTime, Utc};

impl App {
    /// Runs every enabled job whose next run is at or before `now`, in
    /// registry order, one after the other. Returns how many ran.
    ///
    /// A job runs at most once per check however many intervals were missed,
    /// and its next run is counted from `now` rather than from the missed
    /// slot. Scheduled runs never receive arguments.
    pub fn check_scheduled_jobs(&mut self, now: DateTime<Utc>) -> usize {
        self.metrics().increment_scheduler_checks();

        let due = self.registry.due_jobs(now);
        for job in &due {
            log::info!("Job {} ({}) is due", job.name, job.id);
            self.execute(&job.id, &job.script_path, &job.script_type, "", now);
            if let Err(e) = self.registry.mark_ran(&job.id, now) {
                log::warn!("Job {} vanished while running: {}", job.id, e);
            }
        }

        // history is already on disk, each append persists it
        if !due.is_empty() {
            self.persist_jobs();
        }
        due.len()
    }

    /// Check run by the background ticker. Warnings it raises have no client
    /// to go to and are only logged; warnings queued earlier stay for the
    /// next request.
    pub fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let queued = self.warnings.len();
        let ran = self.check_scheduled_jobs(now);
        self.warnings.truncate(queued);
        ran
    }
}

#[cfg(test)]
mod tests {
    use crate::app::tests::{open, shell_job, t0};
    use chrono::Duration;
    use common::JobId;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_runs_once_per_check_and_reanchors() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        let id = app.create_job(shell_job("A", "echo tick"), t0()).unwrap();
        assert_eq!(app.get_job(&id).unwrap().next_run, Some(t0() + Duration::seconds(60)));

        assert_eq!(app.check_scheduled_jobs(t0() + Duration::seconds(30)), 0);

        let first = t0() + Duration::seconds(61);
        assert_eq!(app.check_scheduled_jobs(first), 1);
        let view = app.get_job(&id).unwrap();
        assert_eq!(view.job.last_run, Some(first));
        assert_eq!(view.next_run, Some(t0() + Duration::seconds(121)));

        let late = t0() + Duration::seconds(300);
        assert_eq!(app.check_scheduled_jobs(late), 1);
        assert_eq!(app.get_job(&id).unwrap().next_run, Some(t0() + Duration::seconds(360)));

        let history = app.list_history(None);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.entry.success && r.entry.arguments.is_empty()));
        assert_eq!(history[0].entry.timestamp, late);
    }

    #[cfg(unix)]
    #[test]
    fn test_scheduled_runs_ignore_default_arguments() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        let mut spec = shell_job("A", "echo \"[$*]\"");
        spec.arguments = Some("manual-only".to_string());
        app.create_job(spec, t0()).unwrap();

        app.check_scheduled_jobs(t0() + Duration::seconds(60));
        let rows = app.list_history(None);
        assert_eq!(rows[0].entry.output, "[]\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_tick_keeps_warnings_queued_before_it() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("jobs.json"), "[{").unwrap();
        let mut app = open(&dir);
        app.create_job(shell_job("A", "true"), t0()).unwrap();

        // a non-empty directory in place of history.json makes the append fail
        let history = dir.path().join("history.json");
        std::fs::create_dir(&history).unwrap();
        std::fs::write(history.join("occupied"), "").unwrap();

        assert_eq!(app.tick(t0() + Duration::seconds(60)), 1);
        let warnings = app.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Error loading jobs"));
    }

    #[test]
    fn test_disabled_jobs_never_run() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        let id = app.create_job(shell_job("A", "true"), t0()).unwrap();
        app.toggle_enabled(&id, t0()).unwrap();

        assert_eq!(app.check_scheduled_jobs(t0() + Duration::days(3)), 0);
        assert!(app.list_history(None).is_empty());
        assert!(app.get_job(&id).unwrap().job.last_run.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_due_jobs_run_in_registry_order() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        let first = app.create_job(shell_job("first", "true"), t0()).unwrap();
        let second = app.create_job(shell_job("second", "true"), t0()).unwrap();

        assert_eq!(app.check_scheduled_jobs(t0() + Duration::seconds(60)), 2);
        let ids: Vec<JobId> = app.history.entries().iter().map(|e| e.job_id.clone()).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[cfg(unix)]
    #[test]
    fn test_restart_resumes_from_last_run() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        let id = app.create_job(shell_job("A", "true"), t0()).unwrap();
        let ran = t0() + Duration::seconds(61);
        app.check_scheduled_jobs(ran);
        drop(app);

        let mut reopened = crate::app::App::open(
            &crate::config::StorageConfig::rooted_at(dir.path()),
            std::sync::Arc::new(crate::metrics::MetricsCollector::new()),
            t0() + Duration::seconds(100),
        );
        assert_eq!(reopened.get_job(&id).unwrap().next_run, Some(ran + Duration::seconds(60)));
        assert_eq!(reopened.check_scheduled_jobs(ran + Duration::seconds(59)), 0);
        assert_eq!(reopened.check_scheduled_jobs(ran + Duration::seconds(60)), 1);
    }
}
