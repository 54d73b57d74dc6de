use crate::app::App;
use chrono::{DateTime, Utc};
use common::{Reply, Request, Response};

/// Serves one request against the shared state. Due jobs are run first, so
/// every interaction sees an up-to-date schedule.
pub fn handle_request(app: &mut App, req: Request, now: DateTime<Utc>) -> Reply {
    let executed = app.check_scheduled_jobs(now);
    if executed > 0 {
        log::info!("Ran {} due job(s) before serving request", executed);
    }

    let response = match req {
        Request::CreateJob(spec) => match app.create_job(spec, now) {
            Ok(id) => Response::Created(id),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::UpdateJob(id, spec) => match app.update_job(&id, spec, now) {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::ToggleJob(id) => match app.toggle_enabled(&id, now) {
            Ok(_) => app
                .get_job(&id)
                .map_or_else(|e| Response::Error(e.to_string()), Response::JobDetail),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::RemoveJob(id) => match app.delete_job(&id) {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::ListJobs => Response::JobList(app.list_jobs()),
        Request::GetJob(id) => app
            .get_job(&id)
            .map_or_else(|e| Response::Error(e.to_string()), Response::JobDetail),
        Request::GetScript(id) => app
            .job_script(&id)
            .map_or_else(|e| Response::Error(e.to_string()), Response::Script),
        Request::RunJob { id, arguments } => match app.run_job_now(&id, arguments, now) {
            Ok((success, output)) => Response::RunResult { success, output },
            Err(e) => Response::Error(e.to_string()),
        },
        Request::CheckScheduled => Response::Checked { executed },
        Request::GetHistory { job_name } => Response::HistoryList(app.list_history(job_name.as_deref())),
        Request::ListTemplates => Response::TemplateList(app.list_templates()),
        Request::SaveTemplate(template) => match app.save_template(&template) {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::DeleteTemplate(name) => match app.delete_template(&name) {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::CreateFromTemplate {
            template,
            name,
            arguments,
        } => match app.create_job_from_template(&template, &name, arguments, now) {
            Ok(id) => Response::Created(id),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Summary => Response::Summary(app.summary()),
        Request::Metrics => Response::Metrics(app.metrics().export()),
    };

    Reply {
        warnings: app.take_warnings(),
        response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{open, shell_job, t0};
    use chrono::Duration;
    use common::JobId;
    use tempfile::TempDir;

    fn created(reply: Reply) -> JobId {
        match reply.response {
            Response::Created(id) => id,
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_create_then_list() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        let id = created(handle_request(&mut app, Request::CreateJob(shell_job("a", "true")), t0()));

        match handle_request(&mut app, Request::ListJobs, t0()).response {
            Response::JobList(jobs) => {
                assert_eq!(jobs.len(), 1);
                assert_eq!(jobs[0].job.id, id);
                assert_eq!(jobs[0].next_run, Some(t0() + Duration::seconds(60)));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_missing_job_is_an_error_response() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        let ghost = JobId::from("ghost");
        for req in [
            Request::ToggleJob(ghost.clone()),
            Request::RemoveJob(ghost.clone()),
            Request::GetJob(ghost.clone()),
            Request::GetScript(ghost.clone()),
            Request::RunJob { id: ghost.clone(), arguments: None },
            Request::UpdateJob(ghost.clone(), shell_job("x", "true")),
        ] {
            match handle_request(&mut app, req, t0()).response {
                Response::Error(msg) => assert_eq!(msg, "Job not found: ghost"),
                other => panic!("unexpected response: {:?}", other),
            }
        }
    }

    #[test]
    fn test_zero_interval_job_never_reaches_the_scheduler() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        let mut spec = shell_job("spin", "true");
        spec.interval_value = 0;
        match handle_request(&mut app, Request::CreateJob(spec), t0()).response {
            Response::Error(msg) => assert_eq!(msg, "Interval must be at least 1, got 0"),
            other => panic!("unexpected response: {:?}", other),
        }
        for _ in 0..3 {
            assert_eq!(app.check_scheduled_jobs(t0()), 0);
        }
        assert!(app.list_history(None).is_empty());
    }

    #[test]
    fn test_toggle_returns_updated_view() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        let id = created(handle_request(&mut app, Request::CreateJob(shell_job("a", "true")), t0()));
        match handle_request(&mut app, Request::ToggleJob(id), t0()).response {
            Response::JobDetail(view) => {
                assert!(!view.job.enabled);
                assert_eq!(view.next_run, None);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_every_request_checks_due_jobs_first() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        handle_request(&mut app, Request::CreateJob(shell_job("a", "true")), t0());

        match handle_request(&mut app, Request::Summary, t0() + Duration::seconds(61)).response {
            Response::Summary(summary) => assert_eq!(summary.recent.len(), 1),
            other => panic!("unexpected response: {:?}", other),
        }
        match handle_request(&mut app, Request::CheckScheduled, t0() + Duration::seconds(62)).response {
            Response::Checked { executed } => assert_eq!(executed, 0),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_metrics_request() {
        let dir = TempDir::new().unwrap();
        let mut app = open(&dir);
        match handle_request(&mut app, Request::Metrics, t0()).response {
            Response::Metrics(text) => assert!(text.contains("scriptsched_scheduler_checks_total 1")),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
