use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

const MAX_DURATION_SAMPLES: usize = 100;

/// Execution counters in Prometheus text format. Lives outside the app lock
/// so it can be read while a long script holds it.
pub struct MetricsCollector {
    job_executions: DashMap<String, AtomicU64>,
    job_successes: DashMap<String, AtomicU64>,
    job_failures: DashMap<String, AtomicU64>,
    job_durations: DashMap<String, Vec<u64>>,
    scheduler_checks: AtomicU64,
    enabled_jobs: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            job_executions: DashMap::new(),
            job_successes: DashMap::new(),
            job_failures: DashMap::new(),
            job_durations: DashMap::new(),
            scheduler_checks: AtomicU64::new(0),
            enabled_jobs: AtomicU64::new(0),
        }
    }

    fn bump(map: &DashMap<String, AtomicU64>, job_id: &str) {
        map.entry(job_id.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one execution; `duration_ms` is `None` when no process ran.
    pub fn record_execution(&self, job_id: &str, success: bool, duration_ms: Option<u64>) {
        Self::bump(&self.job_executions, job_id);
        if success {
            Self::bump(&self.job_successes, job_id);
        } else {
            Self::bump(&self.job_failures, job_id);
        }

        if let Some(ms) = duration_ms {
            let mut samples = self.job_durations.entry(job_id.to_string()).or_default();
            samples.push(ms);
            let len = samples.len();
            if len > MAX_DURATION_SAMPLES {
                samples.drain(0..len - MAX_DURATION_SAMPLES);
            }
        }
    }

    pub fn increment_scheduler_checks(&self) {
        self.scheduler_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_enabled_jobs(&self, count: u64) {
        self.enabled_jobs.store(count, Ordering::Relaxed);
    }

    pub fn export(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP scriptsched_scheduler_checks_total Total number of due-job checks\n");
        out.push_str("# TYPE scriptsched_scheduler_checks_total counter\n");
        let _ = writeln!(
            out,
            "scriptsched_scheduler_checks_total {}\n",
            self.scheduler_checks.load(Ordering::Relaxed)
        );

        out.push_str("# HELP scriptsched_enabled_jobs Jobs currently scheduled\n");
        out.push_str("# TYPE scriptsched_enabled_jobs gauge\n");
        let _ = writeln!(
            out,
            "scriptsched_enabled_jobs {}\n",
            self.enabled_jobs.load(Ordering::Relaxed)
        );

        for (name, help, map) in [
            ("scriptsched_job_executions_total", "Total number of job executions", &self.job_executions),
            ("scriptsched_job_successes_total", "Total number of successful job executions", &self.job_successes),
            ("scriptsched_job_failures_total", "Total number of failed job executions", &self.job_failures),
        ] {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let mut rows: Vec<(String, u64)> = map
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect();
            rows.sort();
            for (job_id, count) in rows {
                let _ = writeln!(out, "{}{{job_id=\"{}\"}} {}", name, job_id, count);
            }
            out.push('\n');
        }

        out.push_str("# HELP scriptsched_job_duration_ms Job execution duration percentiles\n");
        out.push_str("# TYPE scriptsched_job_duration_ms gauge\n");
        for entry in self.job_durations.iter() {
            let mut durations = entry.value().clone();
            if durations.is_empty() {
                continue;
            }
            durations.sort_unstable();
            for (quantile, p) in [("0.5", 50.0), ("0.95", 95.0), ("0.99", 99.0)] {
                let _ = writeln!(
                    out,
                    "scriptsched_job_duration_ms{{job_id=\"{}\",quantile=\"{}\"}} {}",
                    entry.key(),
                    quantile,
                    percentile(&durations, p)
                );
            }
        }

        out
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted_data: &[u64], p: f64) -> u64 {
    if sorted_data.is_empty() {
        return 0;
    }
    let index = ((p / 100.0) * (sorted_data.len() as f64 - 1.0)).round() as usize;
    sorted_data[index.min(sorted_data.len() - 1)]
}
