use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use switchboard_core::{Clock, SwitchboardError, SwitchboardResult};
use switchboard_learning::SwitchPatternLearner;

/// Periodic learner housekeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceJob {
    /// Drop stale and weak patterns, re-detect and re-blend.
    OptimizePatterns,
    /// Drop insights past their retention window.
    PruneInsights,
}

impl MaintenanceJob {
    /// Run the job against `learner`.
    pub fn run(self, learner: &SwitchPatternLearner) {
        match self {
            MaintenanceJob::OptimizePatterns => {
                let report = learner.optimize();
                tracing::info!(
                    removed = report.removed,
                    detected = report.detected,
                    remaining = report.remaining,
                    "Scheduler: pattern optimization finished"
                );
            }
            MaintenanceJob::PruneInsights => {
                let removed = learner.prune_insights();
                tracing::info!(removed, "Scheduler: insight pruning finished");
            }
        }
    }
}

/// A single scheduled job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub name: String,
    pub cron_expression: String,
    pub job: MaintenanceJob,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScheduledJob {
    pub fn new(name: impl Into<String>, cron_expression: impl Into<String>, job: MaintenanceJob) -> Self {
        Self {
            name: name.into(),
            cron_expression: cron_expression.into(),
            job,
            enabled: true,
        }
    }
}

/// Hourly optimization and daily insight pruning.
pub fn default_maintenance() -> Vec<ScheduledJob> {
    vec![
        ScheduledJob::new("optimize-patterns", "0 0 * * * * *", MaintenanceJob::OptimizePatterns),
        ScheduledJob::new("prune-insights", "0 0 0 * * * *", MaintenanceJob::PruneInsights),
    ]
}

/// Cron-based scheduler that manages a collection of [`ScheduledJob`]s.
#[derive(Debug)]
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    /// Create a new scheduler with the given jobs.
    pub fn new(jobs: Vec<ScheduledJob>) -> Self {
        Self { jobs }
    }

    /// Parse a cron expression string into a [`cron::Schedule`].
    ///
    /// Uses the 7-field cron format: sec min hour day-of-month month day-of-week year.
    pub fn parse_cron(cron_expr: &str) -> SwitchboardResult<Schedule> {
        Schedule::from_str(cron_expr).map_err(|e| {
            SwitchboardError::Config(format!("Invalid cron expression '{cron_expr}': {e}"))
        })
    }

    /// First fire time of `cron_expr` strictly after `after`.
    pub fn next_fire_after(cron_expr: &str, after: DateTime<Utc>) -> SwitchboardResult<DateTime<Utc>> {
        let schedule = Self::parse_cron(cron_expr)?;
        schedule.after(&after).next().ok_or_else(|| {
            SwitchboardError::Config(format!(
                "Cron expression '{cron_expr}' has no upcoming fire times"
            ))
        })
    }

    /// Compute the next fire time for a given cron expression.
    pub fn next_fire_time(cron_expr: &str) -> SwitchboardResult<DateTime<Utc>> {
        Self::next_fire_after(cron_expr, Utc::now())
    }

    /// Check every job's cron expression.
    pub fn validate(&self) -> SwitchboardResult<()> {
        for job in &self.jobs {
            Self::parse_cron(&job.cron_expression)?;
        }
        Ok(())
    }

    /// Return references to only the enabled jobs.
    pub fn enabled_jobs(&self) -> Vec<&ScheduledJob> {
        self.jobs.iter().filter(|j| j.enabled).collect()
    }

    /// Return the total number of jobs (enabled and disabled).
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Enabled jobs due in the half-open window `(from, to]`.
    pub fn due_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<&ScheduledJob> {
        self.enabled_jobs()
            .into_iter()
            .filter(|job| {
                Self::next_fire_after(&job.cron_expression, from).is_ok_and(|next| next <= to)
            })
            .collect()
    }

    /// Start the scheduler background loop.
    ///
    /// Spawns a tokio task that continuously:
    /// 1. Computes the next fire time for each enabled job.
    /// 2. Sleeps until the nearest fire time.
    /// 3. Runs every job whose fire time falls within a 1-second tolerance window.
    ///
    /// Fire times are computed against `clock`; the sleeps between them run
    /// on tokio time.
    ///
    /// Returns the [`tokio::task::JoinHandle`] so the caller can abort or await it.
    pub fn start(
        self,
        learner: Arc<SwitchPatternLearner>,
        clock: Arc<dyn Clock>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let enabled = self.enabled_jobs();

                if enabled.is_empty() {
                    tracing::info!("Scheduler: no enabled jobs, sleeping 60s");
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    continue;
                }

                let mut nearest: Option<DateTime<Utc>> = None;
                let mut job_times: Vec<(&ScheduledJob, DateTime<Utc>)> = Vec::new();

                for job in &enabled {
                    match Self::next_fire_after(&job.cron_expression, clock.now()) {
                        Ok(next) => {
                            job_times.push((job, next));
                            nearest = Some(nearest.map_or(next, |cur| cur.min(next)));
                        }
                        Err(e) => {
                            tracing::warn!(job = %job.name, error = %e, "Scheduler: skipping job");
                        }
                    }
                }

                let Some(nearest) = nearest else {
                    tracing::warn!(
                        "Scheduler: all enabled jobs have invalid cron expressions, sleeping 60s"
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    continue;
                };

                let now = clock.now();
                if nearest > now {
                    let wait = (nearest - now).to_std().unwrap_or_default();
                    tracing::debug!(?wait, "Scheduler: sleeping until next job");
                    tokio::time::sleep(wait).await;
                }

                let fire_threshold = clock.now() + chrono::Duration::seconds(1);
                for (job, fire_time) in &job_times {
                    if *fire_time <= fire_threshold {
                        tracing::info!(job = %job.name, "Scheduler: firing job");
                        job.job.run(&learner);
                    }
                }
            }
        })
    }
}
