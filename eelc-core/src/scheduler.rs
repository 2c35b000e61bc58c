//! Export job scheduler.
//!
//! Keeps a bounded pool of remote export jobs running. Each pass submits
//! queued requests in batches (never more than `max_running` in flight), then
//! polls every running job once and partitions the running list into jobs
//! that are still going and jobs that resolved. Resolved jobs are dropped
//! from the list and never polled again.
//!
//! All remote calls are awaited one at a time; concurrency exists only on the
//! service side. A job that fails to submit is recorded as failed. A status
//! query that errors leaves the job in place so the next pass retries it,
//! until `max_status_errors` consecutive errors mark it failed.
//! Nothing is cancelled on early exit: jobs already submitted keep running
//! remotely and are reported as abandoned.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::contract::{ComputeService, ExportJob, ExportRequest, JobStatus};

/// Passes between periodic progress lines.
const PROGRESS_EVERY: u64 = 10;

/// Scheduling knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// Maximum submissions per pass.
    pub batch_size: usize,
    /// Maximum jobs running remotely at once.
    pub max_running: usize,
    /// Sleep between polling passes while jobs are running.
    pub poll_interval: Duration,
    /// Only queue this many requests (dry run).
    pub dry_run: Option<usize>,
    /// Stop once this many jobs have finished.
    pub stop_after: Option<usize>,
    /// Consecutive status-query errors after which a job is recorded as failed.
    pub max_status_errors: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_running: 2000,
            poll_interval: Duration::ZERO,
            dry_run: None,
            stop_after: None,
            max_status_errors: 5,
        }
    }
}

/// How a single job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { destination_uri: Option<String> },
    Failed { error_message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub key: String,
    /// `None` when the job never made it past submission.
    pub job_id: Option<String>,
    pub outcome: Outcome,
}

/// Summary of a scheduling run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Requests accepted by the service.
    pub submitted: usize,
    pub completed: usize,
    /// Includes submission failures.
    pub failed: usize,
    pub outcomes: Vec<JobOutcome>,
    /// Jobs still running remotely when the loop stopped early.
    pub abandoned: Vec<ExportJob>,
    /// Requests never submitted because the loop stopped early.
    pub unsubmitted: usize,
    /// Polling passes performed.
    pub passes: u64,
}

impl ScheduleReport {
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    pub fn last_destination(&self) -> Option<&str> {
        self.outcomes.iter().rev().find_map(|o| match &o.outcome {
            Outcome::Completed { destination_uri } => destination_uri.as_deref(),
            Outcome::Failed { .. } => None,
        })
    }
}

/// Drives a queue of export requests to completion against a
/// [`ComputeService`].
pub struct Scheduler<'a, C: ComputeService + ?Sized> {
    service: &'a C,
    config: ScheduleConfig,
    queue: VecDeque<ExportRequest>,
    running: Vec<ExportJob>,
    report: ScheduleReport,
    total: usize,
    /// Consecutive status-query errors per running job id.
    status_errors: HashMap<String, usize>,
}

impl<'a, C: ComputeService + ?Sized> Scheduler<'a, C> {
    pub fn new(service: &'a C, mut config: ScheduleConfig, mut requests: Vec<ExportRequest>) -> Self {
        // A zero batch or cap would never make progress.
        config.batch_size = config.batch_size.max(1);
        config.max_running = config.max_running.max(1);
        config.max_status_errors = config.max_status_errors.max(1);
        if let Some(limit) = config.dry_run {
            if requests.len() > limit {
                info!(limit, requested = requests.len(), "Dry run: truncating export queue");
                requests.truncate(limit);
            }
        }
        let total = requests.len();
        Self {
            service,
            config,
            queue: requests.into(),
            running: Vec::new(),
            report: ScheduleReport::default(),
            total,
            status_errors: HashMap::new(),
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn running(&self) -> &[ExportJob] {
        &self.running
    }

    pub fn report(&self) -> &ScheduleReport {
        &self.report
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty()
    }

    fn should_stop_early(&self) -> bool {
        self.config
            .stop_after
            .is_some_and(|n| self.report.finished() >= n)
    }

    /// Submit up to one batch without exceeding the running cap.
    pub async fn submit_batch(&mut self) {
        let room = self.config.max_running.saturating_sub(self.running.len());
        let batch = self.config.batch_size.min(room);
        for _ in 0..batch {
            let Some(request) = self.queue.pop_front() else {
                break;
            };
            match self.service.submit_export(&request).await {
                Ok(job) => {
                    info!(
                        n = self.report.submitted,
                        job_id = %job.id,
                        key = %job.key,
                        "Submitted export job"
                    );
                    self.report.submitted += 1;
                    self.running.push(job);
                }
                Err(e) => {
                    error!(key = %request.key, error = %e, "Failed to submit export job");
                    self.report.failed += 1;
                    self.report.outcomes.push(JobOutcome {
                        key: request.key,
                        job_id: None,
                        outcome: Outcome::Failed {
                            error_message: e.to_string(),
                        },
                    });
                }
            }
            if self.queue.is_empty() {
                info!(submitted = self.report.submitted, "All export jobs submitted");
            }
        }
    }

    /// Poll every running job once, keeping the unresolved ones in order.
    pub async fn poll_running(&mut self) {
        let mut still_running = Vec::with_capacity(self.running.len());
        for job in std::mem::take(&mut self.running) {
            let status = self.service.job_status(&job.id).await;
            if status.is_ok() {
                self.status_errors.remove(&job.id);
            }
            match status {
                Ok(JobStatus::Completed { destination_uri }) => {
                    self.report.completed += 1;
                    info!(
                        job_id = %job.id,
                        key = %job.key,
                        destination = destination_uri.as_deref().unwrap_or(""),
                        "Completed: {}/{}",
                        self.report.finished(),
                        self.total
                    );
                    self.report.outcomes.push(JobOutcome {
                        key: job.key,
                        job_id: Some(job.id),
                        outcome: Outcome::Completed { destination_uri },
                    });
                }
                Ok(JobStatus::Failed { error_message }) => {
                    self.report.failed += 1;
                    error!(
                        job_id = %job.id,
                        key = %job.key,
                        error = %error_message,
                        "Failed: {}/{}",
                        self.report.finished(),
                        self.total
                    );
                    self.report.outcomes.push(JobOutcome {
                        key: job.key,
                        job_id: Some(job.id),
                        outcome: Outcome::Failed { error_message },
                    });
                }
                Ok(JobStatus::Pending | JobStatus::Running) => still_running.push(job),
                Err(e) => {
                    let errors = self.status_errors.entry(job.id.clone()).or_insert(0);
                    *errors += 1;
                    if *errors < self.config.max_status_errors {
                        warn!(job_id = %job.id, error = %e, attempt = *errors, "Status query failed, will retry");
                        still_running.push(job);
                        continue;
                    }
                    self.status_errors.remove(&job.id);
                    self.report.failed += 1;
                    error!(
                        job_id = %job.id,
                        key = %job.key,
                        error = %e,
                        "Giving up on job after repeated status errors"
                    );
                    self.report.outcomes.push(JobOutcome {
                        key: job.key,
                        job_id: Some(job.id),
                        outcome: Outcome::Failed {
                            error_message: format!("status query failed: {e}"),
                        },
                    });
                }
            }
        }
        self.running = still_running;
        self.report.passes += 1;

        if self.report.passes % PROGRESS_EVERY == 0 {
            info!(
                passes = self.report.passes,
                running = self.running.len(),
                queued = self.queue.len(),
                finished = self.report.finished(),
                last_destination = self.report.last_destination().unwrap_or(""),
                "Export progress"
            );
        }
    }

    /// Run until every request has resolved or `stop_after` is reached.
    pub async fn run(mut self) -> ScheduleReport {
        info!(
            jobs = self.total,
            batch_size = self.config.batch_size,
            max_running = self.config.max_running,
            "Starting export scheduler"
        );
        while !self.is_idle() {
            self.submit_batch().await;
            self.poll_running().await;

            if self.should_stop_early() {
                info!(
                    finished = self.report.finished(),
                    abandoned = self.running.len(),
                    unsubmitted = self.queue.len(),
                    "Stopping early"
                );
                break;
            }
            if !self.running.is_empty() && !self.config.poll_interval.is_zero() {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        self.report.abandoned = std::mem::take(&mut self.running);
        self.report.unsubmitted = self.queue.len();
        info!(
            submitted = self.report.submitted,
            completed = self.report.completed,
            failed = self.report.failed,
            "Export scheduler finished"
        );
        self.report
    }
}

/// Convenience wrapper: build a [`Scheduler`] and run it.
pub async fn run_exports<C>(
    service: &C,
    config: ScheduleConfig,
    requests: Vec<ExportRequest>,
) -> ScheduleReport
where
    C: ComputeService + ?Sized,
{
    Scheduler::new(service, config, requests).run().await
}
