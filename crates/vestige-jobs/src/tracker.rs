//! Job lifecycle tracker.
//!
//! The tracker is what analysis producers call to register a job and report
//! on it. It drives the single forward state machine
//!
//! ```text
//! PENDING -> PROCESSING -> COMPLETED | PARTIAL | FAILED
//! ```
//!
//! with PENDING allowed to jump straight to a terminal state. Every applied
//! write publishes a lifecycle event for the job's owner.
//!
//! Reporting must never take a producer down: once a job exists, storage
//! failures in [`JobLifecycleTracker::progress`] and
//! [`JobLifecycleTracker::complete`] are logged and turned into `None`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vestige_core::{
    clamp_progress, defaults, Error, EventPublisher, JobEvent, JobRecord, JobStatus, JobStore,
    JobType, JobUpdate, JobWrite, NewJob, Result,
};

/// Configuration for the job tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How long a record stays readable after creation, and again after
    /// its terminal write.
    pub retention: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retention: Duration::days(defaults::JOB_RETENTION_DAYS),
        }
    }
}

impl TrackerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_RETENTION_DAYS` | `7` | Days a job record stays readable |
    pub fn from_env() -> Self {
        let days = match std::env::var("JOB_RETENTION_DAYS") {
            Ok(v) => match v.parse::<i64>() {
                Ok(days) if days >= 0 => days,
                _ => {
                    warn!(
                        subsystem = "jobs",
                        component = "tracker",
                        value = %v,
                        "Invalid JOB_RETENTION_DAYS, using default"
                    );
                    defaults::JOB_RETENTION_DAYS
                }
            },
            Err(_) => defaults::JOB_RETENTION_DAYS,
        };

        Self {
            retention: Duration::days(days),
        }
    }

    /// Set the retention period.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

/// Records job progress and notifies the job's owner.
#[derive(Clone)]
pub struct JobLifecycleTracker {
    store: Arc<dyn JobStore>,
    events: Arc<dyn EventPublisher>,
    config: TrackerConfig,
}

impl JobLifecycleTracker {
    pub fn new(
        store: Arc<dyn JobStore>,
        events: Arc<dyn EventPublisher>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Register a new PENDING job and announce it.
    ///
    /// Unlike the reporting calls, failures here reach the caller: without a
    /// stored record there is no job id to report against.
    pub async fn create(
        &self,
        owner_id: &str,
        job_type: JobType,
        title: impl Into<String>,
        input_data: Option<JsonValue>,
    ) -> Result<Uuid> {
        let job = self
            .store
            .insert(NewJob {
                owner_id: owner_id.to_string(),
                job_type,
                title: title.into(),
                input_data,
                retention: self.config.retention,
            })
            .await?;

        info!(
            subsystem = "jobs",
            component = "tracker",
            op = "create",
            owner_id,
            job_id = %job.job_id,
            job_type = %job.job_type,
            "Job created"
        );

        self.events.publish(
            owner_id,
            JobEvent::JobStarted {
                job_id: job.job_id,
                job_type: job.job_type,
                status: job.status,
                title: job.title,
            },
        );
        Ok(job.job_id)
    }

    /// Report progress on a running job.
    ///
    /// The job moves to PROCESSING on its first report. Percent is clamped to
    /// 0..=100 and never decreases. Terminal statuses are not accepted here;
    /// use [`JobLifecycleTracker::complete`]. Returns the record after the
    /// write, or `None` if nothing was written.
    pub async fn progress(
        &self,
        owner_id: &str,
        job_id: Uuid,
        status: Option<JobStatus>,
        progress_percent: Option<i32>,
        message: Option<String>,
    ) -> Option<JobRecord> {
        if let Some(status) = status.filter(|s| s.is_terminal()) {
            warn!(
                subsystem = "jobs",
                component = "tracker",
                op = "progress",
                job_id = %job_id,
                status = %status,
                "Terminal status passed to progress, ignored"
            );
            return None;
        }

        let update = JobUpdate {
            status: Some(JobStatus::Processing),
            progress_percent: progress_percent.map(clamp_progress),
            message: message.clone(),
            ..Default::default()
        };

        let job = self.write(owner_id, job_id, update, "progress").await?;
        debug!(
            subsystem = "jobs",
            component = "tracker",
            op = "progress",
            job_id = %job_id,
            progress = job.progress_percent,
            "Job progress recorded"
        );

        self.events.publish(
            owner_id,
            JobEvent::JobProgress {
                job_id,
                status: job.status,
                progress_percent: job.progress_percent,
                message,
            },
        );
        Some(job)
    }

    /// Write the job's single terminal state.
    ///
    /// COMPLETED clears errors and sets percent to 100. PARTIAL and FAILED
    /// keep `errors` and publish `job_failed` with the first of them. A
    /// second call on the same job writes and publishes nothing.
    pub async fn complete(
        &self,
        owner_id: &str,
        job_id: Uuid,
        status: JobStatus,
        output_data: Option<JsonValue>,
        errors: Vec<String>,
    ) -> Option<JobRecord> {
        let Some(message) = status.terminal_message() else {
            warn!(
                subsystem = "jobs",
                component = "tracker",
                op = "complete",
                job_id = %job_id,
                status = %status,
                "Non-terminal status passed to complete, ignored"
            );
            return None;
        };

        let start = Instant::now();
        let completed = status == JobStatus::Completed;
        let update = JobUpdate {
            status: Some(status),
            progress_percent: completed.then_some(defaults::PROGRESS_MAX),
            message: Some(message.to_string()),
            output_data,
            errors: Some(if completed { Vec::new() } else { errors }),
            retention: Some(self.config.retention),
        };

        let job = self.write(owner_id, job_id, update, "complete").await?;
        info!(
            subsystem = "jobs",
            component = "tracker",
            op = "complete",
            owner_id,
            job_id = %job_id,
            job_type = %job.job_type,
            status = %job.status,
            error_count = job.errors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Job finished"
        );

        let event = if completed {
            JobEvent::JobCompleted {
                job_id,
                status: job.status,
            }
        } else {
            JobEvent::JobFailed {
                job_id,
                status: job.status,
                error: job.errors.first().cloned(),
            }
        };
        self.events.publish(owner_id, event);
        Some(job)
    }

    /// Apply an update, absorbing every outcome other than a fresh write.
    async fn write(
        &self,
        owner_id: &str,
        job_id: Uuid,
        update: JobUpdate,
        op: &'static str,
    ) -> Option<JobRecord> {
        match self.store.update(owner_id, job_id, update).await {
            Ok(JobWrite::Applied(job)) => Some(job),
            Ok(JobWrite::Terminal(job)) => {
                debug!(
                    subsystem = "jobs",
                    component = "tracker",
                    op,
                    job_id = %job_id,
                    status = %job.status,
                    "Job already terminal, update skipped"
                );
                None
            }
            Err(Error::NotFound(_)) => {
                warn!(
                    subsystem = "jobs",
                    component = "tracker",
                    op,
                    owner_id,
                    job_id = %job_id,
                    "Update for unknown job ignored"
                );
                None
            }
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "tracker",
                    op,
                    job_id = %job_id,
                    error = %e,
                    "Job update failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_config_default() {
        let config = TrackerConfig::default();
        assert_eq!(config.retention, Duration::days(7));
    }

    #[test]
    fn test_tracker_config_with_retention() {
        let config = TrackerConfig::default().with_retention(Duration::hours(1));
        assert_eq!(config.retention, Duration::hours(1));
    }
}
