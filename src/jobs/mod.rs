//! Scheduled Jobs
//!
//! Background jobs that drain the posting outbox and return stale claims to
//! the queue.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Config;
use crate::outbox::{OutboxReport, OutboxService};
use crate::store::StoreError;

// =========================================================================
// Outbox Drain Job
// =========================================================================

/// Run one outbox batch through the posting engine
pub async fn drain_outbox(
    outbox: &OutboxService,
    batch_size: i64,
    max_attempts: i32,
) -> Result<OutboxReport, JobError> {
    Ok(outbox.process_batch(batch_size, max_attempts).await?)
}

// =========================================================================
// Stale Claim Reset Job
// =========================================================================

/// Return rows stuck in processing (worker crashed mid-batch) to the queue
pub async fn reset_stale_claims(
    outbox: &OutboxService,
    stale_after: Duration,
    max_attempts: i32,
) -> Result<u64, JobError> {
    Ok(outbox.reset_stale(stale_after, max_attempts).await?)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval between outbox batches (default: 5 seconds)
    pub outbox_poll_interval: Duration,
    /// Interval for the stale claim check (default: 1 minute)
    pub stale_check_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
    /// Claims older than this are considered abandoned (default: 5 minutes)
    pub stale_after: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            outbox_poll_interval: Duration::from_secs(5),
            stale_check_interval: Duration::from_secs(60),
            batch_size: 50,
            max_attempts: 5,
            stale_after: Duration::from_secs(300),
        }
    }
}

impl From<&Config> for JobSchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            outbox_poll_interval: config.outbox_poll_interval,
            batch_size: config.outbox_batch_size,
            max_attempts: config.outbox_max_attempts,
            stale_after: config.outbox_stale_after,
            ..Default::default()
        }
    }
}

/// Job Scheduler - runs the outbox worker
pub struct JobScheduler {
    outbox: OutboxService,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(outbox: OutboxService) -> Self {
        Self {
            outbox,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(outbox: OutboxService, config: JobSchedulerConfig) -> Self {
        Self { outbox, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!(
            poll_interval_ms = self.config.outbox_poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Job scheduler started"
        );

        let mut outbox_interval = interval(self.config.outbox_poll_interval);
        outbox_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stale_interval = interval(self.config.stale_check_interval);
        stale_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = outbox_interval.tick() => {
                    if let Err(e) = drain_outbox(&self.outbox, self.config.batch_size, self.config.max_attempts).await {
                        tracing::error!(error = %e, "Outbox drain failed");
                    }
                }
                _ = stale_interval.tick() => {
                    if let Err(e) = reset_stale_claims(&self.outbox, self.config.stale_after, self.config.max_attempts).await {
                        tracing::error!(error = %e, "Stale claim reset failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match reset_stale_claims(&self.outbox, self.config.stale_after, self.config.max_attempts).await {
            Ok(count) => report.stale_claims_reset = count,
            Err(e) => report.errors.push(format!("Stale claim reset: {}", e)),
        }

        match drain_outbox(&self.outbox, self.config.batch_size, self.config.max_attempts).await {
            Ok(outbox) => report.outbox = outbox,
            Err(e) => report.errors.push(format!("Outbox drain: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub outbox: OutboxReport,
    pub stale_claims_reset: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =========================================================================
// Tests
// =========================================================================
