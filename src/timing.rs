use std::path::PathBuf;
use chrono::{Local, NaiveDateTime};
use log::{debug, error, info, warn};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, time::Duration};

use crate::jobs::{build_jobs, merge_new_jobs, JobStore};
use crate::models::NotificationJob;
use crate::schedule::seconds_until;
use crate::storage::StoreError;
use crate::telegram::DeliveryError;
use crate::types::{SharedTransport, SharedUsers};
use crate::users::load_roster;
use crate::util::{get_short_phone, Config};

/// What one pass over the job list did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub seeded: usize,
    pub sent: usize,
    pub unreachable: usize,
    pub deferred: usize,
    pub pruned: usize,
}

impl CycleReport {
    fn is_idle(&self) -> bool {
        *self == CycleReport::default()
    }
}

/// Append-only text file with one line per failed cycle or deferred send.
#[derive(Clone, Debug)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> ErrorLog {
        ErrorLog { path: path.into() }
    }

    pub async fn append(&self, now: NaiveDateTime, message: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        let line = format!("{} {}\n", now.format("%Y-%m-%d %H:%M:%S"), message.replace('\n', " "));
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

pub struct DeliveryLoop {
    jobs: JobStore,
    roster_path: PathBuf,
    users: SharedUsers,
    transport: SharedTransport,
    error_log: ErrorLog,
    reminder_text: String,
    send_timeout: Duration,
    poll_interval: Duration,
}

impl DeliveryLoop {
    pub fn new(config: &Config, users: SharedUsers, transport: SharedTransport) -> DeliveryLoop {
        DeliveryLoop {
            jobs: JobStore::new(config.jobs_path.clone()),
            roster_path: config.roster_path.clone(),
            users,
            transport,
            error_log: ErrorLog::new(config.error_log_path.clone()),
            reminder_text: config.reminder_text.clone(),
            send_timeout: config.send_timeout,
            poll_interval: config.poll_interval,
        }
    }

    /// Never returns. A failed cycle is logged and the next one starts after
    /// the usual sleep.
    pub async fn run(self) {
        info!("delivery_loop:: started, polling every {:?}", self.poll_interval);
        loop {
            self.tick(Local::now().naive_local()).await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One cycle with its failure recorded instead of returned.
    pub async fn tick(&self, now: NaiveDateTime) -> Option<CycleReport> {
        match self.run_cycle(now).await {
            Ok(report) => {
                if !report.is_idle() {
                    debug!("delivery_loop:: seeded {} sent {} unreachable {} deferred {} pruned {}",
                        report.seeded, report.sent, report.unreachable, report.deferred, report.pruned);
                }
                Some(report)
            }
            Err(e) => {
                error!("delivery_loop:: cycle failed: {e}");
                self.record_failure(now, &e.to_string()).await;
                None
            }
        }
    }

    async fn record_failure(&self, now: NaiveDateTime, message: &str) {
        if let Err(log_err) = self.error_log.append(now, message).await {
            error!("delivery_loop:: could not write error log: {log_err}");
        }
    }

    pub async fn run_cycle(&self, now: NaiveDateTime) -> Result<CycleReport, StoreError> {
        let mut report = CycleReport::default();
        let today = now.date();

        let roster = load_roster(&self.roster_path).await?;
        let registered = self.users.read().await.get_all_users();
        let mut jobs = self.jobs.load().await?;

        let built = build_jobs(&roster, &registered, today);
        let first_seed = jobs.is_empty();
        report.seeded = merge_new_jobs(&mut jobs, built);
        if first_seed && report.seeded > 0 {
            self.jobs.replace(&jobs).await?;
            jobs = self.jobs.load().await?;
        }

        let mut kept = Vec::with_capacity(jobs.len());
        for mut job in jobs {
            if job.sent {
                if job.occurrence() != today {
                    report.pruned += 1;
                } else {
                    kept.push(job);
                }
                continue;
            }

            if seconds_until(job.due_at, now) <= 0 {
                match self.deliver(&job).await {
                    Ok(()) => {
                        info!("delivery_loop:: reminder sent to uid {} (phone ...{})",
                            job.user_id, get_short_phone(job.phone_num));
                        job.sent = true;
                        report.sent += 1;
                    }
                    Err(e) if e.is_unreachable() => {
                        warn!("delivery_loop:: giving up on uid {}: {e}", job.user_id);
                        job.sent = true;
                        report.unreachable += 1;
                    }
                    Err(e) => {
                        warn!("delivery_loop:: uid {} will be retried: {e}", job.user_id);
                        self.record_failure(now, &format!("send to uid {} deferred: {e}", job.user_id)).await;
                        report.deferred += 1;
                    }
                }
            }
            kept.push(job);
        }

        self.jobs.replace(&kept).await?;
        Ok(report)
    }

    async fn deliver(&self, job: &NotificationJob) -> Result<(), DeliveryError> {
        let send = self.transport.send_message(job.user_id, &self.reminder_text);
        tokio::time::timeout(self.send_timeout, send)
            .await
            .unwrap_or(Err(DeliveryError::Timeout(self.send_timeout)))
    }
}

pub async fn start_delivery_loop(config: Config, users: SharedUsers, transport: SharedTransport) {
    DeliveryLoop::new(&config, users, transport).run().await
}
