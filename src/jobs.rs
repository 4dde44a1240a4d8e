use std::{collections::HashSet, path::PathBuf};
use chrono::NaiveDate;
use log::debug;

use crate::models::{NotificationJob, RegisteredUser, RosterEntry};
use crate::schedule;
use crate::storage::{self, StoreError};
use crate::util::get_short_phone;

/// The persisted job list. Only the delivery loop calls [`JobStore::replace`];
/// anyone else reading it may see the previous cycle's state.
#[derive(Clone, Debug)]
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> JobStore {
        JobStore { path: path.into() }
    }

    /// Creates an empty job file on first use.
    pub async fn load(&self) -> Result<Vec<NotificationJob>, StoreError> {
        storage::read_json_or_init(&self.path).await
    }

    /// Read-only view for readers other than the delivery loop. A missing
    /// file reads as empty and is not created.
    pub async fn snapshot(&self) -> Result<Vec<NotificationJob>, StoreError> {
        Ok(storage::read_json(&self.path).await?.unwrap_or_default())
    }

    pub async fn replace(&self, jobs: &[NotificationJob]) -> Result<(), StoreError> {
        storage::write_json_atomic(&self.path, jobs).await
    }
}

/// Jobs for every registered roster entry whose schedule fires on `today`.
///
/// Entries with an unparsable schedule, no occurrence today, or no registered
/// user with the same phone number are skipped.
pub fn build_jobs(roster: &[RosterEntry], registered: &[RegisteredUser], today: NaiveDate) -> Vec<NotificationJob> {
    let mut jobs = Vec::new();
    for entry in roster {
        let rule = match schedule::parse(&entry.clean_time) {
            Ok(rule) => rule,
            Err(e) => {
                debug!("build_jobs:: phone ...{} skipped: {e}", get_short_phone(entry.phone_num));
                continue;
            }
        };
        let Some(due_at) = schedule::resolve(&rule, today) else {
            continue;
        };
        let Some(user) = registered.iter().find(|u| u.phone_num == entry.phone_num) else {
            continue;
        };
        jobs.push(NotificationJob::new(user.uid, user.phone_num, due_at));
    }
    jobs
}

/// Appends the built jobs that do not already have a job for the same user and
/// day, returning how many were added.
pub fn merge_new_jobs(existing: &mut Vec<NotificationJob>, built: Vec<NotificationJob>) -> usize {
    let mut taken: HashSet<(i64, NaiveDate)> = existing
        .iter()
        .map(|job| (job.user_id, job.occurrence()))
        .collect();

    let before = existing.len();
    for job in built {
        if taken.insert((job.user_id, job.occurrence())) {
            existing.push(job);
        }
    }
    existing.len() - before
}
