use std::path::PathBuf;
use chrono::NaiveDateTime;
use log::info;

use crate::models::{NotificationJob, Review, JOB_TIME_FORMAT};
use crate::storage::{self, StoreError};

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("score {0} is outside 1..=10")]
    ScoreOutOfRange(u8),

    #[error("user {0} had no cleaning reminder today")]
    NoCleaningToday(i64),

    #[error("user {0} already rated today's cleaning")]
    AlreadyReviewed(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Satisfaction reviews, appended to a JSON file.
#[derive(Clone, Debug)]
pub struct ReviewStore {
    path: PathBuf,
}

impl ReviewStore {
    pub fn new(path: impl Into<PathBuf>) -> ReviewStore {
        ReviewStore { path: path.into() }
    }

    pub async fn load(&self) -> Result<Vec<Review>, StoreError> {
        storage::read_json_or_init(&self.path).await
    }

    /// Records a review for today's cleaning. `jobs` is whatever the job file
    /// held at the time; the user must have been sent a reminder for today
    /// and may rate each cleaning once.
    pub async fn submit(&self, uid: i64, score: u8, jobs: &[NotificationJob], now: NaiveDateTime)
        -> Result<Review, ReviewError> {

        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(ReviewError::ScoreOutOfRange(score));
        }
        let today = now.date();
        if !jobs.iter().any(|job| job.user_id == uid && job.sent && job.occurrence() == today) {
            return Err(ReviewError::NoCleaningToday(uid));
        }

        let mut reviews = self.load().await?;
        if reviews.iter().any(|r| r.uid == uid && r.occurrence == today) {
            return Err(ReviewError::AlreadyReviewed(uid));
        }

        let review = Review {
            uid,
            score,
            occurrence: today,
            created: now.format(JOB_TIME_FORMAT).to_string(),
        };
        reviews.push(review.clone());
        storage::write_json_atomic(&self.path, &reviews).await?;

        info!("reviews:: uid {uid} rated {today} cleaning {score}/{MAX_SCORE}");
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, JOB_TIME_FORMAT).unwrap()
    }

    fn sent_job(uid: i64, due_at: &str) -> NotificationJob {
        NotificationJob { sent: true, ..NotificationJob::new(uid, 79000000001, at(due_at)) }
    }

    #[tokio::test]
    async fn test_submit_after_reminder() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReviewStore::new(dir.path().join("reviews.json"));
        let jobs = vec![sent_job(7, "2026-10-17 20:00:00")];

        let review = store.submit(7, 9, &jobs, at("2026-10-17 20:30:00")).await.unwrap();
        assert_eq!(review.score, 9);
        assert_eq!(store.load().await.unwrap(), vec![review]);
    }

    #[tokio::test]
    async fn test_score_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReviewStore::new(dir.path().join("reviews.json"));
        let jobs = vec![sent_job(7, "2026-10-17 20:00:00")];
        let now = at("2026-10-17 20:30:00");

        assert!(matches!(store.submit(7, 0, &jobs, now).await, Err(ReviewError::ScoreOutOfRange(0))));
        assert!(matches!(store.submit(7, 11, &jobs, now).await, Err(ReviewError::ScoreOutOfRange(11))));
        assert!(store.submit(7, 10, &jobs, now).await.is_ok());

        let other = vec![sent_job(8, "2026-10-17 20:00:00")];
        assert!(store.submit(8, 1, &other, now).await.is_ok());
        assert_eq!(store.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_one_review_per_cleaning() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReviewStore::new(dir.path().join("reviews.json"));
        let jobs = vec![sent_job(7, "2026-10-17 20:00:00")];

        store.submit(7, 9, &jobs, at("2026-10-17 20:30:00")).await.unwrap();
        let again = store.submit(7, 2, &jobs, at("2026-10-17 21:00:00")).await;
        assert!(matches!(again, Err(ReviewError::AlreadyReviewed(7))));

        let reviews = store.load().await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].score, 9);

        let tomorrow = vec![sent_job(7, "2026-10-18 20:00:00")];
        assert!(store.submit(7, 4, &tomorrow, at("2026-10-18 20:30:00")).await.is_ok());
    }

    #[tokio::test]
    async fn test_requires_todays_sent_reminder() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReviewStore::new(dir.path().join("reviews.json"));
        let now = at("2026-10-17 20:30:00");

        let pending = vec![NotificationJob::new(7, 79000000001, at("2026-10-17 20:00:00"))];
        assert!(matches!(store.submit(7, 5, &pending, now).await, Err(ReviewError::NoCleaningToday(7))));

        let yesterday = vec![sent_job(7, "2026-10-16 20:00:00")];
        assert!(matches!(store.submit(7, 5, &yesterday, now).await, Err(ReviewError::NoCleaningToday(7))));
    }
}
