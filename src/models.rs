use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const JOB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of the externally maintained roster (`assets/users.json`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RosterEntry {
    #[serde(rename = "adress")]
    pub address: String,
    pub full_name: String,
    pub phone_num: i64,
    pub clean_time: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserRole {
    #[serde(rename = "Пользователь")]
    User,
    #[serde(rename = "Менеджер")]
    Manager,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegisteredUser {
    pub uid: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub full_name: String,
    pub phone_num: i64,
    pub role: UserRole,
    pub created: String,
    pub updated: String,
}

impl RegisteredUser {
    pub fn is_manager(&self) -> bool {
        self.role == UserRole::Manager
    }
}

/// A reminder for one user and one occurrence, as stored in the job file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NotificationJob {
    #[serde(rename = "uid")]
    pub user_id: i64,
    pub phone_num: i64,
    #[serde(rename = "job_at", with = "job_time")]
    pub due_at: NaiveDateTime,
    pub sent: bool,
}

impl NotificationJob {
    pub fn new(user_id: i64, phone_num: i64, due_at: NaiveDateTime) -> NotificationJob {
        NotificationJob { user_id, phone_num, due_at, sent: false }
    }

    pub fn occurrence(&self) -> NaiveDate {
        self.due_at.date()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Review {
    pub uid: i64,
    pub score: u8,
    pub occurrence: NaiveDate,
    pub created: String,
}

// Request payloads for the HTTP surface.

#[derive(Deserialize, Clone, Debug)]
pub struct AuthData {
    pub uid: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub phone_num: i64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RoleChangeData {
    pub requester_uid: i64,
    pub target_uid: i64,
    pub role: UserRole,
    pub password: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RosterUpload {
    pub requester_uid: i64,
    pub entries: Vec<RosterEntry>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ReviewData {
    pub uid: i64,
    pub score: u8,
}

mod job_time {
    use chrono::NaiveDateTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::JOB_TIME_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(JOB_TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Older files may carry fractional seconds after the last field.
        let trimmed = raw.split('.').next().unwrap_or(&raw);
        NaiveDateTime::parse_from_str(trimmed, JOB_TIME_FORMAT).map_err(D::Error::custom)
    }
}
