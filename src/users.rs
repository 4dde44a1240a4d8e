use std::path::{Path, PathBuf};
use chrono::NaiveDateTime;
use log::info;

use crate::models::{AuthData, RegisteredUser, RosterEntry, UserRole, JOB_TIME_FORMAT};
use crate::storage::{self, StoreError};
use crate::util::get_short_phone;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("phone ...{0} is not in the roster")]
    NotInRoster(String),

    #[error("no registered user with uid {0}")]
    UnknownUser(i64),

    #[error("user {0} may not do this")]
    Forbidden(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reads the roster. A roster that has not been synced yet is empty.
pub async fn load_roster(path: &Path) -> Result<Vec<RosterEntry>, StoreError> {
    Ok(storage::read_json(path).await?.unwrap_or_default())
}

pub async fn save_roster(path: &Path, entries: &[RosterEntry]) -> Result<(), StoreError> {
    storage::write_json_atomic(path, entries).await
}

/// New registered user from a roster row and the chat profile that
/// authenticated with its phone number.
pub fn build_user(entry: &RosterEntry, auth: &AuthData, now: NaiveDateTime) -> RegisteredUser {
    let now = now.format(JOB_TIME_FORMAT).to_string();
    RegisteredUser {
        uid: auth.uid,
        username: auth.username.clone(),
        first_name: auth.first_name.clone(),
        full_name: entry.full_name.clone(),
        phone_num: entry.phone_num,
        role: UserRole::User,
        created: now.clone(),
        updated: now,
    }
}

/// Users who completed phone authentication, kept in a JSON file.
///
/// Shared as `Arc<RwLock<UserStore>>`: the HTTP handlers write, the delivery
/// loop takes a snapshot each cycle.
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    users: Vec<RegisteredUser>,
}

impl UserStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<UserStore, StoreError> {
        let path = path.into();
        let users = storage::read_json_or_init(&path).await?;
        Ok(UserStore { path, users })
    }

    pub fn get_all_users(&self) -> Vec<RegisteredUser> {
        self.users.clone()
    }

    pub fn get(&self, uid: i64) -> Option<&RegisteredUser> {
        self.users.iter().find(|u| u.uid == uid)
    }

    /// Registers `auth.uid` if its phone number is on the roster. A returning
    /// uid keeps its role and creation time.
    pub async fn authenticate(&mut self, roster: &[RosterEntry], auth: &AuthData, now: NaiveDateTime)
        -> Result<RegisteredUser, UserError> {

        let entry = roster
            .iter()
            .find(|e| e.phone_num == auth.phone_num)
            .ok_or_else(|| UserError::NotInRoster(get_short_phone(auth.phone_num)))?;

        let mut user = build_user(entry, auth, now);
        let mut users = self.users.clone();
        match users.iter_mut().find(|u| u.uid == auth.uid) {
            Some(existing) => {
                user.role = existing.role;
                user.created = existing.created.clone();
                *existing = user.clone();
            }
            None => users.push(user.clone()),
        }

        self.commit(users).await?;
        info!("users:: uid {} authenticated as phone ...{}", user.uid, get_short_phone(user.phone_num));
        Ok(user)
    }

    /// Changes `target_uid`'s role. Managers may change anyone's role; anyone
    /// holding the manager password may too.
    pub async fn set_role(&mut self, requester_uid: i64, target_uid: i64, role: UserRole,
        password: Option<&str>, manager_password: &str, now: NaiveDateTime) -> Result<RegisteredUser, UserError> {

        let requester_is_manager = self.get(requester_uid).is_some_and(RegisteredUser::is_manager);
        let password_ok = password.is_some_and(|p| p == manager_password);
        if !requester_is_manager && !password_ok {
            return Err(UserError::Forbidden(requester_uid));
        }

        let mut users = self.users.clone();
        let target = users
            .iter_mut()
            .find(|u| u.uid == target_uid)
            .ok_or(UserError::UnknownUser(target_uid))?;
        target.role = role;
        target.updated = now.format(JOB_TIME_FORMAT).to_string();
        let target = target.clone();

        self.commit(users).await?;
        info!("users:: uid {requester_uid} set role of uid {target_uid} to {role:?}");
        Ok(target)
    }

    /// Persists first so memory never runs ahead of the file.
    async fn commit(&mut self, users: Vec<RegisteredUser>) -> Result<(), StoreError> {
        storage::write_json_atomic(&self.path, &users).await?;
        self.users = users;
        Ok(())
    }
}
