use std::env::VarError;
use std::{env, path::PathBuf, str::FromStr};
use log::{warn, LevelFilter};
use log4rs::{append::console::ConsoleAppender, config::{Appender, Config as LogConfig, Root}, encode::pattern::PatternEncoder};
use tokio::time::Duration;

use crate::LOG_CONFIG_PATH;

pub const HOST: &str = "HOST";
pub const PORT: &str = "PORT";

pub const VAR_BOT_TOKEN: &str = "BOT_TOKEN";
pub const VAR_MANAGER_PASSWORD: &str = "MANAGER_PASSWORD";
pub const VAR_TELEGRAM_API_HOST: &str = "TELEGRAM_API_HOST";
pub const VAR_POLL_INTERVAL_S: &str = "POLL_INTERVAL_S";
pub const VAR_SEND_TIMEOUT_S: &str = "SEND_TIMEOUT_S";
pub const VAR_JOBS_PATH: &str = "JOBS_PATH";
pub const VAR_ROSTER_PATH: &str = "ROSTER_PATH";
pub const VAR_USERS_PATH: &str = "USERS_PATH";
pub const VAR_REVIEWS_PATH: &str = "REVIEWS_PATH";
pub const VAR_ERROR_LOG_PATH: &str = "ERROR_LOG_PATH";
pub const VAR_REMINDER_TEXT: &str = "REMINDER_TEXT";

const DEFAULT_POLL_INTERVAL_S: u64 = 5;
const DEFAULT_SEND_TIMEOUT_S: u64 = 10;
const DEFAULT_REMINDER_TEXT: &str =
    "Сегодня у вас прошла уборка. Пожалуйста, оцените её качество от 1 до 10.";

pub fn check_environment_vars() -> Result<(), VarError> {
    env::var(VAR_BOT_TOKEN)?;
    env::var(VAR_MANAGER_PASSWORD)?;
    Ok(())
}

/// Runtime settings, read once from the environment after `.env` is loaded.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub manager_password: String,
    pub telegram_api_host: String,
    pub poll_interval: Duration,
    pub send_timeout: Duration,
    pub jobs_path: PathBuf,
    pub roster_path: PathBuf,
    pub users_path: PathBuf,
    pub reviews_path: PathBuf,
    pub error_log_path: PathBuf,
    pub reminder_text: String,
}

impl Config {
    pub fn from_env() -> Result<Config, VarError> {
        Ok(Config {
            bot_token: env::var(VAR_BOT_TOKEN)?,
            manager_password: env::var(VAR_MANAGER_PASSWORD)?,
            telegram_api_host: env::var(VAR_TELEGRAM_API_HOST).unwrap_or(String::from("api.telegram.org")),
            poll_interval: Duration::from_secs(parse_var_or(VAR_POLL_INTERVAL_S, DEFAULT_POLL_INTERVAL_S)),
            send_timeout: Duration::from_secs(parse_var_or(VAR_SEND_TIMEOUT_S, DEFAULT_SEND_TIMEOUT_S)),
            jobs_path: path_var_or(VAR_JOBS_PATH, "assets/jobs.json"),
            roster_path: path_var_or(VAR_ROSTER_PATH, "assets/users.json"),
            users_path: path_var_or(VAR_USERS_PATH, "assets/registered_users.json"),
            reviews_path: path_var_or(VAR_REVIEWS_PATH, "assets/reviews.json"),
            error_log_path: path_var_or(VAR_ERROR_LOG_PATH, "error_log.txt"),
            reminder_text: env::var(VAR_REMINDER_TEXT).unwrap_or(String::from(DEFAULT_REMINDER_TEXT)),
        })
    }
}

fn parse_var_or<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{name}={raw:?} is not valid, using default {default}");
            default
        }),
        Err(_) => default,
    }
}

fn path_var_or(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env::var(name).unwrap_or(String::from(default)))
}

/// Uses `log4rs.yaml` when it exists, otherwise logs to the console at info.
pub fn init_logging() {
    if log4rs::init_file(LOG_CONFIG_PATH, Default::default()).is_ok() {
        return;
    }

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}")))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));

    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("Failed to initialise logging: {e}");
            }
        }
        Err(e) => eprintln!("Invalid logging config: {e}"),
    }
}

/// Last four digits of a phone number, enough to tell users apart in logs.
pub fn get_short_phone(phone_num: i64) -> String {
    let digits = phone_num.to_string();
    let start = digits.len().saturating_sub(4);
    digits[start..].to_string()
}
