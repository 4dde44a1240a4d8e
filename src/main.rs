// A notification bot for a cleaning service: users authenticate by phone
// number against a roster, get a reminder after each scheduled cleaning and
// can rate it from 1 to 10.
mod jobs;
mod models;
mod reviews;
mod routes;
mod schedule;
mod storage;
mod telegram;
mod timing;
mod types;
mod users;
mod util;

use actix_web::{HttpResponse, HttpServer, App, web::{self, Data}, error};
use dotenv::dotenv;
use log::{info, error};
use std::{sync::Arc, process::exit, env};
use tokio::sync::RwLock;

use util::{Config, HOST, PORT, VAR_BOT_TOKEN, VAR_MANAGER_PASSWORD};
use types::{SharedTransport, SharedUsers};
use jobs::JobStore;
use reviews::ReviewStore;
use telegram::TelegramTransport;
use timing::start_delivery_loop;
use users::UserStore;

pub const LOG_CONFIG_PATH: &str = "log4rs.yaml";

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    let check = util::check_environment_vars();
    if check.is_err() {
        eprintln!("Missing environment variable");
        eprintln!("Required environment variables: {VAR_BOT_TOKEN} {VAR_MANAGER_PASSWORD}");
        exit(1)
    }
    util::init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            exit(1)
        }
    };

    let user_store = match UserStore::open(&config.users_path).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open registered users: {e}");
            exit(1)
        }
    };
    let users: SharedUsers = Arc::new(RwLock::new(user_store));
    info!("Loaded {} registered users", users.read().await.get_all_users().len());

    let transport: SharedTransport = match TelegramTransport::new(&config.telegram_api_host, &config.bot_token, config.send_timeout) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Failed to build Telegram client: {e}");
            exit(1)
        }
    };

    let delivery_handle = tokio::spawn(start_delivery_loop(config.clone(), Arc::clone(&users), transport));

    let config_data = Data::new(config.clone());
    let users_data = Data::new(users);
    let job_store_data = Data::new(JobStore::new(config.jobs_path.clone()));
    let review_store_data = Data::new(ReviewStore::new(config.reviews_path.clone()));

    let host = env::var(HOST).unwrap_or(String::from("127.0.0.1"));
    let port = env::var(PORT).unwrap_or(String::from("9898"));

    let server_handle = HttpServer::new(move || {
        let json_cfg = web::JsonConfig::default()
            .error_handler(|err, _req| {
                error!("Json config error: {}", err);
                error::InternalError::from_response(err, HttpResponse::BadRequest().into()).into()
            });
        App::new()
            .app_data(Data::clone(&config_data))
            .app_data(Data::clone(&users_data))
            .app_data(Data::clone(&job_store_data))
            .app_data(Data::clone(&review_store_data))
            .app_data(json_cfg)
            .configure(routes::configure)
    })
        .bind(format!("{}:{}", host, port))?
        .run();

    tokio::select! {
        _ = server_handle => {}
        _ = delivery_handle => {
            error!("Delivery loop stopped");
        },
    }
    Ok(())
}
