use actix_web::{Responder, HttpResponse, post, get, web::{self}};
use chrono::Local;
use log::{info, error, warn};

use crate::models::{AuthData, RoleChangeData, RosterUpload, ReviewData, RegisteredUser};
use crate::jobs::JobStore;
use crate::reviews::{ReviewError, ReviewStore};
use crate::types::SharedUsers;
use crate::users::{load_roster, save_roster, UserError};
use crate::util::Config;

fn user_error_response(e: UserError) -> HttpResponse {
    match e {
        UserError::NotInRoster(_) | UserError::UnknownUser(_) => HttpResponse::NotFound().body(e.to_string()),
        UserError::Forbidden(_) => HttpResponse::Forbidden().body(e.to_string()),
        UserError::Store(e) => {
            error!("users:: store error {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/health")]
pub async fn health() -> impl Responder {
    info!("Health check");
    HttpResponse::Ok()
}

#[get("/jobs")]
async fn list_jobs(job_store: web::Data<JobStore>) -> impl Responder {
    match job_store.snapshot().await {
        Ok(jobs) => HttpResponse::Ok().json(jobs),
        Err(e) => {
            error!("jobs:: could not read job file {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[post("/auth")]
async fn authenticate(payload: web::Json<AuthData>,
    config: web::Data<Config>,
    users: web::Data<SharedUsers>) -> impl Responder {

    let roster = match load_roster(&config.roster_path).await {
        Ok(roster) => roster,
        Err(e) => return user_error_response(e.into()),
    };
    let result = users.write().await.authenticate(&roster, &payload, Local::now().naive_local()).await;
    match result {
        Ok(user) => HttpResponse::Ok().json(user),
        Err(e) => {
            warn!("auth:: uid {} rejected: {e}", payload.uid);
            user_error_response(e)
        }
    }
}

#[post("/role")]
async fn change_role(payload: web::Json<RoleChangeData>,
    config: web::Data<Config>,
    users: web::Data<SharedUsers>) -> impl Responder {

    let result = users.write().await.set_role(
        payload.requester_uid,
        payload.target_uid,
        payload.role,
        payload.password.as_deref(),
        &config.manager_password,
        Local::now().naive_local(),
    ).await;
    match result {
        Ok(user) => HttpResponse::Ok().json(user),
        Err(e) => user_error_response(e),
    }
}

#[post("/roster")]
async fn upload_roster(payload: web::Json<RosterUpload>,
    config: web::Data<Config>,
    users: web::Data<SharedUsers>) -> impl Responder {

    let is_manager = users.read().await.get(payload.requester_uid).is_some_and(RegisteredUser::is_manager);
    if !is_manager {
        return user_error_response(UserError::Forbidden(payload.requester_uid));
    }
    if let Err(e) = save_roster(&config.roster_path, &payload.entries).await {
        return user_error_response(e.into());
    }
    info!("roster:: uid {} uploaded {} entries", payload.requester_uid, payload.entries.len());
    HttpResponse::Ok().finish()
}

#[post("/review")]
async fn submit_review(payload: web::Json<ReviewData>,
    job_store: web::Data<JobStore>,
    review_store: web::Data<ReviewStore>) -> impl Responder {

    let jobs = match job_store.snapshot().await {
        Ok(jobs) => jobs,
        Err(e) => {
            error!("review:: could not read job file {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };
    match review_store.submit(payload.uid, payload.score, &jobs, Local::now().naive_local()).await {
        Ok(review) => HttpResponse::Ok().json(review),
        Err(e @ ReviewError::ScoreOutOfRange(_)) => HttpResponse::BadRequest().body(e.to_string()),
        Err(e @ (ReviewError::NoCleaningToday(_) | ReviewError::AlreadyReviewed(_))) => {
            HttpResponse::Conflict().body(e.to_string())
        }
        Err(ReviewError::Store(e)) => {
            error!("review:: store error {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_jobs)
        .service(authenticate)
        .service(change_role)
        .service(upload_roster)
        .service(submit_review);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web::Data, App};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::{sync::RwLock, time::Duration};

    use crate::models::{NotificationJob, RosterEntry};
    use crate::users::UserStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        users: SharedUsers,
        job_store: JobStore,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name);
        let config = Config {
            bot_token: String::from("123:ABC"),
            manager_password: String::from("1234"),
            telegram_api_host: String::from("localhost"),
            poll_interval: Duration::from_secs(5),
            send_timeout: Duration::from_secs(1),
            jobs_path: path("jobs.json"),
            roster_path: path("roster.json"),
            users_path: path("registered.json"),
            reviews_path: path("reviews.json"),
            error_log_path: path("error_log.txt"),
            reminder_text: String::from("Оцените уборку"),
        };
        save_roster(&config.roster_path, &[RosterEntry {
            address: String::from("ул. Ленина, 1"),
            full_name: String::from("Иванов Иван Иванович"),
            phone_num: 79787873919,
            clean_time: String::from("Ежедневно в 20:00"),
        }]).await.unwrap();
        let users = Arc::new(RwLock::new(UserStore::open(&config.users_path).await.unwrap()));
        let job_store = JobStore::new(config.jobs_path.clone());
        Fixture { _dir: dir, config, users, job_store }
    }

    macro_rules! app {
        ($fixture:expr) => {
            test::init_service(
                App::new()
                    .app_data(Data::new($fixture.config.clone()))
                    .app_data(Data::new(Arc::clone(&$fixture.users)))
                    .app_data(Data::new($fixture.job_store.clone()))
                    .app_data(Data::new(ReviewStore::new($fixture.config.reviews_path.clone())))
                    .configure(configure),
            )
            .await
        };
    }

    fn auth_body(uid: i64, phone_num: i64) -> serde_json::Value {
        json!({"uid": uid, "username": "ivan", "first_name": "Иван", "phone_num": phone_num})
    }

    #[actix_web::test]
    async fn test_health() {
        let fixture = fixture().await;
        let app = app!(fixture);
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_auth_by_roster_phone() {
        let fixture = fixture().await;
        let app = app!(fixture);

        let req = test::TestRequest::post().uri("/auth").set_json(auth_body(1, 79000000000)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post().uri("/auth").set_json(auth_body(1, 79787873919)).to_request();
        let user: RegisteredUser = test::call_and_read_body_json(&app, req).await;
        assert_eq!(user.full_name, "Иванов Иван Иванович");
        assert_eq!(fixture.users.read().await.get_all_users().len(), 1);
    }

    #[actix_web::test]
    async fn test_roster_upload_needs_manager() {
        let fixture = fixture().await;
        let app = app!(fixture);
        let req = test::TestRequest::post().uri("/auth").set_json(auth_body(1, 79787873919)).to_request();
        test::call_service(&app, req).await;

        let upload = json!({"requester_uid": 1, "entries": []});
        let req = test::TestRequest::post().uri("/roster").set_json(&upload).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let promote = json!({"requester_uid": 1, "target_uid": 1, "role": "Менеджер", "password": "1234"});
        let req = test::TestRequest::post().uri("/role").set_json(&promote).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post().uri("/roster").set_json(&upload).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(load_roster(&fixture.config.roster_path).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_review_flow() {
        let fixture = fixture().await;
        let app = app!(fixture);

        let req = test::TestRequest::post().uri("/review").set_json(json!({"uid": 1, "score": 8})).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let today = Local::now().naive_local().date();
        let due_at = today.and_hms_opt(0, 0, 0).unwrap();
        let job = NotificationJob { sent: true, ..NotificationJob::new(1, 79787873919, due_at) };
        fixture.job_store.replace(&[job]).await.unwrap();

        let req = test::TestRequest::post().uri("/review").set_json(json!({"uid": 1, "score": 11})).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post().uri("/review").set_json(json!({"uid": 1, "score": 8})).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post().uri("/review").set_json(json!({"uid": 1, "score": 3})).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get().uri("/jobs").to_request();
        let jobs: Vec<NotificationJob> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(jobs.len(), 1);
    }
}
