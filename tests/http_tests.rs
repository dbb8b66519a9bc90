//! Router-level tests: requests go through `build_router` without a socket.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use chrono::NaiveDate;
use serde_json::Value;
use task_manager::config::Config;
use task_manager::db::Database;
use task_manager::db::reference::NamedTable;
use task_manager::service::TaskManager;
use task_manager::types::{Id, Priority, Task, Worker};
use task_manager::validation::{NamedInput, TaskInput, WorkerInput};
use task_manager::web::build_router;
use tower::ServiceExt;

struct Fixture {
    tm: TaskManager,
    app: Router,
    root_token: String,
    position: Id,
    task_type: Id,
}

fn setup() -> Fixture {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    let position = db
        .create_named(NamedTable::Position, &NamedInput::new("Developer"))
        .unwrap()
        .id;
    let task_type = db
        .create_named(NamedTable::TaskType, &NamedInput::new("Feature"))
        .unwrap()
        .id;

    let tm = TaskManager::new(db, config);
    tm.create_superuser("root", "password123", None, "Administrator")
        .unwrap();
    let root_token = tm.login("root", "password123").unwrap().token;

    Fixture {
        app: build_router(tm.clone()),
        tm,
        root_token,
        position,
        task_type,
    }
}

impl Fixture {
    fn worker(&self, username: &str) -> (Worker, String) {
        let worker = self
            .tm
            .db()
            .create_worker(&WorkerInput::new(username, self.position, "password123"), 4)
            .unwrap();
        let token = self.tm.login(username, "password123").unwrap().token;
        (worker, token)
    }

    fn task(&self, name: &str, assigned: &[Id]) -> Task {
        let deadline = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        self.tm
            .db()
            .create_task(
                &TaskInput::new(name, deadline, Priority::Medium, self.task_type).assigned(assigned),
                None,
            )
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, form: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(form.to_string())).unwrap()
}

async fn json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response.headers().get(LOCATION).unwrap().to_str().unwrap()
}

fn item_ids(page: &Value) -> Vec<i64> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}

mod form_tests {
    use super::*;

    #[tokio::test]
    async fn create_redirects_to_the_list() {
        let fx = setup();

        let response = fx.send(post_form("/tags/create", "name=ui", Some(&fx.root_token))).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/tags");
        let page = json(fx.send(get("/tags", Some(&fx.root_token))).await).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["items"][0]["name"], "ui");
    }

    #[tokio::test]
    async fn rejected_form_comes_back_with_values_and_errors() {
        let fx = setup();

        let response = fx.send(post_form("/tags/create", "name=", Some(&fx.root_token))).await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json(response).await;
        assert_eq!(body["kind"], "tag");
        assert_eq!(body["action"], "create");
        assert_eq!(body["values"]["name"], "");
        assert_eq!(body["errors"]["code"], "VALIDATION_FAILED");
        assert!(body["errors"]["fields"]["name"].is_string());
        assert!(fx.tm.db().find_named(NamedTable::Tag, "").unwrap().is_none());
    }

    #[tokio::test]
    async fn update_and_delete_redirect_to_the_list() {
        let fx = setup();
        let tag = fx
            .tm
            .db()
            .create_named(NamedTable::Tag, &NamedInput::new("ui"))
            .unwrap();

        let response = fx
            .send(post_form(
                &format!("/tags/{}/update", tag.id),
                "name=frontend",
                Some(&fx.root_token),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/tags");
        let renamed = fx.tm.db().get_named(NamedTable::Tag, tag.id).unwrap().unwrap();
        assert_eq!(renamed.name, "frontend");

        let response = fx
            .send(post_form(&format!("/tags/{}/delete", tag.id), "", Some(&fx.root_token)))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/tags");
        assert!(fx.tm.db().get_named(NamedTable::Tag, tag.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn update_of_unknown_record_is_not_found() {
        let fx = setup();
        let response = fx
            .send(post_form("/tags/999/update", "name=x", Some(&fx.root_token)))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["code"], "NOT_FOUND");
    }
}

mod task_route_tests {
    use super::*;

    #[tokio::test]
    async fn create_form_route_is_not_taken_for_an_id() {
        let fx = setup();
        let (alice, token) = fx.worker("alice");
        let task = fx.task("Plan", &[alice.id]);

        let response = fx.send(get("/tasks/create", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let form = json(response).await;
        assert_eq!(form["kind"], "task");
        assert_eq!(form["action"], "create");

        let response = fx.send(get(&format!("/tasks/{}", task.id), Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["name"], "Plan");
    }

    #[tokio::test]
    async fn completing_redirects_to_the_task() {
        let fx = setup();
        let (alice, token) = fx.worker("alice");
        let task = fx.task("Plan", &[alice.id]);

        let response = fx
            .send(post_form(&format!("/tasks/{}/complete", task.id), "", Some(&token)))
            .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), format!("/tasks/{}", task.id));
        assert!(fx.tm.db().get_task(task.id).unwrap().unwrap().is_completed);
    }

    #[tokio::test]
    async fn non_assignee_cannot_complete() {
        let fx = setup();
        let (alice, _) = fx.worker("alice");
        let (_, bob_token) = fx.worker("bob");
        let task = fx.task("Plan", &[alice.id]);

        let response = fx
            .send(post_form(&format!("/tasks/{}/complete", task.id), "", Some(&bob_token)))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!fx.tm.db().get_task(task.id).unwrap().unwrap().is_completed);
    }

    #[tokio::test]
    async fn show_my_tasks_is_read_from_the_query_string() {
        let fx = setup();
        let (alice, token) = fx.worker("alice");
        let (bob, _) = fx.worker("bob");
        let mine = fx.task("Fix Login Issue", &[alice.id]);
        let theirs = fx.task("Write Docs", &[bob.id]);

        let all = json(fx.send(get("/tasks", Some(&token))).await).await;
        assert_eq!(item_ids(&all), vec![mine.id, theirs.id]);

        let response = fx.send(get("/tasks?show_my_tasks=on", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(item_ids(&json(response).await), vec![mine.id]);

        let page = json(fx.send(get("/tasks?query=docs&page=1", Some(&token))).await).await;
        assert_eq!(item_ids(&page), vec![theirs.id]);
    }

    #[tokio::test]
    async fn plain_worker_cannot_delete_a_task() {
        let fx = setup();
        let (alice, token) = fx.worker("alice");
        let task = fx.task("Plan", &[alice.id]);

        let response = fx
            .send(post_form(&format!("/tasks/{}/delete", task.id), "", Some(&token)))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json(response).await["code"], "FORBIDDEN");
        assert!(fx.tm.db().get_task(task.id).unwrap().is_some());
    }
}

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn login_sets_a_session_cookie() {
        let fx = setup();

        let response = fx
            .send(post_form("/login", "username=root&password=password123", None))
            .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));

        let pair = cookie.split(';').next().unwrap();
        let request = Request::builder()
            .uri("/")
            .header(COOKIE, pair)
            .body(Body::empty())
            .unwrap();
        let response = fx.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["worker"]["username"], "root");
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let fx = setup();
        let response = fx
            .send(post_form("/login", "username=root&password=nope-nope", None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn anonymous_requests_need_login() {
        let fx = setup();

        let response = fx.send(get("/tasks", None)).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "AUTHENTICATION_REQUIRED");
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let fx = setup();

        let response = fx.send(post_form("/logout", "", Some(&fx.root_token))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));

        let response = fx.send(get("/", Some(&fx.root_token))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_needs_no_login() {
        let fx = setup();
        let response = fx.send(get("/api/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "healthy");
    }
}
