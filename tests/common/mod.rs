#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::Router;
use chrono::Duration;
use serde_json::{json, Value};

use todo_api::application::auth_service::AuthServiceImpl;
use todo_api::application::task_service::TaskServiceImpl;
use todo_api::application::todo_service::TodoServiceImpl;
use todo_api::domain::todo::OrderingMode;
use todo_api::http::routes::{tasks, todos, users};
use todo_api::http::routing;
use todo_api::infrastructure::sqlite_repo::SqliteRepositories;

pub async fn make_app() -> Router {
    // in-memory sqlite, fresh per test
    let repo = SqliteRepositories::connect("sqlite::memory:").await.unwrap();
    repo.init().await.unwrap();
    let auth = AuthServiceImpl::new(repo.clone(), Duration::hours(72));
    let todo_service = TodoServiceImpl::new(repo.clone(), repo.clone(), OrderingMode::BestEffort);
    let task_service = TaskServiceImpl::new(repo.clone(), repo.clone(), OrderingMode::BestEffort);
    routing::app(
        users::router(users::AppState { auth: auth.clone() }),
        todos::router(todos::AppState { service: todo_service, auth: auth.clone() }),
        tasks::router(tasks::AppState { service: task_service, auth }),
    )
}

pub async fn request(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> hyper::Response<Body> {
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    let mut req = Request::builder()
        .method(Method::from_bytes(method.as_bytes()).unwrap())
        .uri(path);
    if let Some(key) = token {
        req = req.header("authorization", format!("Token {key}"));
    }
    let req = match body {
        Some(json) => req
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(req).await.unwrap()
}

pub async fn body_json(res: hyper::Response<Body>) -> Value {
    let bytes = to_bytes(res.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Registers a user and returns a fresh token for them.
pub async fn signup(app: &Router, email: &str) -> String {
    let res = request(
        app,
        "POST",
        "/users",
        None,
        Some(json!({
            "email": email,
            "password": "Awesomeuser123",
            "first_name": "Test",
            "last_name": "User",
        })),
    )
    .await;
    assert_eq!(res.status(), 201);
    let res = request(
        app,
        "POST",
        "/users/token",
        None,
        Some(json!({ "email": email, "password": "Awesomeuser123" })),
    )
    .await;
    assert_eq!(res.status(), 200);
    let body = body_json(res).await;
    body["token"].as_str().unwrap().to_string()
}
