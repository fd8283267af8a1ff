use axum::{routing::get, Router};

/// Composes the resource routers under one app with a health probe.
pub fn app(users: Router, todos: Router, tasks: Router) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(users)
        .merge(todos)
        .merge(tasks)
}
