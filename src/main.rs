use std::net::SocketAddr;

use chrono::Duration;
use tracing_subscriber::EnvFilter;

use todo_api::application::auth_service::{AuthServiceImpl, DEFAULT_TOKEN_TTL_HOURS};
use todo_api::application::task_service::TaskServiceImpl;
use todo_api::application::todo_service::TodoServiceImpl;
use todo_api::domain::todo::OrderingMode;
use todo_api::http::routes::{tasks, todos, users};
use todo_api::http::routing;
use todo_api::infrastructure::sqlite_repo::SqliteRepositories;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://todos.db".to_string());
    // Ensure SQLite file can be created/opened when using a file-backed URL
    prepare_sqlite_file(&database_url)?;
    let repo = SqliteRepositories::connect(&database_url).await?;
    repo.init().await?;

    let token_ttl = std::env::var("TOKEN_TTL_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_TOKEN_TTL_HOURS);
    let ordering_mode = match std::env::var("ORDERING_MODE") {
        Ok(value) => OrderingMode::from_env_str(&value).unwrap_or_else(|| {
            tracing::warn!(%value, "unknown ORDERING_MODE, using best-effort");
            OrderingMode::BestEffort
        }),
        Err(_) => OrderingMode::BestEffort,
    };

    let auth = AuthServiceImpl::new(repo.clone(), Duration::hours(token_ttl));
    let todo_service = TodoServiceImpl::new(repo.clone(), repo.clone(), ordering_mode);
    let task_service = TaskServiceImpl::new(repo.clone(), repo.clone(), ordering_mode);

    let router = routing::app(
        users::router(users::AppState { auth: auth.clone() }),
        todos::router(todos::AppState { service: todo_service, auth: auth.clone() }),
        tasks::router(tasks::AppState { service: task_service, auth }),
    );

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()?;
    tracing::info!(%addr, ?ordering_mode, "listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::ctrl_c;
    let _ = ctrl_c().await;
    tracing::info!("shutdown");
}

fn prepare_sqlite_file(database_url: &str) -> anyhow::Result<()> {
    // Skip in-memory
    if database_url.starts_with("sqlite::memory:") {
        return Ok(());
    }
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        // On Windows, absolute paths may look like /C:/path; strip the leading slash
        let path = if cfg!(windows) && path.len() >= 3 && path.as_bytes()[0] == b'/' && path.as_bytes()[2] == b':' {
            &path[1..]
        } else {
            path
        };
        use std::{fs, fs::OpenOptions, path::Path};
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if !p.exists() {
            let _ = OpenOptions::new().create(true).append(true).open(p)?;
        }
    }
    Ok(())
}
