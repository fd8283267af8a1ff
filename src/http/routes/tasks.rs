use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::auth_service::AuthService;
use crate::application::task_service::TaskService;
use crate::domain::batch;
use crate::domain::todo::{Task, TaskId, UpdateTask};
use crate::http::auth::{require_token, Principal};
use crate::http::types::ApiError;

#[derive(Clone)]
pub struct AppState<S: TaskService, A: AuthService> {
    pub service: S,
    pub auth: A,
}

pub fn router<S: TaskService + Clone, A: AuthService + Clone>(state: AppState<S, A>) -> Router {
    let auth = state.auth.clone();
    Router::new()
        .route("/tasks", get(list_tasks::<S, A>).post(create_task::<S, A>))
        .route(
            "/tasks/batch",
            axum::routing::post(batch_create::<S, A>)
                .patch(batch_update::<S, A>)
                .delete(batch_delete::<S, A>),
        )
        .route("/tasks/batch/ordering", axum::routing::patch(batch_update_ordering::<S, A>))
        .route(
            "/tasks/:id",
            get(get_task::<S, A>).patch(update_task::<S, A>).delete(delete_task::<S, A>),
        )
        .route_layer(middleware::from_fn_with_state(auth, require_token::<A>))
        .with_state(state)
}

#[derive(Serialize)]
pub struct TaskBody {
    pub id: i64,
    pub todo_id: i64,
    pub task: String,
    pub completed: bool,
    pub ordering: i64,
}

impl TaskBody {
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.0,
            todo_id: task.todo.0,
            task: task.task.clone(),
            completed: task.completed,
            ordering: task.ordering,
        }
    }
}

fn bodies(tasks: &[Task]) -> Vec<TaskBody> {
    tasks.iter().map(TaskBody::from_task).collect()
}

async fn create_task<S: TaskService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<TaskBody>), ApiError> {
    let mut items = batch::parse_create_task_list(std::slice::from_ref(&payload))?;
    let item = items
        .pop()
        .ok_or_else(|| ApiError::BadRequest("empty payload".into()))?;
    let task = state.service.create(principal.0, item).await?;
    Ok((StatusCode::CREATED, Json(TaskBody::from_task(&task))))
}

async fn list_tasks<S: TaskService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<TaskBody>>, ApiError> {
    let tasks = state.service.list(principal.0).await?;
    Ok(Json(bodies(&tasks)))
}

async fn get_task<S: TaskService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<TaskBody>, ApiError> {
    match state.service.get(principal.0, TaskId(id)).await? {
        Some(task) => Ok(Json(TaskBody::from_task(&task))),
        None => Err(ApiError::NotFound),
    }
}

async fn update_task<S: TaskService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTask>,
) -> Result<Json<TaskBody>, ApiError> {
    match state.service.update(principal.0, TaskId(id), payload).await? {
        Some(task) => Ok(Json(TaskBody::from_task(&task))),
        None => Err(ApiError::NotFound),
    }
}

async fn delete_task<S: TaskService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.service.delete(principal.0, TaskId(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

#[derive(Deserialize)]
struct CreateListBody {
    create_list: Vec<Value>,
}

async fn batch_create<S: TaskService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateListBody>,
) -> Result<(StatusCode, Json<Vec<TaskBody>>), ApiError> {
    let items = batch::parse_create_task_list(&payload.create_list)?;
    let created = state.service.batch_create(principal.0, items).await?;
    Ok((StatusCode::CREATED, Json(bodies(&created))))
}

#[derive(Deserialize)]
struct UpdateListBody {
    update_list: Vec<Value>,
}

async fn batch_update<S: TaskService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<UpdateListBody>,
) -> Result<Json<Vec<TaskBody>>, ApiError> {
    let items = batch::parse_update_task_list(&payload.update_list)?;
    let updated = state.service.batch_update(principal.0, items).await?;
    Ok(Json(bodies(&updated)))
}

#[derive(Deserialize)]
struct OrderingListBody {
    ordering_list: Vec<Value>,
}

async fn batch_update_ordering<S: TaskService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<OrderingListBody>,
) -> Result<Json<Vec<TaskBody>>, ApiError> {
    let items = batch::parse_reorder_list(&payload.ordering_list)?;
    let updated = state.service.batch_update_ordering(principal.0, items).await?;
    Ok(Json(bodies(&updated)))
}

#[derive(Deserialize)]
struct DeleteListBody {
    delete_list: Vec<Value>,
}

async fn batch_delete<S: TaskService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<DeleteListBody>,
) -> Result<(StatusCode, Json<Vec<TaskBody>>), ApiError> {
    let ids = batch::validate_delete_ids(&payload.delete_list)?;
    let deleted = state.service.batch_delete(principal.0, ids).await?;
    Ok((StatusCode::NO_CONTENT, Json(bodies(&deleted))))
}
