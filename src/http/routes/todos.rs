use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::auth_service::AuthService;
use crate::application::todo_service::TodoService;
use crate::domain::batch;
use crate::domain::todo::{Todo, TodoId, TodoWithTasks, UpdateTodo};
use crate::http::auth::{require_token, Principal};
use crate::http::types::ApiError;

use super::tasks::TaskBody;

#[derive(Clone)]
pub struct AppState<S: TodoService, A: AuthService> {
    pub service: S,
    pub auth: A,
}

pub fn router<S: TodoService + Clone, A: AuthService + Clone>(state: AppState<S, A>) -> Router {
    let auth = state.auth.clone();
    Router::new()
        .route("/todos", get(list_todos::<S, A>).post(create_todo::<S, A>))
        .route(
            "/todos/batch",
            axum::routing::post(batch_create::<S, A>)
                .patch(batch_update::<S, A>)
                .delete(batch_delete::<S, A>),
        )
        .route("/todos/batch/ordering", axum::routing::patch(batch_update_ordering::<S, A>))
        .route(
            "/todos/:id",
            get(get_todo::<S, A>).patch(update_todo::<S, A>).delete(delete_todo::<S, A>),
        )
        .route_layer(middleware::from_fn_with_state(auth, require_token::<A>))
        .with_state(state)
}

#[derive(Serialize)]
struct TodoBody {
    id: i64,
    title: Option<String>,
    completed: bool,
    last_added: Option<DateTime<Utc>>,
    ordering: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tasks: Option<Vec<TaskBody>>,
}

impl TodoBody {
    fn from_todo(todo: &Todo) -> Self {
        Self {
            id: todo.id.0,
            title: todo.title.clone(),
            completed: todo.completed,
            last_added: todo.last_added,
            ordering: todo.ordering,
            tasks: None,
        }
    }

    fn with_tasks(entry: &TodoWithTasks) -> Self {
        let mut body = Self::from_todo(&entry.todo);
        body.tasks = Some(entry.tasks.iter().map(TaskBody::from_task).collect());
        body
    }
}

fn bodies(todos: &[Todo]) -> Vec<TodoBody> {
    todos.iter().map(TodoBody::from_todo).collect()
}

async fn create_todo<S: TodoService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<TodoBody>), ApiError> {
    let mut items = batch::parse_create_todo_list(std::slice::from_ref(&payload))?;
    let item = items
        .pop()
        .ok_or_else(|| ApiError::BadRequest("empty payload".into()))?;
    let created = state.service.create(principal.0, item).await?;
    Ok((StatusCode::CREATED, Json(TodoBody::with_tasks(&created))))
}

async fn list_todos<S: TodoService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<TodoBody>>, ApiError> {
    let todos = state.service.list(principal.0).await?;
    Ok(Json(todos.iter().map(TodoBody::with_tasks).collect()))
}

async fn get_todo<S: TodoService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<TodoBody>, ApiError> {
    match state.service.get(principal.0, TodoId(id)).await? {
        Some(entry) => Ok(Json(TodoBody::with_tasks(&entry))),
        None => Err(ApiError::NotFound),
    }
}

async fn update_todo<S: TodoService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTodo>,
) -> Result<Json<TodoBody>, ApiError> {
    match state.service.update(principal.0, TodoId(id), payload).await? {
        Some(entry) => Ok(Json(TodoBody::with_tasks(&entry))),
        None => Err(ApiError::NotFound),
    }
}

async fn delete_todo<S: TodoService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.service.delete(principal.0, TodoId(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

#[derive(Deserialize)]
struct CreateListBody {
    create_list: Vec<Value>,
}

async fn batch_create<S: TodoService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateListBody>,
) -> Result<(StatusCode, Json<Vec<TodoBody>>), ApiError> {
    let items = batch::parse_create_todo_list(&payload.create_list)?;
    let created = state.service.batch_create(principal.0, items).await?;
    Ok((
        StatusCode::CREATED,
        Json(created.iter().map(TodoBody::with_tasks).collect()),
    ))
}

#[derive(Deserialize)]
struct UpdateListBody {
    update_list: Vec<Value>,
}

async fn batch_update<S: TodoService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<UpdateListBody>,
) -> Result<Json<Vec<TodoBody>>, ApiError> {
    let items = batch::parse_update_todo_list(&payload.update_list)?;
    let updated = state.service.batch_update(principal.0, items).await?;
    Ok(Json(bodies(&updated)))
}

#[derive(Deserialize)]
struct OrderingListBody {
    ordering_list: Vec<Value>,
}

async fn batch_update_ordering<S: TodoService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<OrderingListBody>,
) -> Result<Json<Vec<TodoBody>>, ApiError> {
    let items = batch::parse_reorder_list(&payload.ordering_list)?;
    let updated = state.service.batch_update_ordering(principal.0, items).await?;
    Ok(Json(bodies(&updated)))
}

#[derive(Deserialize)]
struct DeleteListBody {
    delete_list: Vec<Value>,
}

async fn batch_delete<S: TodoService, A: AuthService>(
    State(state): State<AppState<S, A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<DeleteListBody>,
) -> Result<(StatusCode, Json<Vec<TodoBody>>), ApiError> {
    let ids = batch::validate_delete_ids(&payload.delete_list)?;
    let deleted = state.service.batch_delete(principal.0, ids).await?;
    Ok((StatusCode::NO_CONTENT, Json(bodies(&deleted))))
}
