use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::todo::{Task, TaskDraft, TaskField, TaskId, Todo, TodoDraft, TodoField, TodoId};
use super::user::{AuthToken, NewUser, User, UserId};

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn create_user(&self, draft: NewUser) -> anyhow::Result<User>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_user(&self, id: UserId) -> anyhow::Result<Option<User>>;
    async fn update_user(&self, user: &User) -> anyhow::Result<()>;
    async fn insert_token(&self, token: &AuthToken) -> anyhow::Result<()>;
    async fn find_token(&self, key: &str) -> anyhow::Result<Option<AuthToken>>;
}

/// Storage surface for todos, scoped by owner everywhere a caller could
/// otherwise reach another user's rows.
#[async_trait]
pub trait TodoRepository: Send + Sync + 'static {
    /// Current max ordering among the owner's todos, `None` on an empty
    /// scope. Used by the best-effort assignment path; the serialized
    /// path reads the max inside `bulk_create` instead.
    async fn max_ordering(&self, owner: UserId) -> anyhow::Result<Option<i64>>;

    /// Inserts all drafts atomically, in order. Drafts either all carry
    /// a precomputed ordering or all leave it to the repository.
    async fn bulk_create(&self, owner: UserId, drafts: Vec<TodoDraft>) -> anyhow::Result<Vec<Todo>>;

    /// The owner's todos matching `ids`, ascending by id. Unknown and
    /// foreign ids are simply absent from the result.
    async fn filter_by_ids(&self, owner: UserId, ids: &[i64]) -> anyhow::Result<Vec<Todo>>;

    async fn list(&self, owner: UserId) -> anyhow::Result<Vec<Todo>>;
    async fn get(&self, owner: UserId, id: TodoId) -> anyhow::Result<Option<Todo>>;

    /// Writes `fields` of every record in one atomic storage operation.
    async fn bulk_update(&self, records: &[Todo], fields: &[TodoField]) -> anyhow::Result<()>;

    /// Persists one ordering assignment on its own.
    async fn update_ordering(&self, id: TodoId, ordering: i64) -> anyhow::Result<()>;

    /// Stamps `last_added` on each referenced todo in one operation.
    async fn set_last_added(&self, updates: &[(TodoId, DateTime<Utc>)]) -> anyhow::Result<()>;

    /// Deletes the owner's todos matching `ids`; returns how many rows
    /// went away. Tasks cascade.
    async fn delete_by_ids(&self, owner: UserId, ids: &[i64]) -> anyhow::Result<u64>;
}

/// Storage surface for tasks. The owner scope is the parent todo's
/// owner; queries join through the todo.
#[async_trait]
pub trait TaskRepository: Send + Sync + 'static {
    async fn max_ordering(&self, todo: TodoId) -> anyhow::Result<Option<i64>>;
    async fn bulk_create(&self, drafts: Vec<TaskDraft>) -> anyhow::Result<Vec<Task>>;
    async fn filter_by_ids(&self, owner: UserId, ids: &[i64]) -> anyhow::Result<Vec<Task>>;
    async fn list(&self, owner: UserId) -> anyhow::Result<Vec<Task>>;
    async fn get(&self, owner: UserId, id: TaskId) -> anyhow::Result<Option<Task>>;
    async fn tasks_of(&self, todo: TodoId) -> anyhow::Result<Vec<Task>>;
    async fn bulk_update(&self, records: &[Task], fields: &[TaskField]) -> anyhow::Result<()>;
    async fn update_ordering(&self, id: TaskId, ordering: i64) -> anyhow::Result<()>;
    async fn delete_by_ids(&self, owner: UserId, ids: &[i64]) -> anyhow::Result<u64>;
}
