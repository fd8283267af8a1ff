use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TodoId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub i64);

/// A todo list owned by one user. `ordering` is the 1-based display
/// position, unique among the owner's todos; gaps are allowed after
/// deletion and survivors are never renumbered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: TodoId,
    pub owner: UserId,
    pub title: Option<String>,
    pub completed: bool,
    pub last_added: Option<DateTime<Utc>>,
    pub ordering: i64,
}

/// A task line inside one todo. `ordering` is unique among the parent
/// todo's tasks, same rules as [`Todo::ordering`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub todo: TodoId,
    pub task: String,
    pub completed: bool,
    pub ordering: i64,
}

/// A todo not yet persisted. `ordering: None` asks the repository to
/// assign max+1 inside its own insert transaction (serialized mode);
/// `Some` carries a value the service computed up front (best effort).
#[derive(Debug, Clone)]
pub struct TodoDraft {
    pub title: Option<String>,
    pub completed: bool,
    pub last_added: Option<DateTime<Utc>>,
    pub ordering: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub todo: TodoId,
    pub task: String,
    pub completed: bool,
    pub ordering: Option<i64>,
}

/// Columns a bulk update may write. Mirrors the storage contract of
/// `bulk_update(records, fields)`: the union of fields touched across a
/// batch is written for every record in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TodoField {
    Title,
    Completed,
    Ordering,
    LastAdded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskField {
    Text,
    Completed,
    Ordering,
}

/// Partial update for a single todo.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTodo {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    pub task: Option<String>,
    pub completed: Option<bool>,
}

/// How next-ordering values are obtained on the create paths.
///
/// `BestEffort` reproduces the reference behavior: the scope max is read
/// in one storage call and the insert happens in another, so two
/// concurrent creates in the same scope can race and assign the same
/// position. `Serialized` closes that gap by reading the max inside the
/// insert transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderingMode {
    #[default]
    BestEffort,
    Serialized,
}

impl OrderingMode {
    pub fn from_env_str(value: &str) -> Option<Self> {
        match value {
            "best-effort" => Some(Self::BestEffort),
            "serialized" => Some(Self::Serialized),
            _ => None,
        }
    }
}

/// A todo together with its tasks, the shape list/detail responses use.
#[derive(Debug, Clone, Serialize)]
pub struct TodoWithTasks {
    pub todo: Todo,
    pub tasks: Vec<Task>,
}
