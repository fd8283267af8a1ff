//! Batch payload validation.
//!
//! Batch endpoints accept flat lists of loosely typed JSON items. The
//! functions here normalize those lists into the typed items the
//! services work with, and enforce the request-level rules (integer
//! casts, id/ordering uniqueness, field types) before anything touches
//! storage. Validation never has side effects; a failing list leaves
//! every record untouched.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::todo::TodoId;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("cannot make multiple request operations on a single instance")]
    DuplicateReference,
    #[error("cannot assign the same ordering to multiple instances")]
    DuplicateOrdering,
    #[error("invalid type for field `{field}`")]
    InvalidFieldType { field: &'static str },
    #[error("batch persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),
}

/// One entry of a todo `create_list`, optionally carrying nested tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTodoItem {
    pub title: Option<String>,
    pub completed: bool,
    pub tasks: Vec<CreateSubtask>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubtask {
    pub task: String,
    pub completed: bool,
}

/// One entry of a task `create_list`. `todo_last_added` is a hint the
/// caller may attach; the engine writes it onto the parent todo after
/// all tasks of the batch are inserted, last write winning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskItem {
    pub task: String,
    pub completed: bool,
    pub todo_id: TodoId,
    pub todo_last_added: Option<DateTime<Utc>>,
}

/// One entry of an `ordering_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderItem {
    pub id: i64,
    pub ordering: i64,
}

/// One entry of a todo `update_list`. `id` selects the record and is
/// itself never written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTodoItem {
    pub id: i64,
    pub title: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTaskItem {
    pub id: i64,
    pub task: Option<String>,
    pub completed: Option<bool>,
    pub ordering: Option<i64>,
    pub todo_last_added: Option<DateTime<Utc>>,
}

/// Integer cast for list item fields. Accepts JSON integers and strings
/// holding an integer, the same coercion the wire contract has always
/// allowed.
fn cast_int(value: &Value, field: &'static str) -> Result<i64, BatchError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or(BatchError::InvalidFieldType { field }),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| BatchError::InvalidFieldType { field }),
        _ => Err(BatchError::InvalidFieldType { field }),
    }
}

fn item_field<'a>(item: &'a Value, field: &'static str) -> Result<&'a Value, BatchError> {
    item.get(field)
        .ok_or(BatchError::InvalidFieldType { field })
}

/// Casts `field` of every item to an integer. With `unique`, a repeated
/// value fails the whole list: one batch may not target the same record
/// twice.
pub fn validate_ids(items: &[Value], field: &'static str, unique: bool) -> Result<Vec<i64>, BatchError> {
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        ids.push(cast_int(item_field(item, field)?, field)?);
    }
    if unique {
        let distinct: HashSet<i64> = ids.iter().copied().collect();
        if distinct.len() != ids.len() {
            return Err(BatchError::DuplicateReference);
        }
    }
    Ok(ids)
}

/// Same cast as [`validate_ids`] over requested ordering values, with
/// its own error: two items asking for the same position is a conflict
/// the engine refuses up front.
pub fn validate_orderings(
    items: &[Value],
    field: &'static str,
    unique: bool,
) -> Result<Vec<i64>, BatchError> {
    let mut orderings = Vec::with_capacity(items.len());
    for item in items {
        orderings.push(cast_int(item_field(item, field)?, field)?);
    }
    if unique {
        let distinct: HashSet<i64> = orderings.iter().copied().collect();
        if distinct.len() != orderings.len() {
            return Err(BatchError::DuplicateOrdering);
        }
    }
    Ok(orderings)
}

/// Delete lists carry bare integers, not objects. Duplicates are
/// dropped silently; deleting the same id twice is a no-op, not an
/// error. First-occurrence order is kept.
pub fn validate_delete_ids(items: &[Value]) -> Result<Vec<i64>, BatchError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let id = cast_int(item, "delete_list")?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn optional_string(item: &Value, field: &'static str) -> Result<Option<String>, BatchError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(BatchError::InvalidFieldType { field }),
    }
}

fn required_string(item: &Value, field: &'static str) -> Result<String, BatchError> {
    optional_string(item, field)?.ok_or(BatchError::InvalidFieldType { field })
}

fn optional_bool(item: &Value, field: &'static str) -> Result<Option<bool>, BatchError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(BatchError::InvalidFieldType { field }),
    }
}

fn optional_datetime(item: &Value, field: &'static str) -> Result<Option<DateTime<Utc>>, BatchError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| BatchError::InvalidFieldType { field }),
        Some(_) => Err(BatchError::InvalidFieldType { field }),
    }
}

fn optional_int(item: &Value, field: &'static str) -> Result<Option<i64>, BatchError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => cast_int(v, field).map(Some),
    }
}

fn as_object<'a>(item: &'a Value, field: &'static str) -> Result<&'a Value, BatchError> {
    if item.is_object() {
        Ok(item)
    } else {
        Err(BatchError::InvalidFieldType { field })
    }
}

pub fn parse_create_todo_list(items: &[Value]) -> Result<Vec<CreateTodoItem>, BatchError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let item = as_object(item, "create_list")?;
        let tasks = match item.get("tasks") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(subitems)) => {
                let mut tasks = Vec::with_capacity(subitems.len());
                for sub in subitems {
                    let sub = as_object(sub, "tasks")?;
                    tasks.push(CreateSubtask {
                        task: required_string(sub, "task")?,
                        completed: optional_bool(sub, "completed")?.unwrap_or(false),
                    });
                }
                tasks
            }
            Some(_) => return Err(BatchError::InvalidFieldType { field: "tasks" }),
        };
        out.push(CreateTodoItem {
            title: optional_string(item, "title")?,
            completed: optional_bool(item, "completed")?.unwrap_or(false),
            tasks,
        });
    }
    Ok(out)
}

pub fn parse_create_task_list(items: &[Value]) -> Result<Vec<CreateTaskItem>, BatchError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let item = as_object(item, "create_list")?;
        out.push(CreateTaskItem {
            task: required_string(item, "task")?,
            completed: optional_bool(item, "completed")?.unwrap_or(false),
            todo_id: TodoId(cast_int(item_field(item, "todo_id")?, "todo_id")?),
            todo_last_added: optional_datetime(item, "todo_last_added")?,
        });
    }
    Ok(out)
}

pub fn parse_reorder_list(items: &[Value]) -> Result<Vec<ReorderItem>, BatchError> {
    let ids = validate_ids(items, "id", true)?;
    let orderings = validate_orderings(items, "ordering", true)?;
    Ok(ids
        .into_iter()
        .zip(orderings)
        .map(|(id, ordering)| ReorderItem { id, ordering })
        .collect())
}

pub fn parse_update_todo_list(items: &[Value]) -> Result<Vec<UpdateTodoItem>, BatchError> {
    let ids = validate_ids(items, "id", true)?;
    let mut out = Vec::with_capacity(items.len());
    for (item, id) in items.iter().zip(ids) {
        out.push(UpdateTodoItem {
            id,
            title: optional_string(item, "title")?,
            completed: optional_bool(item, "completed")?,
        });
    }
    Ok(out)
}

pub fn parse_update_task_list(items: &[Value]) -> Result<Vec<UpdateTaskItem>, BatchError> {
    let ids = validate_ids(items, "id", true)?;
    let mut out = Vec::with_capacity(items.len());
    for (item, id) in items.iter().zip(ids) {
        out.push(UpdateTaskItem {
            id,
            task: optional_string(item, "task")?,
            completed: optional_bool(item, "completed")?,
            ordering: optional_int(item, "ordering")?,
            todo_last_added: optional_datetime(item, "todo_last_added")?,
        });
    }
    Ok(out)
}
