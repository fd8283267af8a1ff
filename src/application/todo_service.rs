use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::domain::batch::{BatchError, CreateTodoItem, ReorderItem, UpdateTodoItem};
use crate::domain::repository::{TaskRepository, TodoRepository};
use crate::domain::todo::{
    OrderingMode, Task, TaskDraft, Todo, TodoDraft, TodoField, TodoId, TodoWithTasks, UpdateTodo,
};
use crate::domain::user::UserId;

#[async_trait]
pub trait TodoService: Send + Sync + 'static {
    async fn create(&self, owner: UserId, input: CreateTodoItem) -> Result<TodoWithTasks>;
    async fn list(&self, owner: UserId) -> Result<Vec<TodoWithTasks>>;
    async fn get(&self, owner: UserId, id: TodoId) -> Result<Option<TodoWithTasks>>;
    async fn update(&self, owner: UserId, id: TodoId, input: UpdateTodo) -> Result<Option<TodoWithTasks>>;
    async fn delete(&self, owner: UserId, id: TodoId) -> Result<bool>;

    async fn batch_create(
        &self,
        owner: UserId,
        items: Vec<CreateTodoItem>,
    ) -> Result<Vec<TodoWithTasks>, BatchError>;
    async fn batch_update(
        &self,
        owner: UserId,
        items: Vec<UpdateTodoItem>,
    ) -> Result<Vec<Todo>, BatchError>;
    async fn batch_update_ordering(
        &self,
        owner: UserId,
        items: Vec<ReorderItem>,
    ) -> Result<Vec<Todo>, BatchError>;
    async fn batch_delete(&self, owner: UserId, ids: Vec<i64>) -> Result<Vec<Todo>, BatchError>;
}

#[derive(Clone)]
pub struct TodoServiceImpl<T: TodoRepository, K: TaskRepository> {
    todos: T,
    tasks: K,
    mode: OrderingMode,
}

impl<T: TodoRepository, K: TaskRepository> TodoServiceImpl<T, K> {
    pub fn new(todos: T, tasks: K, mode: OrderingMode) -> Self {
        Self { todos, tasks, mode }
    }

    /// Drafts for a create batch. Best effort reads the scope max here
    /// and numbers the whole batch from it; serialized leaves ordering
    /// unset so the repository assigns it inside the insert transaction.
    async fn drafts_for(&self, owner: UserId, items: &[CreateTodoItem]) -> Result<Vec<TodoDraft>> {
        let base = match self.mode {
            OrderingMode::BestEffort => Some(self.todos.max_ordering(owner).await?.unwrap_or(0)),
            OrderingMode::Serialized => None,
        };
        let now = Utc::now();
        Ok(items
            .iter()
            .enumerate()
            .map(|(i, item)| TodoDraft {
                title: item.title.clone(),
                completed: item.completed,
                last_added: Some(now),
                ordering: base.map(|b| b + 1 + i as i64),
            })
            .collect())
    }
}

#[async_trait]
impl<T: TodoRepository, K: TaskRepository> TodoService for TodoServiceImpl<T, K> {
    async fn create(&self, owner: UserId, input: CreateTodoItem) -> Result<TodoWithTasks> {
        let mut created = self
            .batch_create(owner, vec![input])
            .await
            .map_err(anyhow::Error::from)?;
        created
            .pop()
            .ok_or_else(|| anyhow::anyhow!("bulk create returned no record"))
    }

    async fn list(&self, owner: UserId) -> Result<Vec<TodoWithTasks>> {
        let todos = self.todos.list(owner).await?;
        let mut out = Vec::with_capacity(todos.len());
        for todo in todos {
            let tasks = self.tasks.tasks_of(todo.id).await?;
            out.push(TodoWithTasks { todo, tasks });
        }
        Ok(out)
    }

    async fn get(&self, owner: UserId, id: TodoId) -> Result<Option<TodoWithTasks>> {
        let Some(todo) = self.todos.get(owner, id).await? else {
            return Ok(None);
        };
        let tasks = self.tasks.tasks_of(todo.id).await?;
        Ok(Some(TodoWithTasks { todo, tasks }))
    }

    async fn update(&self, owner: UserId, id: TodoId, input: UpdateTodo) -> Result<Option<TodoWithTasks>> {
        let Some(mut todo) = self.todos.get(owner, id).await? else {
            return Ok(None);
        };
        if let Some(title) = input.title {
            todo.title = Some(title);
        }
        if let Some(completed) = input.completed {
            todo.completed = completed;
        }
        // single-record saves restamp last_added; bulk updates do not
        todo.last_added = Some(Utc::now());
        self.todos
            .bulk_update(
                std::slice::from_ref(&todo),
                &[TodoField::Title, TodoField::Completed, TodoField::LastAdded],
            )
            .await?;
        let tasks = self.tasks.tasks_of(todo.id).await?;
        Ok(Some(TodoWithTasks { todo, tasks }))
    }

    async fn delete(&self, owner: UserId, id: TodoId) -> Result<bool> {
        let deleted = self.todos.delete_by_ids(owner, &[id.0]).await?;
        Ok(deleted > 0)
    }

    async fn batch_create(
        &self,
        owner: UserId,
        items: Vec<CreateTodoItem>,
    ) -> Result<Vec<TodoWithTasks>, BatchError> {
        let drafts = self
            .drafts_for(owner, &items)
            .await
            .map_err(BatchError::Persistence)?;
        let todos = self
            .todos
            .bulk_create(owner, drafts)
            .await
            .map_err(BatchError::Persistence)?;

        // Nested tasks: each parent is brand new, so its scope starts
        // empty and positions run 1..n in submitted order.
        let mut task_drafts = Vec::new();
        for (todo, item) in todos.iter().zip(&items) {
            for (i, sub) in item.tasks.iter().enumerate() {
                task_drafts.push(TaskDraft {
                    todo: todo.id,
                    task: sub.task.clone(),
                    completed: sub.completed,
                    ordering: Some(i as i64 + 1),
                });
            }
        }
        let created_tasks = if task_drafts.is_empty() {
            Vec::new()
        } else {
            self.tasks
                .bulk_create(task_drafts)
                .await
                .map_err(BatchError::Persistence)?
        };

        let mut by_todo: HashMap<TodoId, Vec<Task>> = HashMap::new();
        for task in created_tasks {
            by_todo.entry(task.todo).or_default().push(task);
        }
        tracing::info!(owner = owner.0, count = todos.len(), "batch created todos");
        Ok(todos
            .into_iter()
            .map(|todo| {
                let tasks = by_todo.remove(&todo.id).unwrap_or_default();
                TodoWithTasks { todo, tasks }
            })
            .collect())
    }

    async fn batch_update(
        &self,
        owner: UserId,
        items: Vec<UpdateTodoItem>,
    ) -> Result<Vec<Todo>, BatchError> {
        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let records = self
            .todos
            .filter_by_ids(owner, &ids)
            .await
            .map_err(BatchError::Persistence)?;

        let mut by_id: HashMap<i64, Todo> =
            records.into_iter().map(|t| (t.id.0, t)).collect();
        let mut fields = Vec::new();
        for item in &items {
            // ids outside the caller's scope are skipped, not an error
            let Some(record) = by_id.get_mut(&item.id) else {
                continue;
            };
            if let Some(title) = &item.title {
                record.title = Some(title.clone());
                if !fields.contains(&TodoField::Title) {
                    fields.push(TodoField::Title);
                }
            }
            if let Some(completed) = item.completed {
                record.completed = completed;
                if !fields.contains(&TodoField::Completed) {
                    fields.push(TodoField::Completed);
                }
            }
        }

        let mut updated: Vec<Todo> = by_id.into_values().collect();
        updated.sort_by_key(|t| t.id);
        if !fields.is_empty() {
            self.todos
                .bulk_update(&updated, &fields)
                .await
                .map_err(BatchError::Persistence)?;
        }
        Ok(updated)
    }

    async fn batch_update_ordering(
        &self,
        owner: UserId,
        items: Vec<ReorderItem>,
    ) -> Result<Vec<Todo>, BatchError> {
        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let requested: HashMap<i64, i64> = items.iter().map(|i| (i.id, i.ordering)).collect();

        let mut records = self
            .todos
            .filter_by_ids(owner, &ids)
            .await
            .map_err(BatchError::Persistence)?;
        for record in &mut records {
            if let Some(&ordering) = requested.get(&record.id.0) {
                record.ordering = ordering;
                // each assignment is persisted on its own
                self.todos
                    .update_ordering(record.id, ordering)
                    .await
                    .map_err(BatchError::Persistence)?;
            }
        }
        Ok(records)
    }

    async fn batch_delete(&self, owner: UserId, ids: Vec<i64>) -> Result<Vec<Todo>, BatchError> {
        // pre-deletion snapshot of whatever actually matched the scope
        let snapshot = self
            .todos
            .filter_by_ids(owner, &ids)
            .await
            .map_err(BatchError::Persistence)?;
        if !snapshot.is_empty() {
            self.todos
                .delete_by_ids(owner, &ids)
                .await
                .map_err(BatchError::Persistence)?;
        }
        tracing::info!(owner = owner.0, count = snapshot.len(), "batch deleted todos");
        Ok(snapshot)
    }
}
