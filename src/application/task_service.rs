use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::batch::{BatchError, CreateTaskItem, ReorderItem, UpdateTaskItem};
use crate::domain::repository::{TaskRepository, TodoRepository};
use crate::domain::todo::{OrderingMode, Task, TaskDraft, TaskField, TaskId, TodoId, UpdateTask};
use crate::domain::user::UserId;

#[async_trait]
pub trait TaskService: Send + Sync + 'static {
    async fn create(&self, owner: UserId, input: CreateTaskItem) -> Result<Task, BatchError>;
    async fn list(&self, owner: UserId) -> Result<Vec<Task>>;
    async fn get(&self, owner: UserId, id: TaskId) -> Result<Option<Task>>;
    async fn update(&self, owner: UserId, id: TaskId, input: UpdateTask) -> Result<Option<Task>>;
    async fn delete(&self, owner: UserId, id: TaskId) -> Result<bool>;

    async fn batch_create(
        &self,
        owner: UserId,
        items: Vec<CreateTaskItem>,
    ) -> Result<Vec<Task>, BatchError>;
    async fn batch_update(
        &self,
        owner: UserId,
        items: Vec<UpdateTaskItem>,
    ) -> Result<Vec<Task>, BatchError>;
    async fn batch_update_ordering(
        &self,
        owner: UserId,
        items: Vec<ReorderItem>,
    ) -> Result<Vec<Task>, BatchError>;
    async fn batch_delete(&self, owner: UserId, ids: Vec<i64>) -> Result<Vec<Task>, BatchError>;
}

#[derive(Clone)]
pub struct TaskServiceImpl<T: TodoRepository, K: TaskRepository> {
    todos: T,
    tasks: K,
    mode: OrderingMode,
}

impl<T: TodoRepository, K: TaskRepository> TaskServiceImpl<T, K> {
    pub fn new(todos: T, tasks: K, mode: OrderingMode) -> Self {
        Self { todos, tasks, mode }
    }

    /// Every `todo_id` in the batch must resolve inside the caller's
    /// scope; a foreign or unknown parent fails the whole batch before
    /// any insert.
    async fn check_parents(&self, owner: UserId, items: &[CreateTaskItem]) -> Result<(), BatchError> {
        let parent_ids: Vec<i64> = {
            let distinct: HashSet<i64> = items.iter().map(|i| i.todo_id.0).collect();
            distinct.into_iter().collect()
        };
        let found = self
            .todos
            .filter_by_ids(owner, &parent_ids)
            .await
            .map_err(BatchError::Persistence)?;
        if found.len() != parent_ids.len() {
            let known: HashSet<i64> = found.iter().map(|t| t.id.0).collect();
            let missing = parent_ids
                .iter()
                .copied()
                .find(|id| !known.contains(id))
                .unwrap_or_default();
            return Err(BatchError::Persistence(anyhow::anyhow!(
                "todo {missing} does not exist for this user"
            )));
        }
        Ok(())
    }

    /// Numbers a batch of drafts with one running counter per parent
    /// todo, seeded from the parent's current max, in submitted order.
    async fn drafts_for(&self, items: &[CreateTaskItem]) -> Result<Vec<TaskDraft>> {
        let mut counters: HashMap<i64, i64> = HashMap::new();
        let mut drafts = Vec::with_capacity(items.len());
        for item in items {
            let ordering = match self.mode {
                OrderingMode::Serialized => None,
                OrderingMode::BestEffort => {
                    let base = match counters.get(&item.todo_id.0) {
                        Some(&n) => n,
                        None => self.tasks.max_ordering(item.todo_id).await?.unwrap_or(0),
                    };
                    counters.insert(item.todo_id.0, base + 1);
                    Some(base + 1)
                }
            };
            drafts.push(TaskDraft {
                todo: item.todo_id,
                task: item.task.clone(),
                completed: item.completed,
                ordering,
            });
        }
        Ok(drafts)
    }

    async fn flush_last_added(
        &self,
        hints: HashMap<TodoId, DateTime<Utc>>,
    ) -> Result<(), BatchError> {
        if hints.is_empty() {
            return Ok(());
        }
        let updates: Vec<(TodoId, DateTime<Utc>)> = hints.into_iter().collect();
        self.todos
            .set_last_added(&updates)
            .await
            .map_err(BatchError::Persistence)
    }
}

#[async_trait]
impl<T: TodoRepository, K: TaskRepository> TaskService for TaskServiceImpl<T, K> {
    async fn create(&self, owner: UserId, input: CreateTaskItem) -> Result<Task, BatchError> {
        let parent = input.todo_id;
        let had_hint = input.todo_last_added.is_some();
        let mut created = self.batch_create(owner, vec![input]).await?;
        let task = created
            .pop()
            .ok_or_else(|| BatchError::Persistence(anyhow::anyhow!("bulk create returned no record")))?;
        // adding a task touches the parent; an explicit hint wins
        if !had_hint {
            self.todos
                .set_last_added(&[(parent, Utc::now())])
                .await
                .map_err(BatchError::Persistence)?;
        }
        Ok(task)
    }

    async fn list(&self, owner: UserId) -> Result<Vec<Task>> {
        self.tasks.list(owner).await
    }

    async fn get(&self, owner: UserId, id: TaskId) -> Result<Option<Task>> {
        self.tasks.get(owner, id).await
    }

    async fn update(&self, owner: UserId, id: TaskId, input: UpdateTask) -> Result<Option<Task>> {
        let Some(mut task) = self.tasks.get(owner, id).await? else {
            return Ok(None);
        };
        if let Some(text) = input.task {
            task.task = text;
        }
        if let Some(completed) = input.completed {
            task.completed = completed;
        }
        self.tasks
            .bulk_update(
                std::slice::from_ref(&task),
                &[TaskField::Text, TaskField::Completed],
            )
            .await?;
        Ok(Some(task))
    }

    async fn delete(&self, owner: UserId, id: TaskId) -> Result<bool> {
        let deleted = self.tasks.delete_by_ids(owner, &[id.0]).await?;
        Ok(deleted > 0)
    }

    async fn batch_create(
        &self,
        owner: UserId,
        items: Vec<CreateTaskItem>,
    ) -> Result<Vec<Task>, BatchError> {
        self.check_parents(owner, &items).await?;
        let drafts = self.drafts_for(&items).await.map_err(BatchError::Persistence)?;
        let created = self
            .tasks
            .bulk_create(drafts)
            .await
            .map_err(BatchError::Persistence)?;

        // hints flushed once after all inserts; later items overwrite
        // earlier ones targeting the same todo
        let mut hints: HashMap<TodoId, DateTime<Utc>> = HashMap::new();
        for item in &items {
            if let Some(stamp) = item.todo_last_added {
                hints.insert(item.todo_id, stamp);
            }
        }
        self.flush_last_added(hints).await?;
        tracing::info!(owner = owner.0, count = created.len(), "batch created tasks");
        Ok(created)
    }

    async fn batch_update(
        &self,
        owner: UserId,
        items: Vec<UpdateTaskItem>,
    ) -> Result<Vec<Task>, BatchError> {
        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let records = self
            .tasks
            .filter_by_ids(owner, &ids)
            .await
            .map_err(BatchError::Persistence)?;

        let mut by_id: HashMap<i64, Task> = records.into_iter().map(|t| (t.id.0, t)).collect();
        let mut fields = Vec::new();
        let mut hints: HashMap<TodoId, DateTime<Utc>> = HashMap::new();
        for item in &items {
            let Some(record) = by_id.get_mut(&item.id) else {
                continue;
            };
            if let Some(text) = &item.task {
                record.task = text.clone();
                if !fields.contains(&TaskField::Text) {
                    fields.push(TaskField::Text);
                }
            }
            if let Some(completed) = item.completed {
                record.completed = completed;
                if !fields.contains(&TaskField::Completed) {
                    fields.push(TaskField::Completed);
                }
            }
            if let Some(ordering) = item.ordering {
                record.ordering = ordering;
                if !fields.contains(&TaskField::Ordering) {
                    fields.push(TaskField::Ordering);
                }
            }
            if let Some(stamp) = item.todo_last_added {
                hints.insert(record.todo, stamp);
            }
        }

        let mut updated: Vec<Task> = by_id.into_values().collect();
        updated.sort_by_key(|t| t.id);
        if !fields.is_empty() {
            self.tasks
                .bulk_update(&updated, &fields)
                .await
                .map_err(BatchError::Persistence)?;
        }
        self.flush_last_added(hints).await?;
        Ok(updated)
    }

    async fn batch_update_ordering(
        &self,
        owner: UserId,
        items: Vec<ReorderItem>,
    ) -> Result<Vec<Task>, BatchError> {
        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let requested: HashMap<i64, i64> = items.iter().map(|i| (i.id, i.ordering)).collect();

        let mut records = self
            .tasks
            .filter_by_ids(owner, &ids)
            .await
            .map_err(BatchError::Persistence)?;
        for record in &mut records {
            if let Some(&ordering) = requested.get(&record.id.0) {
                record.ordering = ordering;
                self.tasks
                    .update_ordering(record.id, ordering)
                    .await
                    .map_err(BatchError::Persistence)?;
            }
        }
        Ok(records)
    }

    async fn batch_delete(&self, owner: UserId, ids: Vec<i64>) -> Result<Vec<Task>, BatchError> {
        let snapshot = self
            .tasks
            .filter_by_ids(owner, &ids)
            .await
            .map_err(BatchError::Persistence)?;
        if !snapshot.is_empty() {
            self.tasks
                .delete_by_ids(owner, &ids)
                .await
                .map_err(BatchError::Persistence)?;
        }
        Ok(snapshot)
    }
}
