//! Shared in-memory repositories for service unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::repository::{TaskRepository, TodoRepository, UserRepository};
use crate::domain::todo::{Task, TaskDraft, TaskField, TaskId, Todo, TodoDraft, TodoField, TodoId};
use crate::domain::user::{AuthToken, NewUser, User, UserId};

#[derive(Default)]
struct Inner {
    todos: BTreeMap<i64, Todo>,
    tasks: BTreeMap<i64, Task>,
    users: BTreeMap<i64, User>,
    tokens: HashMap<String, AuthToken>,
    next_todo: i64,
    next_task: i64,
    next_user: i64,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn todo(&self, id: i64) -> Option<Todo> {
        self.inner.lock().unwrap().todos.get(&id).cloned()
    }

    pub fn task(&self, id: i64) -> Option<Task> {
        self.inner.lock().unwrap().tasks.get(&id).cloned()
    }

    pub fn todo_count(&self) -> usize {
        self.inner.lock().unwrap().todos.len()
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().unwrap().tasks.len()
    }
}

#[async_trait]
impl TodoRepository for MemoryStore {
    async fn max_ordering(&self, owner: UserId) -> Result<Option<i64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .todos
            .values()
            .filter(|t| t.owner == owner)
            .map(|t| t.ordering)
            .max())
    }

    async fn bulk_create(&self, owner: UserId, drafts: Vec<TodoDraft>) -> Result<Vec<Todo>> {
        let mut inner = self.inner.lock().unwrap();
        let mut next = inner
            .todos
            .values()
            .filter(|t| t.owner == owner)
            .map(|t| t.ordering)
            .max()
            .unwrap_or(0);
        let mut out = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let ordering = draft.ordering.unwrap_or_else(|| {
                next += 1;
                next
            });
            inner.next_todo += 1;
            let todo = Todo {
                id: TodoId(inner.next_todo),
                owner,
                title: draft.title,
                completed: draft.completed,
                last_added: draft.last_added,
                ordering,
            };
            inner.todos.insert(todo.id.0, todo.clone());
            out.push(todo);
        }
        Ok(out)
    }

    async fn filter_by_ids(&self, owner: UserId, ids: &[i64]) -> Result<Vec<Todo>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .todos
            .values()
            .filter(|t| t.owner == owner && ids.contains(&t.id.0))
            .cloned()
            .collect())
    }

    async fn list(&self, owner: UserId) -> Result<Vec<Todo>> {
        let inner = self.inner.lock().unwrap();
        let mut todos: Vec<Todo> = inner
            .todos
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        todos.sort_by_key(|t| std::cmp::Reverse(t.id));
        Ok(todos)
    }

    async fn get(&self, owner: UserId, id: TodoId) -> Result<Option<Todo>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.todos.get(&id.0).filter(|t| t.owner == owner).cloned())
    }

    async fn bulk_update(&self, records: &[Todo], fields: &[TodoField]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for record in records {
            let Some(stored) = inner.todos.get_mut(&record.id.0) else {
                continue;
            };
            for field in fields {
                match field {
                    TodoField::Title => stored.title = record.title.clone(),
                    TodoField::Completed => stored.completed = record.completed,
                    TodoField::Ordering => stored.ordering = record.ordering,
                    TodoField::LastAdded => stored.last_added = record.last_added,
                }
            }
        }
        Ok(())
    }

    async fn update_ordering(&self, id: TodoId, ordering: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(stored) = inner.todos.get_mut(&id.0) {
            stored.ordering = ordering;
        }
        Ok(())
    }

    async fn set_last_added(&self, updates: &[(TodoId, DateTime<Utc>)]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for (id, stamp) in updates {
            if let Some(stored) = inner.todos.get_mut(&id.0) {
                stored.last_added = Some(*stamp);
            }
        }
        Ok(())
    }

    async fn delete_by_ids(&self, owner: UserId, ids: &[i64]) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let doomed: Vec<i64> = inner
            .todos
            .values()
            .filter(|t| t.owner == owner && ids.contains(&t.id.0))
            .map(|t| t.id.0)
            .collect();
        for id in &doomed {
            inner.todos.remove(id);
            inner.tasks.retain(|_, task| task.todo.0 != *id);
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn max_ordering(&self, todo: TodoId) -> Result<Option<i64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.todo == todo)
            .map(|t| t.ordering)
            .max())
    }

    async fn bulk_create(&self, drafts: Vec<TaskDraft>) -> Result<Vec<Task>> {
        let mut inner = self.inner.lock().unwrap();
        let mut counters: HashMap<i64, i64> = HashMap::new();
        let mut out = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let ordering = match draft.ordering {
                Some(o) => o,
                None => {
                    let base = match counters.get(&draft.todo.0) {
                        Some(&n) => n,
                        None => inner
                            .tasks
                            .values()
                            .filter(|t| t.todo == draft.todo)
                            .map(|t| t.ordering)
                            .max()
                            .unwrap_or(0),
                    };
                    counters.insert(draft.todo.0, base + 1);
                    base + 1
                }
            };
            inner.next_task += 1;
            let task = Task {
                id: TaskId(inner.next_task),
                todo: draft.todo,
                task: draft.task,
                completed: draft.completed,
                ordering,
            };
            inner.tasks.insert(task.id.0, task.clone());
            out.push(task);
        }
        Ok(out)
    }

    async fn filter_by_ids(&self, owner: UserId, ids: &[i64]) -> Result<Vec<Task>> {
        let inner = self.inner.lock().unwrap();
        let owned: Vec<i64> = inner
            .todos
            .values()
            .filter(|t| t.owner == owner)
            .map(|t| t.id.0)
            .collect();
        Ok(inner
            .tasks
            .values()
            .filter(|t| ids.contains(&t.id.0) && owned.contains(&t.todo.0))
            .cloned()
            .collect())
    }

    async fn list(&self, owner: UserId) -> Result<Vec<Task>> {
        let inner = self.inner.lock().unwrap();
        let owned: Vec<i64> = inner
            .todos
            .values()
            .filter(|t| t.owner == owner)
            .map(|t| t.id.0)
            .collect();
        Ok(inner
            .tasks
            .values()
            .filter(|t| owned.contains(&t.todo.0))
            .cloned()
            .collect())
    }

    async fn get(&self, owner: UserId, id: TaskId) -> Result<Option<Task>> {
        Ok(TaskRepository::filter_by_ids(self, owner, &[id.0])
            .await?
            .pop())
    }

    async fn tasks_of(&self, todo: TodoId) -> Result<Vec<Task>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.todo == todo)
            .cloned()
            .collect())
    }

    async fn bulk_update(&self, records: &[Task], fields: &[TaskField]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for record in records {
            let Some(stored) = inner.tasks.get_mut(&record.id.0) else {
                continue;
            };
            for field in fields {
                match field {
                    TaskField::Text => stored.task = record.task.clone(),
                    TaskField::Completed => stored.completed = record.completed,
                    TaskField::Ordering => stored.ordering = record.ordering,
                }
            }
        }
        Ok(())
    }

    async fn update_ordering(&self, id: TaskId, ordering: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(stored) = inner.tasks.get_mut(&id.0) {
            stored.ordering = ordering;
        }
        Ok(())
    }

    async fn delete_by_ids(&self, owner: UserId, ids: &[i64]) -> Result<u64> {
        let doomed: Vec<i64> = TaskRepository::filter_by_ids(self, owner, ids)
            .await?
            .into_iter()
            .map(|t| t.id.0)
            .collect();
        let mut inner = self.inner.lock().unwrap();
        for id in &doomed {
            inner.tasks.remove(id);
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, draft: NewUser) -> Result<User> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_user += 1;
        let user = User {
            id: UserId(inner.next_user),
            email: draft.email,
            password_hash: draft.password_hash,
            first_name: draft.first_name,
            last_name: draft.last_name,
            is_active: true,
        };
        inner.users.insert(user.id.0, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.get(&id.0).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(user.id.0, user.clone());
        Ok(())
    }

    async fn insert_token(&self, token: &AuthToken) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.tokens.insert(token.key.clone(), token.clone());
        Ok(())
    }

    async fn find_token(&self, key: &str) -> Result<Option<AuthToken>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tokens.get(key).cloned())
    }
}

/// Seeds an owner with `n` todos ordered 1..=n; returns their ids.
pub async fn seed_todos(store: &MemoryStore, owner: UserId, n: usize) -> Vec<i64> {
    let drafts = (0..n)
        .map(|i| TodoDraft {
            title: Some(format!("todo {}", i + 1)),
            completed: false,
            last_added: None,
            ordering: None,
        })
        .collect();
    TodoRepository::bulk_create(store, owner, drafts)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id.0)
        .collect()
}
