use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};

use crate::domain::repository::{TaskRepository, TodoRepository, UserRepository};
use crate::domain::todo::{Task, TaskDraft, TaskField, TaskId, Todo, TodoDraft, TodoField, TodoId};
use crate::domain::user::{AuthToken, NewUser, User, UserId};

/// All repository traits backed by one SQLite pool.
#[derive(Clone)]
pub struct SqliteRepositories {
    pool: Arc<Pool<Sqlite>>,
}

impl SqliteRepositories {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);
        // an in-memory database lives per connection; keep the pool at one
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1
            )",
        )
        .execute(&*self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tokens (
                key TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created TEXT NOT NULL
            )",
        )
        .execute(&*self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS todos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                last_added TEXT,
                ordering INTEGER NOT NULL
            )",
        )
        .execute(&*self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                todo_id INTEGER NOT NULL REFERENCES todos(id) ON DELETE CASCADE,
                task TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                ordering INTEGER NOT NULL
            )",
        )
        .execute(&*self.pool)
        .await?;
        Ok(())
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some(s) => Ok(Some(
            DateTime::parse_from_rfc3339(&s)
                .map_err(|e| anyhow::anyhow!("bad timestamp {s:?}: {e}"))?
                .with_timezone(&Utc),
        )),
    }
}

fn row_to_todo(row: &SqliteRow) -> Result<Todo> {
    Ok(Todo {
        id: TodoId(row.get("id")),
        owner: UserId(row.get("user_id")),
        title: row.get("title"),
        completed: row.get("completed"),
        last_added: parse_timestamp(row.get("last_added"))?,
        ordering: row.get("ordering"),
    })
}

fn row_to_task(row: &SqliteRow) -> Result<Task> {
    Ok(Task {
        id: TaskId(row.get("id")),
        todo: TodoId(row.get("todo_id")),
        task: row.get("task"),
        completed: row.get("completed"),
        ordering: row.get("ordering"),
    })
}

fn row_to_user(row: &SqliteRow) -> User {
    User {
        id: UserId(row.get("id")),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        is_active: row.get("is_active"),
    }
}

#[async_trait]
impl TodoRepository for SqliteRepositories {
    async fn max_ordering(&self, owner: UserId) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(ordering) AS max_ordering FROM todos WHERE user_id = ?1")
            .bind(owner.0)
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("max_ordering"))
    }

    async fn bulk_create(&self, owner: UserId, drafts: Vec<TodoDraft>) -> Result<Vec<Todo>> {
        let mut tx = self.pool.begin().await?;
        // drafts without a precomputed ordering are numbered here, with
        // the max read inside the same transaction
        let preassigned = drafts.iter().all(|d| d.ordering.is_some());
        let mut next = if preassigned {
            0
        } else {
            let row = sqlx::query("SELECT MAX(ordering) AS max_ordering FROM todos WHERE user_id = ?1")
                .bind(owner.0)
                .fetch_one(&mut *tx)
                .await?;
            row.get::<Option<i64>, _>("max_ordering").unwrap_or(0)
        };
        let mut out = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let ordering = match draft.ordering {
                Some(o) => o,
                None => {
                    next += 1;
                    next
                }
            };
            let result = sqlx::query(
                "INSERT INTO todos (user_id, title, completed, last_added, ordering)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(owner.0)
            .bind(&draft.title)
            .bind(draft.completed)
            .bind(draft.last_added.map(|t| t.to_rfc3339()))
            .bind(ordering)
            .execute(&mut *tx)
            .await?;
            out.push(Todo {
                id: TodoId(result.last_insert_rowid()),
                owner,
                title: draft.title,
                completed: draft.completed,
                last_added: draft.last_added,
                ordering,
            });
        }
        tx.commit().await?;
        Ok(out)
    }

    async fn filter_by_ids(&self, owner: UserId, ids: &[i64]) -> Result<Vec<Todo>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, user_id, title, completed, last_added, ordering FROM todos
             WHERE user_id = ? AND id IN ({}) ORDER BY id ASC",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql).bind(owner.0);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&*self.pool).await?;
        rows.iter().map(row_to_todo).collect()
    }

    async fn list(&self, owner: UserId) -> Result<Vec<Todo>> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, completed, last_added, ordering FROM todos
             WHERE user_id = ?1 ORDER BY id DESC",
        )
        .bind(owner.0)
        .fetch_all(&*self.pool)
        .await?;
        rows.iter().map(row_to_todo).collect()
    }

    async fn get(&self, owner: UserId, id: TodoId) -> Result<Option<Todo>> {
        let row = sqlx::query(
            "SELECT id, user_id, title, completed, last_added, ordering FROM todos
             WHERE user_id = ?1 AND id = ?2",
        )
        .bind(owner.0)
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;
        row.as_ref().map(row_to_todo).transpose()
    }

    async fn bulk_update(&self, records: &[Todo], fields: &[TodoField]) -> Result<()> {
        if records.is_empty() || fields.is_empty() {
            return Ok(());
        }
        let set_clause = fields
            .iter()
            .map(|f| match f {
                TodoField::Title => "title = ?",
                TodoField::Completed => "completed = ?",
                TodoField::Ordering => "ordering = ?",
                TodoField::LastAdded => "last_added = ?",
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE todos SET {set_clause} WHERE id = ?");
        let mut tx = self.pool.begin().await?;
        for record in records {
            let mut query = sqlx::query(&sql);
            for field in fields {
                query = match field {
                    TodoField::Title => query.bind(&record.title),
                    TodoField::Completed => query.bind(record.completed),
                    TodoField::Ordering => query.bind(record.ordering),
                    TodoField::LastAdded => query.bind(record.last_added.map(|t| t.to_rfc3339())),
                };
            }
            query.bind(record.id.0).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_ordering(&self, id: TodoId, ordering: i64) -> Result<()> {
        sqlx::query("UPDATE todos SET ordering = ?2 WHERE id = ?1")
            .bind(id.0)
            .bind(ordering)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn set_last_added(&self, updates: &[(TodoId, DateTime<Utc>)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for (id, stamp) in updates {
            sqlx::query("UPDATE todos SET last_added = ?2 WHERE id = ?1")
                .bind(id.0)
                .bind(stamp.to_rfc3339())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_ids(&self, owner: UserId, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM todos WHERE user_id = ? AND id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql).bind(owner.0);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(&*self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TaskRepository for SqliteRepositories {
    async fn max_ordering(&self, todo: TodoId) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(ordering) AS max_ordering FROM tasks WHERE todo_id = ?1")
            .bind(todo.0)
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("max_ordering"))
    }

    async fn bulk_create(&self, drafts: Vec<TaskDraft>) -> Result<Vec<Task>> {
        let mut tx = self.pool.begin().await?;
        // per-parent counters for drafts without a precomputed ordering
        let mut counters: HashMap<i64, i64> = HashMap::new();
        let mut out = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let ordering = match draft.ordering {
                Some(o) => o,
                None => {
                    let base = match counters.get(&draft.todo.0) {
                        Some(&n) => n,
                        None => {
                            let row = sqlx::query(
                                "SELECT MAX(ordering) AS max_ordering FROM tasks WHERE todo_id = ?1",
                            )
                            .bind(draft.todo.0)
                            .fetch_one(&mut *tx)
                            .await?;
                            row.get::<Option<i64>, _>("max_ordering").unwrap_or(0)
                        }
                    };
                    counters.insert(draft.todo.0, base + 1);
                    base + 1
                }
            };
            let result = sqlx::query(
                "INSERT INTO tasks (todo_id, task, completed, ordering) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(draft.todo.0)
            .bind(&draft.task)
            .bind(draft.completed)
            .bind(ordering)
            .execute(&mut *tx)
            .await?;
            out.push(Task {
                id: TaskId(result.last_insert_rowid()),
                todo: draft.todo,
                task: draft.task,
                completed: draft.completed,
                ordering,
            });
        }
        tx.commit().await?;
        Ok(out)
    }

    async fn filter_by_ids(&self, owner: UserId, ids: &[i64]) -> Result<Vec<Task>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT t.id, t.todo_id, t.task, t.completed, t.ordering FROM tasks t
             JOIN todos d ON d.id = t.todo_id
             WHERE d.user_id = ? AND t.id IN ({}) ORDER BY t.id ASC",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql).bind(owner.0);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&*self.pool).await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn list(&self, owner: UserId) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT t.id, t.todo_id, t.task, t.completed, t.ordering FROM tasks t
             JOIN todos d ON d.id = t.todo_id
             WHERE d.user_id = ?1 ORDER BY t.id ASC",
        )
        .bind(owner.0)
        .fetch_all(&*self.pool)
        .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn get(&self, owner: UserId, id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query(
            "SELECT t.id, t.todo_id, t.task, t.completed, t.ordering FROM tasks t
             JOIN todos d ON d.id = t.todo_id
             WHERE d.user_id = ?1 AND t.id = ?2",
        )
        .bind(owner.0)
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn tasks_of(&self, todo: TodoId) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, todo_id, task, completed, ordering FROM tasks
             WHERE todo_id = ?1 ORDER BY id ASC",
        )
        .bind(todo.0)
        .fetch_all(&*self.pool)
        .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn bulk_update(&self, records: &[Task], fields: &[TaskField]) -> Result<()> {
        if records.is_empty() || fields.is_empty() {
            return Ok(());
        }
        let set_clause = fields
            .iter()
            .map(|f| match f {
                TaskField::Text => "task = ?",
                TaskField::Completed => "completed = ?",
                TaskField::Ordering => "ordering = ?",
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE tasks SET {set_clause} WHERE id = ?");
        let mut tx = self.pool.begin().await?;
        for record in records {
            let mut query = sqlx::query(&sql);
            for field in fields {
                query = match field {
                    TaskField::Text => query.bind(&record.task),
                    TaskField::Completed => query.bind(record.completed),
                    TaskField::Ordering => query.bind(record.ordering),
                };
            }
            query.bind(record.id.0).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_ordering(&self, id: TaskId, ordering: i64) -> Result<()> {
        sqlx::query("UPDATE tasks SET ordering = ?2 WHERE id = ?1")
            .bind(id.0)
            .bind(ordering)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_ids(&self, owner: UserId, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM tasks WHERE id IN ({})
             AND todo_id IN (SELECT id FROM todos WHERE user_id = ?)",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.bind(owner.0).execute(&*self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserRepository for SqliteRepositories {
    async fn create_user(&self, draft: NewUser) -> Result<User> {
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, first_name, last_name, is_active)
             VALUES (?1, ?2, ?3, ?4, 1)",
        )
        .bind(&draft.email)
        .bind(&draft.password_hash)
        .bind(&draft.first_name)
        .bind(&draft.last_name)
        .execute(&*self.pool)
        .await?;
        Ok(User {
            id: UserId(result.last_insert_rowid()),
            email: draft.email,
            password_hash: draft.password_hash,
            first_name: draft.first_name,
            last_name: draft.last_name,
            is_active: true,
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, first_name, last_name, is_active FROM users
             WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, first_name, last_name, is_active FROM users
             WHERE id = ?1",
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "UPDATE users SET email = ?2, password_hash = ?3, first_name = ?4,
             last_name = ?5, is_active = ?6 WHERE id = ?1",
        )
        .bind(user.id.0)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn insert_token(&self, token: &AuthToken) -> Result<()> {
        sqlx::query("INSERT INTO tokens (key, user_id, created) VALUES (?1, ?2, ?3)")
            .bind(&token.key)
            .bind(token.user.0)
            .bind(token.created.to_rfc3339())
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn find_token(&self, key: &str) -> Result<Option<AuthToken>> {
        let row = sqlx::query("SELECT key, user_id, created FROM tokens WHERE key = ?1")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(AuthToken {
            key: row.get("key"),
            user: UserId(row.get("user_id")),
            created: parse_timestamp(row.get("created"))?
                .ok_or_else(|| anyhow::anyhow!("token without creation time"))?,
        }))
    }
}
