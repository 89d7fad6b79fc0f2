use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Todo, TodoPatch};
use crate::db::StoreError;

/// Per-user todo persistence. Every call is scoped by `user_id`; a todo
/// owned by someone else behaves as if it did not exist.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Todo>, StoreError>;
    async fn create(&self, user_id: Uuid, name: &str) -> Result<Todo, StoreError>;
    async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: TodoPatch,
    ) -> Result<Option<Todo>, StoreError>;
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgTodoStore {
    db: PgPool,
}

impl PgTodoStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TodoStore for PgTodoStore {
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Todo>, StoreError> {
        let rows = sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, user_id, name, completed, created_at, updated_at
            FROM todos
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn create(&self, user_id: Uuid, name: &str) -> Result<Todo, StoreError> {
        let todo = sqlx::query_as::<_, Todo>(
            r#"
            INSERT INTO todos (id, user_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, name, completed, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.db)
        .await?;
        Ok(todo)
    }

    async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: TodoPatch,
    ) -> Result<Option<Todo>, StoreError> {
        let todo = sqlx::query_as::<_, Todo>(
            r#"
            UPDATE todos
               SET name = COALESCE($3, name),
                   completed = COALESCE($4, completed),
                   updated_at = now()
             WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, name, completed, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(patch.name)
        .bind(patch.completed)
        .fetch_optional(&self.db)
        .await?;
        Ok(todo)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query(r#"DELETE FROM todos WHERE id = $1 AND user_id = $2"#)
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[derive(Default)]
pub struct MemoryTodoStore {
    todos: Mutex<HashMap<Uuid, Todo>>, // key: todo id
}

impl MemoryTodoStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Todo>>, StoreError> {
        self.todos
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("todo store lock poisoned")))
    }
}

#[async_trait]
impl TodoStore for MemoryTodoStore {
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Todo>, StoreError> {
        let mut rows: Vec<Todo> = self
            .lock()?
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create(&self, user_id: Uuid, name: &str) -> Result<Todo, StoreError> {
        let now = OffsetDateTime::now_utc();
        let todo = Todo {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            completed: false,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: TodoPatch,
    ) -> Result<Option<Todo>, StoreError> {
        let mut todos = self.lock()?;
        let Some(todo) = todos.get_mut(&id).filter(|t| t.user_id == user_id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            todo.name = name;
        }
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }
        todo.updated_at = OffsetDateTime::now_utc();
        Ok(Some(todo.clone()))
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut todos = self.lock()?;
        match todos.get(&id) {
            Some(t) if t.user_id == user_id => {
                todos.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
