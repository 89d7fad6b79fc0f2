use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};
use crate::db::StoreError;

/// Persistence for user accounts. Implementations must reject a second
/// user with the same email with `StoreError::UniqueViolation`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn create(&self, new: NewUser<'_>) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    /// Find a user by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password.
    async fn create(&self, new: NewUser<'_>) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, name, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.email)
        .bind(new.name)
        .bind(new.password_hash)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }
}

/// Process-local store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>, // key: email
}

impl MemoryUserStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, User>>, StoreError> {
        self.users
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("user store lock poisoned")))
    }

    #[cfg(test)]
    pub fn insert(&self, user: User) {
        self.lock().unwrap().insert(user.email.clone(), user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.get(email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.values().find(|u| u.id == id).cloned())
    }

    async fn create(&self, new: NewUser<'_>) -> Result<User, StoreError> {
        let mut users = self.lock()?;
        if users.contains_key(new.email) {
            return Err(StoreError::UniqueViolation);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email.to_string(),
            name: new.name.map(str::to_string),
            password_hash: Some(new.password_hash.to_string()),
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.email.clone(), user.clone());
        Ok(user)
    }
}
