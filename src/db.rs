use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

/// Failure from a backing store. Uniqueness violations are kept apart so
/// callers can turn them into domain errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation,
            _ => StoreError::Backend(e.into()),
        }
    }
}

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;

    Ok(db)
}
