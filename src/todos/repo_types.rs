use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Todo row, always owned by exactly one user.
#[derive(Debug, Clone, FromRow)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub completed: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub name: Option<String>,
    pub completed: Option<bool>,
}
