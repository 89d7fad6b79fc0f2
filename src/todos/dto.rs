use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::Todo;

#[derive(Debug, Deserialize)]
pub struct CreateTodoRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTodoRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoResponse {
    pub id: Uuid,
    pub name: String,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Todo> for TodoResponse {
    fn from(t: Todo) -> Self {
        Self {
            id: t.id,
            name: t.name,
            completed: t.completed,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub success: bool,
}
