use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CreateTodoRequest, DeletedResponse, TodoResponse, UpdateTodoRequest};
use super::repo_types::TodoPatch;
use crate::{auth::extractors::AuthUser, error::AppError, state::AppState};

const MAX_NAME_LEN: usize = 500;

pub fn todo_routes() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/:id", patch(update_todo).delete(delete_todo))
}

#[instrument(skip(state))]
pub async fn list_todos(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<TodoResponse>>, AppError> {
    let todos = state.todos.list_by_user(user_id).await?;
    Ok(Json(todos.into_iter().map(TodoResponse::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_todo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateTodoRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TodoResponse>), AppError> {
    let Json(payload) = payload?;
    let name = validate_name(&payload.name)?;
    let todo = state.todos.create(user_id, name).await?;
    info!(%user_id, todo_id = %todo.id, "todo created");
    Ok((StatusCode::CREATED, Json(todo.into())))
}

#[instrument(skip(state, payload))]
pub async fn update_todo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateTodoRequest>, JsonRejection>,
) -> Result<Json<TodoResponse>, AppError> {
    let Json(payload) = payload?;
    if payload.name.is_none() && payload.completed.is_none() {
        return Err(AppError::invalid_input("Nothing to update"));
    }
    let name = payload
        .name
        .as_deref()
        .map(validate_name)
        .transpose()?
        .map(str::to_string);
    let patch = TodoPatch {
        name,
        completed: payload.completed,
    };

    state
        .todos
        .update(user_id, id, patch)
        .await?
        .map(|t| Json(t.into()))
        .ok_or(AppError::NotFound("Todo"))
}

#[instrument(skip(state))]
pub async fn delete_todo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    if !state.todos.delete(user_id, id).await? {
        return Err(AppError::NotFound("Todo"));
    }
    info!(%user_id, todo_id = %id, "todo deleted");
    Ok(Json(DeletedResponse { success: true }))
}

fn validate_name(raw: &str) -> Result<&str, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::invalid_input("Todo name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::invalid_input("Todo name too long"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState};

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn login_as(app: &Router, email: &str) -> String {
        let creds = json!({"email": email, "password": "secret123"});
        let (status, _) =
            call(app, request("POST", "/auth/register", None, Some(creds.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(app, request("POST", "/auth/login", None, Some(creds))).await;
        assert_eq!(status, StatusCode::OK);
        body["accessToken"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn todos_require_bearer() {
        let app = build_app(AppState::fake());
        let (status, _) = call(&app, request("GET", "/todos", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, request("GET", "/todos", Some("forged"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(
            &app,
            request("POST", "/todos", None, Some(json!({"name": "x"}))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn todo_crud_flow() {
        let app = build_app(AppState::fake());
        let token = login_as(&app, "a@x.com").await;

        let (status, created) = call(
            &app,
            request("POST", "/todos", Some(&token), Some(json!({"name": "  buy milk "}))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "buy milk");
        assert_eq!(created["completed"], false);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, list) = call(&app, request("GET", "/todos", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, updated) = call(
            &app,
            request(
                "PATCH",
                &format!("/todos/{id}"),
                Some(&token),
                Some(json!({"completed": true})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["completed"], true);
        assert_eq!(updated["name"], "buy milk");

        let (status, body) =
            call(&app, request("DELETE", &format!("/todos/{id}"), Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) =
            call(&app, request("DELETE", &format!("/todos/{id}"), Some(&token), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn todos_are_private_to_owner() {
        let app = build_app(AppState::fake());
        let alice = login_as(&app, "alice@x.com").await;
        let bob = login_as(&app, "bob@x.com").await;

        let (_, created) = call(
            &app,
            request("POST", "/todos", Some(&alice), Some(json!({"name": "secret plan"}))),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let (_, list) = call(&app, request("GET", "/todos", Some(&bob), None)).await;
        assert!(list.as_array().unwrap().is_empty());

        let (status, _) = call(
            &app,
            request("PATCH", &format!("/todos/{id}"), Some(&bob), Some(json!({"completed": true}))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            call(&app, request("DELETE", &format!("/todos/{id}"), Some(&bob), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn todo_input_validation() {
        let app = build_app(AppState::fake());
        let token = login_as(&app, "a@x.com").await;

        let (status, body) = call(
            &app,
            request("POST", "/todos", Some(&token), Some(json!({"name": "   "}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_INPUT");

        let (_, created) = call(
            &app,
            request("POST", "/todos", Some(&token), Some(json!({"name": "x"}))),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();
        let (status, _) = call(
            &app,
            request("PATCH", &format!("/todos/{id}"), Some(&token), Some(json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
