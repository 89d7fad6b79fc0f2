use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, LogoutResponse, PublicUser, RegisterRequest,
            RegisterResponse,
        },
        extractors::AuthUser,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let Json(payload) = payload?;
    let user = state.auth.register(payload).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user })))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let resp = state.auth.login(payload).await?;
    Ok(Json(resp))
}

/// Always succeeds; the client drops its stored token.
#[instrument(skip(state, user))]
pub async fn logout(
    State(state): State<AppState>,
    user: Option<AuthUser>,
) -> Json<LogoutResponse> {
    state.auth.logout(user.map(|AuthUser(id)| id)).await;
    Json(LogoutResponse { success: true })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state.auth.current_user(user_id).await?;
    Ok(Json(user))
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

    fn app() -> Router {
        build_app(AppState::fake())
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn register_login_scenario() {
        let app = app();

        let (status, body) = call(
            &app,
            post_json(
                "/auth/register",
                json!({"email": "a@x.com", "name": "A", "password": "secret123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "a@x.com");
        assert_eq!(body["user"]["name"], "A");
        assert!(body["user"]["id"].is_string());
        assert!(body["user"]["createdAt"].is_string());
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("password").is_none());

        let (status, body) = call(
            &app,
            post_json("/auth/login", json!({"email": "a@x.com", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["accessToken"].as_str().unwrap().is_empty());
        assert_eq!(body["user"]["email"], "a@x.com");

        let (status, wrong) = call(
            &app,
            post_json("/auth/login", json!({"email": "a@x.com", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong["error"], "INVALID_CREDENTIALS");

        let (status, unknown) = call(
            &app,
            post_json("/auth/login", json!({"email": "nobody@x.com", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, wrong);

        let (status, body) = call(
            &app,
            post_json(
                "/auth/register",
                json!({"email": "a@x.com", "name": "B", "password": "other-pass"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "EMAIL_ALREADY_IN_USE");
    }

    #[tokio::test]
    async fn register_with_non_string_password_is_invalid_input() {
        let app = app();
        let (status, body) = call(
            &app,
            post_json("/auth/register", json!({"email": "a@x.com", "password": 12345})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_INPUT");

        let (status, body) =
            call(&app, post_json("/auth/register", json!({"email": "a@x.com"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn login_with_incomplete_body_is_invalid_input() {
        let app = app();
        let (status, _) = call(
            &app,
            post_json("/auth/register", json!({"email": "a@x.com", "password": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        for body in [
            json!({"email": "a@x.com"}),
            json!({"email": "a@x.com", "password": 1}),
            json!({"password": "1"}),
        ] {
            let (status, resp) = call(&app, post_json("/auth/login", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(resp["error"], "INVALID_INPUT");
        }

        let req = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, resp) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn logout_never_fails() {
        let app = app();
        let (status, body) = call(&app, post_json("/auth/logout", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));

        let req = Request::builder()
            .method("POST")
            .uri("/auth/logout")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn me_requires_valid_bearer() {
        let app = app();
        let req = Request::builder().uri("/me").body(Body::empty()).unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHORIZED");

        call(
            &app,
            post_json("/auth/register", json!({"email": "a@x.com", "password": "secret123"})),
        )
        .await;
        let (_, login) = call(
            &app,
            post_json("/auth/login", json!({"email": "a@x.com", "password": "secret123"})),
        )
        .await;
        let token = login["accessToken"].as_str().unwrap();

        let req = Request::builder()
            .uri("/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "a@x.com");
        assert_eq!(body["name"], Value::Null);
    }
}
