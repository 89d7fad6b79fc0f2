use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        jwt::JwtKeys,
        password::PasswordHasher,
        repo::UserStore,
        repo_types::NewUser,
    },
    db::StoreError,
    error::AppError,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Registration and login. Holds no per-user state; every collaborator is
/// passed in by the caller.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher, keys: JwtKeys) -> Self {
        Self {
            users,
            hasher,
            keys,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    #[instrument(skip(self, req))]
    pub async fn register(&self, req: RegisterRequest) -> Result<PublicUser, AppError> {
        let email = req.email.trim();
        if email.is_empty() || !is_valid_email(email) {
            warn!("register rejected: invalid email");
            return Err(AppError::invalid_input("Invalid email"));
        }
        if req.password.is_empty() {
            warn!("register rejected: empty password");
            return Err(AppError::invalid_input("Invalid password format"));
        }
        if let Some(confirmation) = &req.password_confirmation {
            if *confirmation != req.password {
                warn!("register rejected: password confirmation mismatch");
                return Err(AppError::invalid_input("Passwords do not match"));
            }
        }
        let name = req
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        if self.users.find_by_email(email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AppError::EmailAlreadyInUse);
        }

        let hash = self.hash_blocking(req.password).await?;

        let user = self
            .users
            .create(NewUser {
                email,
                name,
                password_hash: &hash,
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation => {
                    warn!(email = %email, "email registered concurrently");
                    AppError::EmailAlreadyInUse
                }
                other => other.into(),
            })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user.into())
    }

    #[instrument(skip(self, req))]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AppError> {
        let email = req.email.trim();
        let user = self.users.find_by_email(email).await?;

        let (user, digest) = match user {
            Some(u) => match u.password_hash.clone() {
                Some(h) => (u, h),
                None => {
                    warn!(user_id = %u.id, "login on account without password");
                    self.dummy_verify_blocking(req.password).await;
                    return Err(AppError::InvalidCredentials);
                }
            },
            None => {
                warn!("login unknown email");
                self.dummy_verify_blocking(req.password).await;
                return Err(AppError::InvalidCredentials);
            }
        };

        if !self.verify_blocking(req.password, digest).await {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let access_token = self.keys.sign(user.id, &user.email).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AppError::Internal(e)
        })?;

        info!(user_id = %user.id, "user logged in");
        Ok(AuthResponse {
            access_token,
            user: user.into(),
        })
    }

    /// Tokens are stateless; there is nothing to revoke server-side yet.
    pub async fn logout(&self, user_id: Option<Uuid>) {
        match user_id {
            Some(id) => info!(user_id = %id, "user logged out"),
            None => info!("anonymous logout"),
        }
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<PublicUser, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(PublicUser::from)
            .ok_or_else(|| {
                warn!(user_id = %user_id, "token subject no longer exists");
                AppError::Unauthorized("User not found")
            })
    }

    async fn hash_blocking(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hash task failed: {e}")))?
            .map_err(|e| {
                error!(error = %e, "hash_password failed");
                AppError::Internal(e)
            })
    }

    async fn verify_blocking(&self, password: String, digest: String) -> bool {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "verify task failed");
                false
            })
    }

    async fn dummy_verify_blocking(&self, password: String) {
        let hasher = self.hasher.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await {
            error!(error = %e, "dummy verify task failed");
        }
    }
}
