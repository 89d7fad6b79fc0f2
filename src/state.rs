use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::{
    jwt::JwtKeys,
    password::PasswordHasher,
    repo::{MemoryUserStore, PgUserStore, UserStore},
    services::AuthService,
};
use crate::config::AppConfig;
use crate::db;
use crate::todos::repo::{MemoryTodoStore, PgTodoStore, TodoStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub todos: Arc<dyn TodoStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (users, todos) = match &config.database_url {
            Some(url) => {
                let pool = db::connect(url).await?;
                info!("connected to postgres");
                (
                    Arc::new(PgUserStore::new(pool.clone())) as Arc<dyn UserStore>,
                    Arc::new(PgTodoStore::new(pool)) as Arc<dyn TodoStore>,
                )
            }
            None => {
                warn!("DATABASE_URL not set; data is kept in memory and lost on restart");
                (
                    Arc::new(MemoryUserStore::default()) as Arc<dyn UserStore>,
                    Arc::new(MemoryTodoStore::default()) as Arc<dyn TodoStore>,
                )
            }
        };

        Self::from_parts(config, users, todos)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        todos: Arc<dyn TodoStore>,
    ) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(config.password)?;
        let keys = JwtKeys::from_config(&config.jwt);
        let auth = Arc::new(AuthService::new(users, hasher, keys));
        info!(
            memory_kib = config.password.memory_kib,
            iterations = config.password.iterations,
            jwt_ttl_minutes = config.jwt.ttl_minutes,
            "auth configured"
        );
        Ok(Self {
            config,
            auth,
            todos,
        })
    }

    /// In-memory state with a cheap hash cost, for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::{HashCost, JwtConfig};

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            password: HashCost {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        });

        Self::from_parts(
            config,
            Arc::new(MemoryUserStore::default()),
            Arc::new(MemoryTodoStore::default()),
        )
        .expect("fake state")
    }
}
