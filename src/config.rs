use std::{net::SocketAddr, str::FromStr};

/// Argon2id memory cost in KiB (19 MiB).
pub const DEFAULT_MEMORY_KIB: u32 = 19_456;
/// Argon2id passes over memory.
pub const DEFAULT_ITERATIONS: u32 = 2;
/// Argon2id lanes.
pub const DEFAULT_PARALLELISM: u32 = 1;

/// Upper bound on token lifetime (30 days).
pub const MAX_TTL_MINUTES: i64 = 30 * 24 * 60;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Work factor for password hashing. Changing it only affects new hashes;
/// existing digests carry their own parameters.
#[derive(Debug, Clone, Copy)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// When unset the server keeps everything in memory.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub password: HashCost,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "todoapp".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "todoapp-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES")?.unwrap_or(60),
        };
        let defaults = HashCost::default();
        let password = HashCost {
            memory_kib: env_parse("ARGON2_MEMORY_KIB")?.unwrap_or(defaults.memory_kib),
            iterations: env_parse("ARGON2_ITERATIONS")?.unwrap_or(defaults.iterations),
            parallelism: env_parse("ARGON2_PARALLELISM")?.unwrap_or(defaults.parallelism),
        };
        let config = Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("APP_PORT")?.unwrap_or(8000),
            database_url,
            jwt,
            password,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=MAX_TTL_MINUTES).contains(&self.jwt.ttl_minutes),
            "JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}"
        );
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Unset or blank is `None`; a value that does not parse fails startup.
fn env_parse<T: FromStr>(key: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value: {v:?}")),
        _ => Ok(None),
    }
}
