use std::time::Duration;

/// All environment-driven knobs for the backend, read once at startup.
/// Following the rest of this codebase's convention, there is no config
/// file format: every setting is an environment variable with a sensible
/// default for local development.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub jwt_secret: String,
    pub webhook_verify_token: String,
    pub accept_lock_ttl_ms: usize,
    pub idempotency_ttl_secs: usize,
    pub session_ttl_secs: usize,
    pub webhook_worker_concurrency: usize,
    pub webhook_max_attempts: u32,
    pub outbound_worker_concurrency: usize,
    pub outbound_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub provider_a_api_base: String,
    pub provider_b_api_base: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            database_url: env_required("DATABASE_URL")?,
            database_max_connections: env_parsed("DATABASE_MAX_CONNECTIONS", 10),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            jwt_secret: env_required("JWT_SECRET")?,
            webhook_verify_token: env_required("WEBHOOK_VERIFY_TOKEN")?,
            accept_lock_ttl_ms: env_parsed("ACCEPT_LOCK_TTL_MS", 5_000),
            idempotency_ttl_secs: env_parsed("IDEMPOTENCY_TTL_SECS", 86_400),
            session_ttl_secs: env_parsed("SESSION_TTL_SECS", 3_600),
            webhook_worker_concurrency: env_parsed("WEBHOOK_WORKER_CONCURRENCY", 8),
            webhook_max_attempts: env_parsed("WEBHOOK_MAX_ATTEMPTS", 5),
            outbound_worker_concurrency: env_parsed("OUTBOUND_WORKER_CONCURRENCY", 8),
            outbound_max_attempts: env_parsed("OUTBOUND_MAX_ATTEMPTS", 5),
            retry_base_delay: Duration::from_millis(env_parsed("RETRY_BASE_DELAY_MS", 200)),
            provider_a_api_base: env_or(
                "PROVIDER_A_API_BASE",
                "https://graph.facebook.com/v19.0",
            ),
            provider_b_api_base: env_or(
                "PROVIDER_B_API_BASE",
                "https://graph.facebook.com/v19.0/me",
            ),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing required env var {key}"))
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
