use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub max_age_secs: i64,
    pub update_age_secs: i64,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| -> anyhow::Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{key} must be set to a non-empty value (e.g. in .env)"))
        };
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse::<i64>().ok());

        let session = SessionConfig {
            secret: required("SESSION_SECRET")?,
            issuer: or("SESSION_ISSUER", "reelauth"),
            audience: or("SESSION_AUDIENCE", "reelauth-users"),
            max_age_secs: parsed("SESSION_MAX_AGE_SECS").unwrap_or(30 * 24 * 60 * 60),
            update_age_secs: parsed("SESSION_UPDATE_AGE_SECS").unwrap_or(24 * 60 * 60),
            cookie_name: or("SESSION_COOKIE_NAME", "session-token"),
            cookie_secure: lookup("SESSION_COOKIE_SECURE")
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(false),
        };
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(10),
            session,
        })
    }
}
