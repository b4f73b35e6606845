use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres + S3 persistence. `None` runs the in-memory repository.
    pub storage: Option<StorageConfig>,
    /// Redis-backed job queue. `None` uses an in-process channel.
    pub redis_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Deterministic stub generation, no external AI calls.
    pub ai_dry_run: bool,
    pub jwt_secret: String,
    pub port: u16,
    pub rust_log: String,
    pub worker_concurrency: usize,
    /// Running jobs without progress for this long are failed. `None` disables it.
    pub job_timeout: Option<Duration>,
    pub reaper_interval: Duration,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let storage = match optional_env("DATABASE_URL") {
            Some(database_url) => Some(StorageConfig {
                database_url,
                s3_bucket: require_env("S3_BUCKET")?,
                s3_endpoint: require_env("S3_ENDPOINT")?,
                aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            None => None,
        };

        Ok(Config {
            storage,
            redis_url: optional_env("REDIS_URL"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            ai_dry_run: parse_bool(optional_env("AI_DRY_RUN").as_deref(), true),
            jwt_secret: require_env("JWT_SECRET")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            worker_concurrency: parse_env::<usize>("WORKER_CONCURRENCY", 2)?.max(1),
            job_timeout: optional_env("JOB_TIMEOUT_SECS")
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("JOB_TIMEOUT_SECS must be a whole number of seconds")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            reaper_interval: Duration::from_secs(
                parse_env::<u64>("REAPER_INTERVAL_SECS", 30)?.max(1),
            ),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }
}

#[cfg(test)]
impl Config {
    /// In-memory, dry-run configuration for router tests.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Config {
            storage: None,
            redis_url: None,
            anthropic_api_key: None,
            ai_dry_run: true,
            jwt_secret: jwt_secret.to_string(),
            port: 0,
            rust_log: "debug".to_string(),
            worker_concurrency: 1,
            job_timeout: None,
            reaper_interval: Duration::from_secs(30),
            max_upload_bytes: 1024,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw {
        Some(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_defaults_and_truthy_values() {
        assert!(parse_bool(None, true));
        assert!(!parse_bool(None, false));
        assert!(parse_bool(Some("YES"), false));
        assert!(parse_bool(Some(" on "), false));
        assert!(!parse_bool(Some("0"), true));
        assert!(!parse_bool(Some("nope"), true));
    }
}
