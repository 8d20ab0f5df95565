//! Environment-sourced runtime configuration, shared by `labeling-engine
//! serve` and `labeling-engine worker`. Every optional value has a
//! default; required values produce a descriptive error naming the
//! missing variable rather than panicking.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub queue_host: String,
    pub queue_port: u16,
    pub database_url: String,
    pub data_dir: PathBuf,
    pub llm_endpoint: String,
    pub llm_api_key: String,
    pub llm_api_version: String,
    pub llm_deployment: String,

    pub cors_origins: Vec<String>,
    pub upload_size_cap_bytes: u64,
    pub worker_name: String,
    pub worker_batch_size: usize,
    pub worker_block_ms: u64,
    pub planner_token_budget: u64,
    pub worker_token_budget: u64,
    pub recursion_limit: u32,
    pub overview_target_points: usize,
    pub binary_format_threshold: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let (queue_host, queue_port) = resolve_queue_address()?;

        Ok(Self {
            queue_host,
            queue_port,
            database_url: require("DATABASE_URL")?,
            data_dir: PathBuf::from(require("DATA_DIR")?),
            llm_endpoint: require("LLM_ENDPOINT")?,
            llm_api_key: require("LLM_API_KEY")?,
            llm_api_version: require("LLM_API_VERSION")?,
            llm_deployment: require("LLM_DEPLOYMENT")?,

            cors_origins: optional("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            upload_size_cap_bytes: optional_parsed("UPLOAD_SIZE_CAP_BYTES", 500 * 1024 * 1024)?,
            worker_name: optional("WORKER_NAME", "worker-1"),
            worker_batch_size: optional_parsed("WORKER_BATCH_SIZE", 1)?,
            worker_block_ms: optional_parsed("WORKER_BLOCK_MS", 5_000)?,
            planner_token_budget: optional_parsed("PLANNER_TOKEN_BUDGET", 500_000)?,
            worker_token_budget: optional_parsed("WORKER_TOKEN_BUDGET", 2_000_000)?,
            recursion_limit: optional_parsed("RECURSION_LIMIT", 10)?,
            overview_target_points: optional_parsed("OVERVIEW_TARGET_POINTS", 5_000)?,
            binary_format_threshold: optional_parsed("BINARY_FORMAT_THRESHOLD", 100_000)?,
        })
    }
}

fn resolve_queue_address() -> Result<(String, u16)> {
    if let Ok(url) = std::env::var("REDIS_URL") {
        let without_scheme = url
            .strip_prefix("redis://")
            .or_else(|| url.strip_prefix("rediss://"))
            .unwrap_or(&url);
        let host_port = without_scheme.rsplit('@').next().unwrap_or(without_scheme);
        let mut parts = host_port.splitn(2, ':');
        let host = parts.next().unwrap_or("127.0.0.1").to_string();
        let port = parts
            .next()
            .map(|p| p.trim_end_matches('/'))
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("REDIS_URL has a non-numeric port")?
            .unwrap_or(6379);
        return Ok((host, port));
    }

    let host = require("QUEUE_HOST")?;
    let port = require("QUEUE_PORT")?
        .parse()
        .context("QUEUE_PORT must be a valid port number")?;
    Ok((host, port))
}

fn require(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required environment variable: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_parsed_falls_back_to_default() {
        std::env::remove_var("NONEXISTENT_LABELING_TEST_VAR");
        let v: u64 = optional_parsed("NONEXISTENT_LABELING_TEST_VAR", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn resolve_queue_address_parses_redis_url() {
        std::env::set_var("REDIS_URL", "redis://queue.internal:6390/0");
        let (host, port) = resolve_queue_address().unwrap();
        std::env::remove_var("REDIS_URL");
        assert_eq!(host, "queue.internal");
        assert_eq!(port, 6390);
    }
}
