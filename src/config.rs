use serde::Deserialize;
use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::str::FromStr;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

fn default_max_request_size() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub max_file_size: usize,
    pub max_request_size: usize,
    pub preview_rows: usize,
    pub cache_capacity: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_file_size: default_max_file_size(),
            max_request_size: default_max_request_size(),
            preview_rows: 5,
            cache_capacity: 32,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let defaults = Config::default();
        Ok(Config {
            listen_addr: env_or("LISTEN_ADDR", defaults.listen_addr)?,
            max_file_size: env_or("MAX_FILE_SIZE", defaults.max_file_size)?,
            max_request_size: env_or("MAX_REQUEST_SIZE", defaults.max_request_size)?,
            preview_rows: env_or("PREVIEW_ROWS", defaults.preview_rows)?,
            cache_capacity: env_or("CACHE_CAPACITY", defaults.cache_capacity)?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}={:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let value: usize = env_or("MULTI_CORRELATE_TEST_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn malformed_values_are_reported() {
        std::env::set_var("MULTI_CORRELATE_TEST_BAD_SIZE", "ten megabytes");
        let err = env_or::<usize>("MULTI_CORRELATE_TEST_BAD_SIZE", 1).unwrap_err();
        assert!(err.to_string().contains("MULTI_CORRELATE_TEST_BAD_SIZE"));
    }
}
