use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::str::FromStr;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_file_size: usize,
    pub max_rows_per_sheet: usize,
    pub sample_rows: usize,
    pub openai_key: String,
    pub model: String,
    pub temperature: f32,
    pub llm_timeout_secs: u64,
    pub llm_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_file_size: default_max_file_size(),
            max_rows_per_sheet: 10_000,
            sample_rows: 20,
            openai_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            llm_timeout_secs: 120,
            llm_retries: 2,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let openai_key = std::env::var("OPENAI_API_KEY")
            .map_err(|e| anyhow::anyhow!("Failed to load OPENAI_API_KEY: {}", e))?;

        Self::from_lookup(openai_key, |name| std::env::var(name).ok())
    }

    /// Build a config from a variable lookup, falling back to defaults for
    /// anything unset.
    pub fn from_lookup<F>(openai_key: String, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Ok(Config {
            bind_addr: parse_var(&lookup, "BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            max_file_size: parse_var(&lookup, "MAX_FILE_SIZE")?.unwrap_or(defaults.max_file_size),
            max_rows_per_sheet: parse_var(&lookup, "MAX_ROWS_PER_SHEET")?
                .unwrap_or(defaults.max_rows_per_sheet),
            sample_rows: parse_var(&lookup, "SAMPLE_ROWS")?.unwrap_or(defaults.sample_rows),
            openai_key,
            model: lookup("OPENAI_MODEL")
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(defaults.model),
            temperature: parse_var(&lookup, "LLM_TEMPERATURE")?.unwrap_or(defaults.temperature),
            llm_timeout_secs: parse_var(&lookup, "LLM_TIMEOUT_SECS")?
                .unwrap_or(defaults.llm_timeout_secs),
            llm_retries: parse_var(&lookup, "LLM_RETRIES")?.unwrap_or(defaults.llm_retries),
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {}", name, raw)),
        _ => Ok(None),
    }
}

pub fn load_config() -> Result<Config> {
    Config::new()
}
