use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::Semaphore;

use crate::llm_client::{LlmSettings, DEFAULT_MODEL, MAX_RETRIES};
use crate::screening::orchestrator::{BatchOptions, ScreeningMode, DEFAULT_MAX_CONCURRENCY};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_DB_CONNECTIONS: u32 = 10;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_max_retries: u32,
    pub llm_retry_delay_ms: u64,
    pub llm_timeout_secs: u64,
    pub screening_concurrency: usize,
    pub screening_max_concurrency: usize,
    pub screening_mode: ScreeningMode,
    pub screening_fused_fallback: bool,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let screening_max_concurrency =
            parse_env("SCREENING_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?;
        let screening_concurrency = parse_env("SCREENING_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        check_concurrency(screening_concurrency, screening_max_concurrency)?;

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            database_max_connections: parse_env(
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_DB_CONNECTIONS,
            )?,
            llm_api_key: require_env("LLM_API_KEY")?,
            llm_base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            llm_max_retries: parse_env("LLM_MAX_RETRIES", MAX_RETRIES)?,
            llm_retry_delay_ms: parse_env("LLM_RETRY_DELAY_MS", 1000)?,
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", 60)?,
            screening_concurrency,
            screening_max_concurrency,
            screening_mode: parse_mode(std::env::var("SCREENING_MODE").ok().as_deref())?,
            screening_fused_fallback: parse_env("SCREENING_FUSED_FALLBACK", false)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            model: self.llm_model.clone(),
            max_retries: self.llm_max_retries,
            retry_delay: Duration::from_millis(self.llm_retry_delay_ms),
            call_timeout: Duration::from_secs(self.llm_timeout_secs),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            mode: self.screening_mode,
            fused_fallback: self.screening_fused_fallback,
            max_concurrency: self.screening_max_concurrency,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn check_concurrency(default: usize, max: usize) -> Result<()> {
    if max == 0 || max > Semaphore::MAX_PERMITS {
        bail!(
            "SCREENING_MAX_CONCURRENCY must be between 1 and {}",
            Semaphore::MAX_PERMITS
        );
    }
    if default == 0 || default > max {
        bail!("SCREENING_CONCURRENCY must be between 1 and SCREENING_MAX_CONCURRENCY ({max})");
    }
    Ok(())
}

fn parse_mode(raw: Option<&str>) -> Result<ScreeningMode> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("two_step") => Ok(ScreeningMode::TwoStep),
        Some("fused") => Ok(ScreeningMode::Fused),
        Some(other) => bail!("SCREENING_MODE must be 'two_step' or 'fused', got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screening_mode_parsing() {
        assert_eq!(parse_mode(None).unwrap(), ScreeningMode::TwoStep);
        assert_eq!(parse_mode(Some(" Fused ")).unwrap(), ScreeningMode::Fused);
        assert_eq!(parse_mode(Some("two_step")).unwrap(), ScreeningMode::TwoStep);
        assert!(parse_mode(Some("parallel")).is_err());
    }

    #[test]
    fn test_settings_are_derived_from_config() {
        let config = Config {
            database_url: "postgres://localhost/screener".to_string(),
            database_max_connections: DEFAULT_DB_CONNECTIONS,
            llm_api_key: "sk-test".to_string(),
            llm_base_url: DEFAULT_BASE_URL.to_string(),
            llm_model: "gpt-4o".to_string(),
            llm_max_retries: 4,
            llm_retry_delay_ms: 250,
            llm_timeout_secs: 30,
            screening_concurrency: 8,
            screening_max_concurrency: 16,
            screening_mode: ScreeningMode::Fused,
            screening_fused_fallback: true,
            port: 8080,
            rust_log: "info".to_string(),
        };

        let settings = config.llm_settings();
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.max_retries, 4);
        assert_eq!(settings.retry_delay, Duration::from_millis(250));
        assert_eq!(settings.call_timeout, Duration::from_secs(30));

        let options = config.batch_options();
        assert_eq!(options.mode, ScreeningMode::Fused);
        assert!(options.fused_fallback);
        assert_eq!(options.max_concurrency, 16);
    }

    #[test]
    fn test_concurrency_bounds() {
        assert!(check_concurrency(4, 32).is_ok());
        assert!(check_concurrency(32, 32).is_ok());
        assert!(check_concurrency(0, 32).is_err());
        assert!(check_concurrency(33, 32).is_err());
        assert!(check_concurrency(1, 0).is_err());
        assert!(check_concurrency(1, usize::MAX).is_err());
    }
}
