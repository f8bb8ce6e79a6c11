//! Runtime configuration read from the environment (and `.env`).

use crate::error::{PipelineError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub database_path: PathBuf,
    pub kb_path: PathBuf,
    /// Optional JSON file with `{domain: [tables]}`; the finance catalog is used otherwise.
    pub domains_path: Option<PathBuf>,
    pub rate_limit_threshold: u32,
    pub rate_limit_pause: Duration,
    pub row_cap: usize,
    pub fuzzy_threshold: f64,
    pub use_router: bool,
    pub log_dir: PathBuf,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("finance.db"),
            kb_path: PathBuf::from("kb.json"),
            domains_path: None,
            rate_limit_threshold: 4,
            rate_limit_pause: Duration::from_secs(60),
            row_cap: 50,
            fuzzy_threshold: 0.80,
            use_router: false,
            log_dir: PathBuf::from("logs"),
            api_key: None,
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SQL_CREW_DATABASE") {
            config.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("SQL_CREW_KB_PATH") {
            config.kb_path = PathBuf::from(v);
        }
        config.domains_path = get("SQL_CREW_DOMAINS").map(PathBuf::from);
        if let Some(v) = get("SQL_CREW_RATE_LIMIT_THRESHOLD") {
            config.rate_limit_threshold = parse_number("SQL_CREW_RATE_LIMIT_THRESHOLD", &v)?;
        }
        if let Some(v) = get("SQL_CREW_RATE_LIMIT_PAUSE_SECS") {
            config.rate_limit_pause =
                Duration::from_secs(parse_number("SQL_CREW_RATE_LIMIT_PAUSE_SECS", &v)?);
        }
        if let Some(v) = get("SQL_CREW_ROW_CAP") {
            config.row_cap = parse_number("SQL_CREW_ROW_CAP", &v)?;
        }
        if let Some(v) = get("SQL_CREW_FUZZY_THRESHOLD") {
            config.fuzzy_threshold = parse_number("SQL_CREW_FUZZY_THRESHOLD", &v)?;
        }
        if let Some(v) = get("SQL_CREW_USE_ROUTER") {
            config.use_router = parse_flag("SQL_CREW_USE_ROUTER", &v)?;
        }
        if let Some(v) = get("SQL_CREW_LOG_DIR") {
            config.log_dir = PathBuf::from(v);
        }
        config.api_key = get("OPENAI_API_KEY");
        if let Some(v) = get("OPENAI_MODEL") {
            config.model = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            config.base_url = v.trim_end_matches('/').to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_threshold == 0 {
            return Err(PipelineError::Config(
                "SQL_CREW_RATE_LIMIT_THRESHOLD must be positive".to_string(),
            ));
        }
        if self.row_cap == 0 {
            return Err(PipelineError::Config(
                "SQL_CREW_ROW_CAP must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(PipelineError::Config(format!(
                "SQL_CREW_FUZZY_THRESHOLD must be between 0 and 1, got {}",
                self.fuzzy_threshold
            )));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| PipelineError::Config(format!("Invalid {} '{}': {}", key, value, e)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PipelineError::Config(format!("Invalid {} '{}'", key, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.rate_limit_threshold, 4);
        assert_eq!(config.row_cap, 50);
        assert!(!config.use_router);
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("SQL_CREW_DATABASE", "/data/finance.db"),
            ("SQL_CREW_RATE_LIMIT_THRESHOLD", "10"),
            ("SQL_CREW_RATE_LIMIT_PAUSE_SECS", "5"),
            ("SQL_CREW_FUZZY_THRESHOLD", "0.9"),
            ("SQL_CREW_USE_ROUTER", "yes"),
            ("OPENAI_MODEL", "gpt-5-mini"),
            ("OPENAI_BASE_URL", "http://localhost:8000/v1/"),
            ("OPENAI_API_KEY", ""),
        ]))
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/data/finance.db"));
        assert_eq!(config.rate_limit_threshold, 10);
        assert_eq!(config.rate_limit_pause, Duration::from_secs(5));
        assert_eq!(config.fuzzy_threshold, 0.9);
        assert!(config.use_router);
        assert_eq!(config.model, "gpt-5-mini");
        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for pairs in [
            [("SQL_CREW_ROW_CAP", "many")],
            [("SQL_CREW_RATE_LIMIT_THRESHOLD", "0")],
            [("SQL_CREW_FUZZY_THRESHOLD", "1.5")],
            [("SQL_CREW_USE_ROUTER", "maybe")],
        ] {
            let err = PipelineConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, PipelineError::Config(_)), "{:?}", pairs);
        }
    }
}
