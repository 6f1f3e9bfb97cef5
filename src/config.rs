// ⚙️ Configuration - Runtime settings from AGENDA_* environment variables

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str =
    "https://www.gov.br/receitafederal/pt-br/assuntos/agenda-tributaria";
pub const DEFAULT_HOLIDAY_API_URL: &str = "https://brasilapi.com.br/api/feriados/v1";

/// Configuration shared by the CLI, the catalog refresher and the materializer.
#[derive(Debug, Clone)]
pub struct AgendaConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Directory for obligation backups and task backups
    pub backup_dir: PathBuf,
    /// Base URL of the Receita Federal agenda (the year is appended)
    pub catalog_url: String,
    /// Base URL of the holiday API (the year is appended)
    pub holiday_api_url: String,
    pub catalog_timeout: Duration,
    pub holiday_timeout: Duration,
    /// How long a remotely refreshed catalog stays fresh in memory
    pub cache_ttl: Duration,
    /// Oldest on-disk backup still accepted as a fallback
    pub backup_max_age: Duration,
    /// Pause between months when materializing several months
    pub month_delay: Duration,
    pub log_level: String,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        AgendaConfig {
            database_path: PathBuf::from("data/agenda.db"),
            backup_dir: PathBuf::from("data/backups"),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            holiday_api_url: DEFAULT_HOLIDAY_API_URL.to_string(),
            catalog_timeout: Duration::from_secs(30),
            holiday_timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            backup_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            month_delay: Duration::from_millis(100),
            log_level: "info".to_string(),
        }
    }
}

impl AgendaConfig {
    /// Build the configuration from environment variables, falling back to defaults.
    ///
    /// # Environment Variables
    /// - `AGENDA_DB_PATH`: SQLite file (default: `data/agenda.db`)
    /// - `AGENDA_BACKUP_DIR`: backup directory (default: `data/backups`)
    /// - `AGENDA_CATALOG_URL`: agenda index URL without the year
    /// - `AGENDA_HOLIDAY_API_URL`: holiday API URL without the year
    /// - `AGENDA_CATALOG_TIMEOUT_SECS` (default: 30)
    /// - `AGENDA_HOLIDAY_TIMEOUT_SECS` (default: 10)
    /// - `AGENDA_CACHE_TTL_HOURS` (default: 24)
    /// - `AGENDA_BACKUP_MAX_AGE_DAYS` (default: 7)
    /// - `AGENDA_MONTH_DELAY_MS` (default: 100)
    /// - `AGENDA_LOG`: log level spec for flexi_logger (default: `info`)
    ///
    /// # Errors
    /// Returns an error naming the variable when a numeric value does not parse.
    pub fn from_env() -> Result<Self> {
        let defaults = AgendaConfig::default();

        Ok(AgendaConfig {
            database_path: env::var("AGENDA_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            backup_dir: env::var("AGENDA_BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.backup_dir),
            catalog_url: env::var("AGENDA_CATALOG_URL").unwrap_or(defaults.catalog_url),
            holiday_api_url: env::var("AGENDA_HOLIDAY_API_URL")
                .unwrap_or(defaults.holiday_api_url),
            catalog_timeout: env_u64("AGENDA_CATALOG_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.catalog_timeout),
            holiday_timeout: env_u64("AGENDA_HOLIDAY_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.holiday_timeout),
            cache_ttl: env_u64("AGENDA_CACHE_TTL_HOURS")?
                .map(|h| Duration::from_secs(h * 60 * 60))
                .unwrap_or(defaults.cache_ttl),
            backup_max_age: env_u64("AGENDA_BACKUP_MAX_AGE_DAYS")?
                .map(|d| Duration::from_secs(d * 24 * 60 * 60))
                .unwrap_or(defaults.backup_max_age),
            month_delay: env_u64("AGENDA_MONTH_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.month_delay),
            log_level: env::var("AGENDA_LOG").unwrap_or(defaults.log_level),
        })
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{} must be a non-negative integer, got {:?}", name, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgendaConfig::default();

        assert_eq!(config.catalog_timeout, Duration::from_secs(30));
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.backup_max_age, Duration::from_secs(7 * 86_400));
        assert_eq!(config.month_delay, Duration::from_millis(100));
        assert_eq!(config.database_path, PathBuf::from("data/agenda.db"));
    }

    #[test]
    fn test_env_u64_parsing() {
        env::set_var("AGENDA_TEST_NUMBER_OK", " 42 ");
        env::set_var("AGENDA_TEST_NUMBER_BAD", "forty-two");

        assert_eq!(env_u64("AGENDA_TEST_NUMBER_OK").unwrap(), Some(42));
        assert_eq!(env_u64("AGENDA_TEST_NUMBER_MISSING").unwrap(), None);

        let err = env_u64("AGENDA_TEST_NUMBER_BAD").unwrap_err();
        assert!(err.to_string().contains("AGENDA_TEST_NUMBER_BAD"));
    }
}
