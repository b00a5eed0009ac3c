use crate::errors::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Client-wide settings. Loaded from TOML or built in code; never read from
/// an implicit global location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Directory for rolling log files; `None` leaves logging to the host.
    pub log_dir: Option<PathBuf>,
    /// error|warn|info|debug|trace
    pub log_level: String,
    /// Number of rolled log files to keep.
    pub log_retention: usize,
    /// Name of the in-memory executor's worker thread.
    pub worker_thread_name: String,
    /// Executions slower than this are logged at warn level.
    pub slow_query_ms: u64,
    /// Also write `dev6!` traces to `dev6.log` in `log_dir`.
    pub dev_trace: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let slow = std::env::var("QUERYLITE_SLOW_QUERY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(500);
        Self {
            log_dir: None,
            log_level: "info".to_string(),
            log_retention: 7,
            worker_thread_name: "querylite-executor".to_string(),
            slow_query_ms: slow,
            dev_trace: false,
        }
    }
}

impl ClientSettings {
    /// # Errors
    /// Returns a `Toml` error for malformed input, `Config` for invalid values.
    pub fn from_toml_str(s: &str) -> QueryResult<Self> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> QueryResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Applies `QUERYLITE_LOG_DIR`, `QUERYLITE_LOG_LEVEL`,
    /// `QUERYLITE_LOG_RETENTION` and `QUERYLITE_DEV6` overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("QUERYLITE_LOG_DIR")
            && !dir.is_empty()
        {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Ok(level) = std::env::var("QUERYLITE_LOG_LEVEL")
            && parse_level(&level).is_some()
        {
            self.log_level = level;
        }
        if let Some(keep) = std::env::var("QUERYLITE_LOG_RETENTION").ok().and_then(|s| s.parse().ok()) {
            self.log_retention = keep;
        }
        if let Ok(flag) = std::env::var("QUERYLITE_DEV6") {
            self.dev_trace = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }

    /// # Errors
    /// `Config` for an unknown log level, zero retention or an empty thread name.
    pub fn validate(&self) -> QueryResult<()> {
        if parse_level(&self.log_level).is_none() {
            return Err(QueryError::Config(format!("unknown log level '{}'", self.log_level)));
        }
        if self.log_retention == 0 {
            return Err(QueryError::Config("log_retention must be at least 1".into()));
        }
        if self.worker_thread_name.is_empty() {
            return Err(QueryError::Config("worker_thread_name must not be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn level_filter(&self) -> log::LevelFilter {
        parse_level(&self.log_level).unwrap_or(log::LevelFilter::Info)
    }
}

pub(crate) fn parse_level(s: &str) -> Option<log::LevelFilter> {
    match s.to_ascii_lowercase().as_str() {
        "error" => Some(log::LevelFilter::Error),
        "warn" => Some(log::LevelFilter::Warn),
        "info" => Some(log::LevelFilter::Info),
        "debug" => Some(log::LevelFilter::Debug),
        "trace" => Some(log::LevelFilter::Trace),
        "off" => Some(log::LevelFilter::Off),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = ClientSettings::from_toml_str("log_level = \"debug\"\nslow_query_ms = 20\n").unwrap();
        assert_eq!(s.level_filter(), log::LevelFilter::Debug);
        assert_eq!(s.slow_query_ms, 20);
        assert_eq!(s.worker_thread_name, "querylite-executor");
        assert_eq!(s.log_retention, 7);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(ClientSettings::from_toml_str("log_level = \"loud\""), Err(QueryError::Config(_))));
        assert!(matches!(ClientSettings::from_toml_str("log_level = 3"), Err(QueryError::Toml(_))));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "worker_thread_name = \"exec\"\n").unwrap();
        let s = ClientSettings::load(&path).unwrap();
        assert_eq!(s.worker_thread_name, "exec");
        assert!(matches!(ClientSettings::load(&dir.path().join("missing.toml")), Err(QueryError::Io(_))));
    }
}
