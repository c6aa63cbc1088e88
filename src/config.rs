use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::Settings;
use crate::model::SchedulePolicy;

/// Server configuration, read once from `ROOMBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    /// Password of the shared `signup` login, which can only register accounts.
    pub password: String,
    pub max_connections: usize,
    /// WAL appends since the last compaction before the log is rewritten.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub schedule_policy: SchedulePolicy,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Unset or empty variables take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        Ok(Self {
            port: parse_or(&get, "ROOMBOOK_PORT", 5433)?,
            bind: get("ROOMBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: get("ROOMBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            password: get("ROOMBOOK_PASSWORD").unwrap_or_else(|| "roombook".into()),
            max_connections: parse_or(&get, "ROOMBOOK_MAX_CONNECTIONS", 256)?,
            compact_threshold: parse_or(&get, "ROOMBOOK_COMPACT_THRESHOLD", 1000)?,
            metrics_port: parse_opt(&get, "ROOMBOOK_METRICS_PORT")?,
            admin_email: get("ROOMBOOK_ADMIN_EMAIL").map(|e| e.trim().to_ascii_lowercase()),
            admin_password: get("ROOMBOOK_ADMIN_PASSWORD"),
            schedule_policy: parse_or(&get, "ROOMBOOK_SCHEDULE_POLICY", SchedulePolicy::Window)?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roombook.wal")
    }

    pub fn engine_settings(&self) -> Settings {
        Settings {
            policy: self.schedule_policy,
            admin_email: self.admin_email.clone(),
            admin_password: self.admin_password.clone(),
        }
    }
}

fn parse_opt<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    Ok(parse_opt(get, var)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.listen_addr(), "0.0.0.0:5433");
        assert_eq!(c.wal_path(), PathBuf::from("./data/roombook.wal"));
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.compact_threshold, 1000);
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.admin_email, None);
        assert_eq!(c.admin_password, None);
        assert_eq!(c.schedule_policy, SchedulePolicy::Window);
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("ROOMBOOK_PORT", "6000"),
            ("ROOMBOOK_METRICS_PORT", "9100"),
            ("ROOMBOOK_ADMIN_EMAIL", " Admin@Campus.edu "),
            ("ROOMBOOK_ADMIN_PASSWORD", "correct horse"),
            ("ROOMBOOK_SCHEDULE_POLICY", "day"),
        ])
        .unwrap();
        assert_eq!(
            c.engine_settings().admin_password.as_deref(),
            Some("correct horse")
        );
        assert_eq!(c.port, 6000);
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.admin_email.as_deref(), Some("admin@campus.edu"));
        assert_eq!(c.engine_settings().policy, SchedulePolicy::Day);
    }

    #[test]
    fn empty_means_unset() {
        let c = config(&[("ROOMBOOK_METRICS_PORT", ""), ("ROOMBOOK_ADMIN_EMAIL", "  ")]).unwrap();
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.admin_email, None);
    }

    #[test]
    fn bad_values_are_reported() {
        assert_eq!(
            config(&[("ROOMBOOK_PORT", "http")]).unwrap_err(),
            ConfigError::Invalid {
                var: "ROOMBOOK_PORT",
                value: "http".into()
            }
        );
        assert!(config(&[("ROOMBOOK_SCHEDULE_POLICY", "hourly")]).is_err());
    }
}
