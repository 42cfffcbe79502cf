//! Process configuration.
//!
//! Sources, later ones winning:
//! 1. `.env` in the working directory (loaded into the environment)
//! 2. optional `imprint.{toml,yaml,json}` in the working directory
//! 3. `IMPRINT__*` environment variables, `__` separating nested keys
//!    (`IMPRINT__LOG__FORMAT=pretty`)

use serde::Deserialize;

use imprint_observability::LogConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Postgres URL. Without one the in-memory store is used.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_url: None,
            log: LogConfig::default(),
        }
    }
}

pub fn load() -> Result<AppConfig, config::ConfigError> {
    let _ = dotenvy::dotenv();

    let settings = config::Config::builder()
        .add_source(config::File::with_name("imprint").required(false))
        .add_source(
            config::Environment::with_prefix("IMPRINT")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_give_defaults() {
        let settings = config::Config::builder().build().unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.database_url.is_none());
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn nested_log_keys_are_read() {
        let settings = config::Config::builder()
            .set_override("log.format", "pretty")
            .unwrap()
            .set_override("database_url", "postgres://localhost/imprint")
            .unwrap()
            .build()
            .unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();
        assert_eq!(config.log.format, imprint_observability::LogFormat::Pretty);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/imprint"));
    }
}
