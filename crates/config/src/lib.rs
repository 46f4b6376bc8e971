use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "courier.toml",
    "config/courier.toml",
    "crates/config/courier.toml",
    "../courier.toml",
    "../config/courier.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://courier.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: 86_400,
        }
    }
}

impl AuthConfig {
    fn default_session_ttl() -> u64 {
        86_400
    }
}

/// Tuning knobs for the in-process realtime core.
///
/// ```
/// use courier_config::RealtimeConfig;
///
/// let realtime = RealtimeConfig::default();
/// assert_eq!(realtime.mailbox_capacity, 256);
/// assert_eq!(realtime.store_timeout_ms, 5_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Capacity of each connection's outbound mailbox. A full mailbox makes
    /// fan-out skip that transport rather than block the sender.
    #[serde(default = "RealtimeConfig::default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Upper bound on a single durable-store call issued by the core. Expiry
    /// is surfaced to the caller as a retryable failure.
    #[serde(default = "RealtimeConfig::default_store_timeout")]
    pub store_timeout_ms: u64,
}

impl RealtimeConfig {
    const fn default_mailbox_capacity() -> usize {
        256
    }

    const fn default_store_timeout() -> u64 {
        5_000
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: Self::default_mailbox_capacity(),
            store_timeout_ms: Self::default_store_timeout(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use courier_config::load;
///
/// std::env::remove_var("COURIER_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let session_ttl = defaults.auth.session_ttl_seconds.min(i64::MAX as u64) as i64;

    let mut builder = config::Config::builder();
    builder = builder
        .set_default("http.address", defaults.http.address.clone())
        .unwrap()
        .set_default("http.port", i64::from(defaults.http.port))
        .unwrap()
        .set_default("database.url", defaults.database.url.clone())
        .unwrap()
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )
        .unwrap()
        .set_default("auth.session_ttl_seconds", session_ttl)
        .unwrap()
        .set_default(
            "realtime.mailbox_capacity",
            defaults.realtime.mailbox_capacity as i64,
        )
        .unwrap()
        .set_default(
            "realtime.store_timeout_ms",
            i64::try_from(defaults.realtime.store_timeout_ms).unwrap_or(i64::MAX),
        )
        .unwrap();

    let environment_overrides = config::Environment::with_prefix("COURIER").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("COURIER_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via COURIER_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    debug!(?config, "loaded backend configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert_eq!(config.http.port, 7080);
        assert!(config.database.url.starts_with("sqlite://"));
        assert_eq!(config.auth.session_ttl_seconds, 86_400);
        assert!(config.realtime.mailbox_capacity > 0);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("courier.toml");
        std::fs::write(
            &path,
            "[http]\naddress = \"0.0.0.0\"\nport = 9000\n\n[realtime]\nstore_timeout_ms = 250\n",
        )
        .expect("write config");

        std::env::set_var("COURIER_CONFIG", &path);
        let config = load().expect("config should load");
        std::env::remove_var("COURIER_CONFIG");

        assert_eq!(config.http.address, "0.0.0.0");
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.realtime.store_timeout_ms, 250);
        // Untouched sections keep their defaults.
        assert_eq!(config.database.max_connections, 10);
    }
}
