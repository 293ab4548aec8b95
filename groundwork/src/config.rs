//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: GROUNDWORK_, nested keys split on `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/groundwork/{service_name}/config.toml
//! 4. System directory: /etc/groundwork/{service_name}/config.toml
//! 5. Default values
//!
//! `GROUNDWORK_DATABASE__URL=postgres://...` sets `database.url`;
//! `GROUNDWORK_REPOSITORY__DEFAULT_LIST_LIMIT=50` sets
//! `repository.default_list_limit`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::repository::MisusePolicy;

const ENV_PREFIX: &str = "GROUNDWORK_";
const APP_DIR: &str = "groundwork";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Repository defaults
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Database configuration (optional)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Redis configuration (optional)
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Environment (local, dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ServiceConfig {
    /// Whether the service runs on a developer machine
    ///
    /// Local runs talk to Redis without TLS.
    pub fn is_local(&self) -> bool {
        self.environment == "local"
    }
}

/// Defaults applied by [`Repository::with_config`](crate::repository::Repository::with_config)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Page size for `list` when the caller passes a zero limit
    #[serde(default = "default_list_limit")]
    pub default_list_limit: u64,

    /// Page size for `list_by_user_id` when the caller passes a zero limit
    #[serde(default = "default_user_list_limit")]
    pub default_user_list_limit: u64,

    /// Hide rows with `deactivated_at` set
    #[serde(default = "default_true")]
    pub hide_deactivated: bool,

    /// Hide rows with `deleted_at` set
    #[serde(default = "default_true")]
    pub hide_deleted: bool,

    /// Behavior of `commit`/`rollback` outside a transaction
    #[serde(default)]
    pub misuse: MisusePolicy,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_list_limit: default_list_limit(),
            default_user_list_limit: default_user_list_limit(),
            hide_deactivated: true,
            hide_deleted: true,
            misuse: MisusePolicy::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum idle connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum retry attempts for establishing database connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Upper bound on any single statement, in seconds
    ///
    /// Enforced by the server on every pooled connection; a statement that
    /// runs longer is cancelled there.
    #[serde(default)]
    pub statement_timeout_secs: Option<u64>,
}

impl DatabaseConfig {
    /// Statement timeout as a duration; zero means no limit
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Host name, or a cluster seed node
    pub host: String,

    /// Port
    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Password, if the server requires one
    #[serde(default)]
    pub password: Option<String>,

    /// Talk to a Redis cluster instead of a single node
    #[serde(default)]
    pub cluster_mode: bool,

    /// Maximum number of connections in the pool
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl RedisConfig {
    /// Connection URL, `rediss://` when `tls` is set
    ///
    /// The password is percent-encoded.
    pub fn url(&self, tls: bool) -> String {
        let scheme = if tls { "rediss" } else { "redis" };
        let base = format!("{}://{}:{}", scheme, self.host, self.port);

        let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) else {
            return base;
        };
        let Ok(mut parsed) = url::Url::parse(&base) else {
            return base;
        };
        match parsed.set_password(Some(password)) {
            Ok(()) => parsed.to_string(),
            Err(()) => base,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_list_limit() -> u64 {
    20
}

fn default_user_list_limit() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    50
}

fn default_min_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_max_connections() -> usize {
    10
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is taken from the running binary.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| APP_DIR.to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Self::defaults_for(service_name)));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Skips the system and XDG directories. Environment variables still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Candidate config files, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let config_file = Path::new(service_name).join("config.toml");
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(path) = xdg::BaseDirectories::with_prefix(APP_DIR).find_config_file(&config_file) {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc").join(APP_DIR).join(config_file));
        paths
    }

    fn defaults_for(service_name: &str) -> Self {
        let mut config = Self::default();
        config.service.name = service_name.to_string();
        config
    }

    /// Get database URL
    pub fn database_url(&self) -> Option<&str> {
        self.database.as_ref().map(|db| db.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: APP_DIR.to_string(),
                environment: default_environment(),
                log_level: default_log_level(),
            },
            repository: RepositoryConfig::default(),
            database: None,
            redis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.service.environment, "dev");
        assert!(!config.service.is_local());
        assert_eq!(config.repository.default_list_limit, 20);
        assert_eq!(config.repository.default_user_list_limit, 100);
        assert!(config.repository.hide_deactivated);
        assert_eq!(config.repository.misuse, MisusePolicy::Panic);
        assert!(config.database_url().is_none());
    }

    #[test]
    fn test_load_from_file_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "service.toml",
                r#"
                [service]
                name = "ledger"
                environment = "local"

                [repository]
                default_list_limit = 50
                misuse = "error"

                [database]
                url = "postgres://localhost/ledger"
                max_connections = 8
                statement_timeout_secs = 3
                "#,
            )?;
            jail.set_env("GROUNDWORK_DATABASE__MAX_CONNECTIONS", "12");

            let config = Config::load_from("service.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.service.name, "ledger");
            assert!(config.service.is_local());
            assert_eq!(config.repository.default_list_limit, 50);
            assert_eq!(config.repository.default_user_list_limit, 100);
            assert_eq!(config.repository.misuse, MisusePolicy::Error);

            let db = config.database.expect("database section");
            assert_eq!(db.url, "postgres://localhost/ledger");
            assert_eq!(db.statement_timeout(), Some(Duration::from_secs(3)));
            assert_eq!(db.max_connections, 12);
            assert_eq!(db.min_connections, 5);
            assert_eq!(db.max_retries, 5);
            Ok(())
        });
    }

    #[test]
    fn test_load_for_service_reads_working_directory() {
        Jail::expect_with(|jail| {
            let home = jail.directory().display().to_string();
            let xdg_home = jail.directory().join("xdg").display().to_string();
            jail.set_env("HOME", &home);
            jail.set_env("XDG_CONFIG_HOME", &xdg_home);
            jail.create_file(
                "config.toml",
                r#"
                [redis]
                host = "cache.internal"
                cluster_mode = true
                "#,
            )?;
            jail.set_env("GROUNDWORK_SERVICE__LOG_LEVEL", "debug");

            let config = Config::load_for_service("payments").map_err(|e| e.to_string())?;
            assert_eq!(config.service.name, "payments");
            assert_eq!(config.service.log_level, "debug");

            let redis = config.redis.expect("redis section");
            assert_eq!(redis.host, "cache.internal");
            assert_eq!(redis.port, 6379);
            assert!(redis.cluster_mode);
            assert_eq!(redis.max_connections, 10);
            Ok(())
        });
    }

    #[test]
    fn test_env_only_database_section() {
        Jail::expect_with(|jail| {
            jail.set_env("GROUNDWORK_DATABASE__URL", "postgres://db/app");

            let config = Config::load_from("missing.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.database_url(), Some("postgres://db/app"));
            let db = config.database.expect("database section");
            assert_eq!(db.statement_timeout(), None);
            Ok(())
        });
    }

    #[test]
    fn test_statement_timeout_zero_is_unbounded() {
        Jail::expect_with(|jail| {
            jail.set_env("GROUNDWORK_DATABASE__URL", "postgres://db/app");
            jail.set_env("GROUNDWORK_DATABASE__STATEMENT_TIMEOUT_SECS", "0");

            let config = Config::load_from("missing.toml").map_err(|e| e.to_string())?;
            let db = config.database.expect("database section");
            assert_eq!(db.statement_timeout_secs, Some(0));
            assert_eq!(db.statement_timeout(), None);
            Ok(())
        });
    }

    fn redis(password: Option<&str>) -> RedisConfig {
        RedisConfig {
            host: "localhost".to_string(),
            port: 6380,
            password: password.map(str::to_string),
            cluster_mode: false,
            max_connections: 10,
            connection_timeout_secs: 10,
        }
    }

    #[test]
    fn test_redis_url_scheme() {
        assert_eq!(redis(None).url(false), "redis://localhost:6380");
        assert_eq!(redis(None).url(true), "rediss://localhost:6380");
        assert_eq!(redis(Some("")).url(false), "redis://localhost:6380");
    }

    #[test]
    fn test_redis_url_encodes_password() {
        assert_eq!(
            redis(Some("p@ss word")).url(true),
            "rediss://:p%40ss%20word@localhost:6380"
        );
        assert_eq!(redis(Some("secret")).url(false), "redis://:secret@localhost:6380");
    }

    #[test]
    fn test_redis_url_falls_back_when_host_does_not_parse() {
        let mut config = redis(Some("secret"));
        config.host = "bad host".to_string();
        assert_eq!(config.url(false), "redis://bad host:6380");
    }
}
