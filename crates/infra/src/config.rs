//! Process configuration, read from environment variables.

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 5;
pub const DEFAULT_REFRESH_TTL_MINUTES: i64 = 1440;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Which verification notifier to wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifierKind {
    #[default]
    Console,
    Log,
}

/// Credentials for the superuser created (or promoted) at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct SuperuserBootstrap {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for SuperuserBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuperuserBootstrap")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub public_base_url: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    /// `Some` when persistent stores are enabled.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub notifier: NotifierKind,
    pub bootstrap_superuser: Option<SuperuserBootstrap>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("public_base_url", &self.public_base_url)
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_minutes", &self.refresh_ttl_minutes)
            .field("persistent", &self.database_url.is_some())
            .field("db_max_connections", &self.db_max_connections)
            .field("notifier", &self.notifier)
            .field("bootstrap_superuser", &self.bootstrap_superuser)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            access_ttl_minutes: DEFAULT_ACCESS_TTL_MINUTES,
            refresh_ttl_minutes: DEFAULT_REFRESH_TTL_MINUTES,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            notifier: NotifierKind::Console,
            bootstrap_superuser: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = parse_var("BIND_ADDR", get("BIND_ADDR"), DEFAULT_BIND_ADDR.parse::<SocketAddr>().ok())?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let access_ttl_minutes = positive_minutes(
            "ACCESS_TOKEN_TTL_MINUTES",
            get("ACCESS_TOKEN_TTL_MINUTES"),
            DEFAULT_ACCESS_TTL_MINUTES,
        )?;
        let refresh_ttl_minutes = positive_minutes(
            "REFRESH_TOKEN_TTL_MINUTES",
            get("REFRESH_TOKEN_TTL_MINUTES"),
            DEFAULT_REFRESH_TTL_MINUTES,
        )?;

        let persistent = parse_var("USE_PERSISTENT_STORES", get("USE_PERSISTENT_STORES"), Some(false))?;
        let database_url = if persistent {
            Some(get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?)
        } else {
            None
        };
        let db_max_connections = parse_var(
            "DB_MAX_CONNECTIONS",
            get("DB_MAX_CONNECTIONS"),
            Some(DEFAULT_DB_MAX_CONNECTIONS),
        )?;

        let notifier = match get("NOTIFIER").as_deref() {
            None | Some("console") => NotifierKind::Console,
            Some("log") => NotifierKind::Log,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "NOTIFIER",
                    value: other.to_string(),
                    reason: "expected 'console' or 'log'".to_string(),
                });
            }
        };

        let bootstrap_superuser = match (
            get("BOOTSTRAP_SUPERUSER_USERNAME"),
            get("BOOTSTRAP_SUPERUSER_EMAIL"),
            get("BOOTSTRAP_SUPERUSER_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(SuperuserBootstrap {
                username,
                email,
                password,
            }),
            (None, None, None) => None,
            (username, email, _) => {
                let missing = if username.is_none() {
                    "BOOTSTRAP_SUPERUSER_USERNAME"
                } else if email.is_none() {
                    "BOOTSTRAP_SUPERUSER_EMAIL"
                } else {
                    "BOOTSTRAP_SUPERUSER_PASSWORD"
                };
                return Err(ConfigError::Missing(missing));
            }
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            public_base_url,
            access_ttl_minutes,
            refresh_ttl_minutes,
            database_url,
            db_max_connections,
            notifier,
            bootstrap_superuser,
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.database_url.is_some()
    }
}

fn parse_var<T>(var: &'static str, raw: Option<String>, default: Option<T>) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
        None => default.ok_or(ConfigError::Missing(var)),
    }
}

fn positive_minutes(var: &'static str, raw: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let minutes = parse_var(var, raw, Some(default))?;
    if minutes <= 0 {
        return Err(ConfigError::Invalid {
            var,
            value: minutes.to_string(),
            reason: "must be a positive number of minutes".to_string(),
        });
    }
    Ok(minutes)
}
