//! Configuration management for Runnel.
//!
//! Configuration is read from `~/.config/runnel/config.toml` (or the path
//! given with `--config`). If the file doesn't exist, a default configuration
//! with comments is created. Secrets never live in this file; see
//! [`Credentials`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::transport::discord::DEFAULT_API_BASE;

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DISCORD_TOKEN_ENV: &str = "DISCORD_TOKEN";
pub const DISCORD_OWNER_ID_ENV: &str = "DISCORD_OWNER_ID";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poller: PollerConfig,
    pub registration: RegistrationConfig,
    pub logging: LoggingConfig,
    pub discord: DiscordConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    #[serde(deserialize_with = "deserialize_interval")]
    pub interval: Duration,
    /// Poll once immediately instead of waiting for the first tick.
    pub poll_on_start: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(crate::poller::DEFAULT_POLL_INTERVAL_SECS),
            poll_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Idle time after which an unfinished registration is dropped.
    #[serde(deserialize_with = "deserialize_interval")]
    pub session_timeout: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(crate::bot::session::DEFAULT_SESSION_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Log file appended to alongside stdout. Empty disables it.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("runnel.log")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub api_base: String,
    /// Channels polled for `!ping` / `!rssadd` commands.
    pub control_channels: Vec<String>,
    #[serde(deserialize_with = "deserialize_interval")]
    pub listen_interval: Duration,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            control_channels: Vec::new(),
            listen_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Schema file used instead of the built-in one.
    pub schema_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the default config file path: `~/.config/runnel/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("runnel").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        format!(
            r##"# Runnel Configuration
#
# Durations use a number with a unit suffix: "45s", "30m", "6h", "1d".
#
# Secrets are read from the environment, never from this file:
#   {db}      SQLite database (path, sqlite://path or sqlite::memory:)
#   {token}     bot token
#   {owner}  the only user allowed to add feeds

[poller]
# How often registered feeds are checked
interval = "2m"

# Run a pass right after startup
poll_on_start = false

[registration]
# Unfinished !rssadd sessions are dropped after this much idle time
session_timeout = "10m"

[logging]
# Filter directive; RUST_LOG overrides it
level = "info"

# Log file appended to in addition to stdout
file = "runnel.log"

[discord]
api_base = "{api}"

# Channel ids watched for !ping and !rssadd
control_channels = []

# How often control channels are checked for new messages
listen_interval = "5s"

[store]
# Use a custom schema file instead of the built-in one
# schema_path = "/etc/runnel/schema.sql"
"##,
            db = DATABASE_URL_ENV,
            token = DISCORD_TOKEN_ENV,
            owner = DISCORD_OWNER_ID_ENV,
            api = DEFAULT_API_BASE,
        )
    }
}

/// Parse interval string like "1h", "30m", "6h", "1d" into seconds.
pub fn parse_interval(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 3600, "hours")
    } else if let Some(minutes) = s.strip_suffix('m') {
        scaled(minutes, 60, "minutes")
    } else if let Some(days) = s.strip_suffix('d') {
        scaled(days, 86400, "days")
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>()
            .map_err(|_| format!("Invalid seconds: {}", secs))
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))
    }
}

fn scaled(value: &str, unit_secs: u64, unit: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("Invalid {}: {}", unit, value))?
        .checked_mul(unit_secs)
        .ok_or_else(|| format!("Interval too large: {}{}", value, &unit[..1]))
}

/// Format interval for display
pub fn format_interval(secs: u64) -> String {
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

fn deserialize_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let secs = parse_interval(&raw).map_err(serde::de::Error::custom)?;
    if secs == 0 {
        return Err(serde::de::Error::custom("interval must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

/// Secrets and deployment identity taken from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub database_url: String,
    pub discord_token: String,
    pub owner_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("database_url", &self.database_url)
            .field("discord_token", &"<redacted>")
            .field("owner_id", &self.owner_id)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };

        Ok(Self {
            database_url: require(DATABASE_URL_ENV)?,
            discord_token: require(DISCORD_TOKEN_ENV)?,
            owner_id: require(DISCORD_OWNER_ID_ENV)?,
        })
    }

    /// Only the database is needed by offline commands.
    pub fn database_url_from_env() -> Result<String, ConfigError> {
        std::env::var(DATABASE_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(DATABASE_URL_ENV))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),
}
