//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server information.
    pub server: ServerConfig,
    /// Network listen configuration.
    pub listen: ListenConfig,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
    /// Group defaults.
    #[serde(default)]
    pub groups: GroupsConfig,
    /// Timeout configuration.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Authentication behavior.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    pub path: String,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host name reported in the protocol banner (e.g., "chat.example.org").
    pub name: String,
    /// Server identity string reported in the banner.
    #[serde(default = "default_server_id")]
    pub id: String,
    /// Reserved nickname that no client may claim.
    #[serde(default = "default_server_nick")]
    pub nickname: String,
    /// Path to the message-of-the-day file.
    pub motd_path: Option<String>,
}

/// Network listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:7326").
    pub address: SocketAddr,
}

/// Group defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupsConfig {
    /// Group new logins land in when they request none.
    #[serde(default = "default_group")]
    pub default_group: String,
    /// Topic given to the default group on creation.
    #[serde(default = "default_topic")]
    pub default_topic: String,
    /// Group long-idle members are moved to.
    #[serde(default = "idle_group")]
    pub idle_group: String,
    /// Group booted members are moved to.
    #[serde(default = "boot_group")]
    pub boot_group: String,
}

/// Timeout configuration, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Idle time before a keepalive ping is sent.
    #[serde(default = "default_ping_secs")]
    pub ping_secs: u64,
    /// Idle time before a session is moved to the idle group.
    #[serde(default = "default_idle_move_secs")]
    pub idle_move_secs: u64,
    /// Idle time before a session is disconnected.
    #[serde(default = "default_idle_disconnect_secs")]
    pub idle_disconnect_secs: u64,
    /// Moderator idle time before moderatorship is handed off.
    #[serde(default = "default_moderator_idle_secs")]
    pub moderator_idle_secs: u64,
    /// Window during which a repeated away notice is suppressed.
    #[serde(default = "default_away_notice_secs")]
    pub away_notice_secs: u64,
}

/// Authentication behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Allow password-less auto-login when the stored last-login
    /// loginid and host match the connecting client.
    #[serde(default = "default_true")]
    pub auto_register: bool,
}

fn default_server_id() -> String {
    format!("icbd-ng {}", env!("CARGO_PKG_VERSION"))
}

fn default_server_nick() -> String {
    "server".to_string()
}

fn default_group() -> String {
    "lobby".to_string()
}

fn default_topic() -> String {
    "(None)".to_string()
}

fn idle_group() -> String {
    "idle".to_string()
}

fn boot_group() -> String {
    "boot".to_string()
}

fn default_ping_secs() -> u64 {
    90
}

fn default_idle_move_secs() -> u64 {
    3600
}

fn default_idle_disconnect_secs() -> u64 {
    14400
}

fn default_moderator_idle_secs() -> u64 {
    1800
}

fn default_away_notice_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            default_group: default_group(),
            default_topic: default_topic(),
            idle_group: idle_group(),
            boot_group: boot_group(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            ping_secs: default_ping_secs(),
            idle_move_secs: default_idle_move_secs(),
            idle_disconnect_secs: default_idle_disconnect_secs(),
            moderator_idle_secs: default_moderator_idle_secs(),
            away_notice_secs: default_away_notice_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auto_register: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "localhost".to_string(),
                id: default_server_id(),
                nickname: default_server_nick(),
                motd_path: None,
            },
            listen: ListenConfig {
                address: "127.0.0.1:7326".parse().expect("static address"),
            },
            database: None,
            groups: GroupsConfig::default(),
            timeouts: TimeoutsConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let toml = r#"
            [server]
            name = "chat.example.org"

            [listen]
            address = "0.0.0.0:7326"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.nickname, "server");
        assert_eq!(config.groups.default_group, "lobby");
        assert_eq!(config.timeouts.ping_secs, 90);
        assert!(config.auth.auto_register);
    }

    #[test]
    fn test_overrides() {
        let toml = r#"
            [server]
            name = "chat.example.org"
            nickname = "icb"

            [listen]
            address = "0.0.0.0:7326"

            [groups]
            default_group = "1"

            [auth]
            auto_register = false
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.nickname, "icb");
        assert_eq!(config.groups.default_group, "1");
        assert!(!config.auth.auto_register);
    }
}
