//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via VATP_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by the caller)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vatp_client::{AdminConfig, AuthMode, ConnectionConfig, Credentials, TokenPolicy};

/// Client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server connection settings.
    pub server: ServerConfig,
    /// ADMIN credentials and authentication behavior.
    pub admin: AdminSection,
    /// OBSERVER settings.
    pub observer: ObserverSection,
}

impl Config {
    /// Loads configuration from `path` (or VATP_CONFIG when `None`), then
    /// applies environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("VATP_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from any variable source. Unparseable values are
    /// ignored, like unset ones.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.server.apply_overrides(&var);
        self.admin.apply_overrides(&var);
        if let Some(username) = var("VATP_OBSERVER_USERNAME") {
            self.observer.username = username;
        }
    }

    /// Rejects settings no session could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin.username.is_empty() {
            return Err(ConfigError::ValidationError(
                "admin.username must not be empty".to_string(),
            ));
        }
        if self.observer.username.is_empty() {
            return Err(ConfigError::ValidationError(
                "observer.username must not be empty".to_string(),
            ));
        }
        if self.server.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "server.connect_timeout_secs must be positive".to_string(),
            ));
        }
        if self.server.request_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "server.request_timeout_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Transport settings for both client roles.
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut conn = ConnectionConfig::new(self.server.addr)
            .with_connect_timeout(self.server.connect_timeout())
            .with_read_buffer_size(self.server.read_buffer_size);
        if let Some(timeout) = self.server.request_timeout() {
            conn = conn.with_request_timeout(timeout);
        }
        conn
    }

    /// Credentials and authentication behavior for the ADMIN client.
    pub fn admin_config(&self) -> AdminConfig {
        AdminConfig::new(Credentials::new(
            self.admin.username.clone(),
            self.admin.password.clone(),
        ))
        .with_auth_mode(self.admin.auth_mode)
        .with_token_policy(self.admin.token_policy)
    }
}

/// Server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address of the vehicle server.
    #[serde(with = "socket_addr_serde")]
    pub addr: SocketAddr,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// ADMIN request timeout in seconds. Unset waits forever.
    pub request_timeout_secs: Option<u64>,
    /// Socket read buffer size in bytes.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], vatp_protocol::DEFAULT_PORT)),
            connect_timeout_secs: 10,
            request_timeout_secs: None,
            read_buffer_size: vatp_client::connection::DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("VATP_SERVER") {
            if let Ok(parsed) = addr.parse() {
                self.addr = parsed;
            }
        }

        if let Some(timeout) = var("VATP_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }

        if let Some(timeout) = var("VATP_REQUEST_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.request_timeout_secs = Some(secs);
            }
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// ADMIN settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSection {
    pub username: String,
    pub password: String,
    /// `silent` or `strict`.
    pub auth_mode: AuthMode,
    /// `substring` or `header`.
    pub token_policy: TokenPolicy,
}

impl Default for AdminSection {
    fn default() -> Self {
        let credentials = Credentials::default();
        Self {
            username: credentials.username,
            password: credentials.password,
            auth_mode: AuthMode::default(),
            token_policy: TokenPolicy::default(),
        }
    }
}

impl std::fmt::Debug for AdminSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSection")
            .field("username", &self.username)
            .field("password", &"***")
            .field("auth_mode", &self.auth_mode)
            .field("token_policy", &self.token_policy)
            .finish()
    }
}

impl AdminSection {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(username) = var("VATP_USERNAME") {
            self.username = username;
        }
        if let Some(password) = var("VATP_PASSWORD") {
            self.password = password;
        }
        if let Some(mode) = var("VATP_AUTH_MODE") {
            if let Ok(parsed) = mode.parse() {
                self.auth_mode = parsed;
            }
        }
        if let Some(policy) = var("VATP_TOKEN_POLICY") {
            if let Ok(parsed) = policy.parse() {
                self.token_policy = parsed;
            }
        }
    }
}

/// OBSERVER settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverSection {
    pub username: String,
}

impl Default for ObserverSection {
    fn default() -> Self {
        Self {
            username: "observer".to_string(),
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.admin.username, "admin");
        assert_eq!(config.admin.password, "admin123");
        assert_eq!(config.admin.auth_mode, AuthMode::Silent);
        assert_eq!(config.admin.token_policy, TokenPolicy::Substring);
        assert_eq!(config.observer.username, "observer");
        assert!(config.server.request_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  addr: \"10.0.0.5:9000\"\n  request_timeout_secs: 3\nadmin:\n  username: ops\n  auth_mode: strict\n  token_policy: header\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.addr, "10.0.0.5:9000".parse().unwrap());
        assert_eq!(config.server.request_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.server.connect_timeout_secs, 10);
        assert_eq!(config.admin.username, "ops");
        // Unset fields keep their defaults
        assert_eq!(config.admin.password, "admin123");
        assert_eq!(config.admin.auth_mode, AuthMode::Strict);
        assert_eq!(config.admin.token_policy, TokenPolicy::Header);
        assert_eq!(config.observer.username, "observer");
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/vatp.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));
    }

    #[test]
    fn test_bad_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  addr: \"not an address\"").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[
            ("VATP_SERVER", "192.168.1.20:8081"),
            ("VATP_USERNAME", "root"),
            ("VATP_PASSWORD", "s3cret"),
            ("VATP_OBSERVER_USERNAME", "dash"),
            ("VATP_AUTH_MODE", "STRICT"),
            ("VATP_TOKEN_POLICY", "header"),
            ("VATP_CONNECT_TIMEOUT", "2"),
            ("VATP_REQUEST_TIMEOUT", "7"),
        ]));

        assert_eq!(config.server.addr, "192.168.1.20:8081".parse().unwrap());
        assert_eq!(config.admin.username, "root");
        assert_eq!(config.admin.password, "s3cret");
        assert_eq!(config.observer.username, "dash");
        assert_eq!(config.admin.auth_mode, AuthMode::Strict);
        assert_eq!(config.admin.token_policy, TokenPolicy::Header);
        assert_eq!(config.server.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.server.request_timeout(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[
            ("VATP_SERVER", "localhost"),
            ("VATP_AUTH_MODE", "loud"),
            ("VATP_REQUEST_TIMEOUT", "soon"),
        ]));
        assert_eq!(config.server.addr, ServerConfig::default().addr);
        assert_eq!(config.admin.auth_mode, AuthMode::Silent);
        assert!(config.server.request_timeout().is_none());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.admin.username.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.server.request_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_configs() {
        let mut config = Config::default();
        config.server.request_timeout_secs = Some(4);
        config.server.read_buffer_size = 1;

        let conn = config.connection_config();
        assert_eq!(conn.addr, config.server.addr);
        assert_eq!(conn.request_timeout, Some(Duration::from_secs(4)));
        assert_eq!(
            conn.read_buffer_size,
            vatp_client::connection::MIN_READ_BUFFER_SIZE
        );

        let admin = config.admin_config();
        assert_eq!(admin.credentials, Credentials::new("admin", "admin123"));
        assert_eq!(admin.auth_mode, AuthMode::Silent);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", serde_yaml::to_string(&config).unwrap()).unwrap();

        let parsed = Config::from_file(file.path()).unwrap();
        assert_eq!(parsed.server.addr, config.server.addr);
        assert_eq!(parsed.admin.token_policy, config.admin.token_policy);
    }

    #[test]
    fn test_debug_masks_password() {
        let shown = format!("{:?}", Config::default());
        assert!(!shown.contains("admin123"));
    }
}
