use crate::ws::dial::AuthMode;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Credential presented to the agent service on every dial attempt.
    pub api_key: String,
    /// Identifier of the hosted agent every call leg is bridged to.
    pub agent_id: String,
    /// Optional explicit agent endpoint, tried before any built-in host.
    pub override_endpoint: Option<String>,
    /// Optional auth style ordered first within each endpoint.
    pub auth_preference: Option<AuthMode>,
    /// Upper bound for a single dial attempt's handshake.
    pub dial_timeout: Duration,
    /// Period of the liveness sweep over all open sockets.
    pub heartbeat_period: Duration,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let api_key = std::env::var("BRIDGE_API_KEY")
            .map_err(|_| ConfigError::MissingVar("BRIDGE_API_KEY".to_string()))?;
        let agent_id = std::env::var("BRIDGE_AGENT_ID")
            .map_err(|_| ConfigError::MissingVar("BRIDGE_AGENT_ID".to_string()))?;

        let override_endpoint = std::env::var("BRIDGE_ENDPOINT").ok();

        let auth_preference = match std::env::var("BRIDGE_AUTH_MODE") {
            Ok(raw) => Some(raw.parse::<AuthMode>().map_err(|_| {
                ConfigError::InvalidValue(
                    "BRIDGE_AUTH_MODE".to_string(),
                    format!("'{}' is not a known auth mode", raw),
                )
            })?),
            Err(_) => None,
        };

        let dial_timeout = parse_secs("DIAL_TIMEOUT_SECS", 8)?;
        let heartbeat_period = parse_secs("HEARTBEAT_SECS", 20)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            api_key,
            agent_id,
            override_endpoint,
            auth_preference,
            dial_timeout,
            heartbeat_period,
            log_level,
        })
    }
}

/// Reads a whole-seconds duration from the environment, with a default.
fn parse_secs(var: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("BRIDGE_API_KEY");
            env::remove_var("BRIDGE_AGENT_ID");
            env::remove_var("BRIDGE_ENDPOINT");
            env::remove_var("BRIDGE_AUTH_MODE");
            env::remove_var("DIAL_TIMEOUT_SECS");
            env::remove_var("HEARTBEAT_SECS");
            env::remove_var("RUST_LOG");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("BRIDGE_API_KEY", "test-key");
            env::set_var("BRIDGE_AGENT_ID", "agent-123");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.agent_id, "agent-123");
        assert_eq!(config.override_endpoint, None);
        assert_eq!(config.auth_preference, None);
        assert_eq!(config.dial_timeout, Duration::from_secs(8));
        assert_eq!(config.heartbeat_period, Duration::from_secs(20));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("BRIDGE_ENDPOINT", "wss://agents.example.com/v1/stream");
            env::set_var("BRIDGE_AUTH_MODE", "bearer");
            env::set_var("DIAL_TIMEOUT_SECS", "3");
            env::set_var("HEARTBEAT_SECS", "5");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(
            config.override_endpoint.as_deref(),
            Some("wss://agents.example.com/v1/stream")
        );
        assert_eq!(config.auth_preference, Some(AuthMode::Bearer));
        assert_eq!(config.dial_timeout, Duration::from_secs(3));
        assert_eq!(config.heartbeat_period, Duration::from_secs(5));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();
        unsafe {
            env::set_var("BRIDGE_AGENT_ID", "agent-123");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "BRIDGE_API_KEY"),
            _ => panic!("Expected MissingVar for BRIDGE_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_agent_id() {
        clear_env_vars();
        unsafe {
            env::set_var("BRIDGE_API_KEY", "test-key");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "BRIDGE_AGENT_ID"),
            _ => panic!("Expected MissingVar for BRIDGE_AGENT_ID"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_auth_mode() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BRIDGE_AUTH_MODE", "kerberos");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BRIDGE_AUTH_MODE"),
            _ => panic!("Expected InvalidValue for BRIDGE_AUTH_MODE"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_dial_timeout() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("DIAL_TIMEOUT_SECS", "soon");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "DIAL_TIMEOUT_SECS"),
            _ => panic!("Expected InvalidValue for DIAL_TIMEOUT_SECS"),
        }
    }
}
