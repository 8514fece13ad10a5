//! Configuration for tikapi
//!
//! Centralized connection settings with sensible defaults.

use std::time::Duration;

use crate::error::{ApiError, Result};

/// Plaintext API port
pub const DEFAULT_PORT: u16 = 8728;

/// TLS-wrapped API port (TLS itself is not implemented)
pub const DEFAULT_TLS_PORT: u16 = 8729;

/// Upper bound on a single decoded word (16 MB)
pub const DEFAULT_MAX_WORD_LEN: u32 = 16 * 1024 * 1024;

/// Main configuration for a device session
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Endpoint
    // -------------------------------------------------------------------------
    /// Device host name or IP address
    pub host: String,

    /// API port
    pub port: u16,

    // -------------------------------------------------------------------------
    // Credentials
    // -------------------------------------------------------------------------
    /// Login user name
    pub username: String,

    /// Login password, submitted in plaintext
    pub password: String,

    // -------------------------------------------------------------------------
    // Timeouts
    // -------------------------------------------------------------------------
    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Per-read idle timeout (milliseconds, 0 = block forever)
    pub read_timeout_ms: u64,

    /// Per-write timeout (milliseconds, 0 = block forever)
    pub write_timeout_ms: u64,

    /// Absolute deadline for one command, checked between sentences
    /// (milliseconds, 0 = no deadline)
    pub command_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol
    // -------------------------------------------------------------------------
    /// Largest word accepted from the device
    pub max_word_len: u32,

    /// Tag every request, even on the single-request session
    pub auto_tag: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: "admin".to_string(),
            password: String::new(),
            connect_timeout_ms: 10_000,
            read_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
            command_timeout_ms: 0,
            max_word_len: DEFAULT_MAX_WORD_LEN,
            auto_tag: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// `host:port` string suitable for address resolution
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings that can never produce a working session
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ApiError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ApiError::Config("port must not be 0".to_string()));
        }
        if self.max_word_len == 0 {
            return Err(ApiError::Config("max_word_len must be positive".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ApiError::Config("connect_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis_or_none(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis_or_none(self.write_timeout_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        millis_or_none(self.command_timeout_ms)
    }
}

fn millis_or_none(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the device host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the API port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the login user name
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    /// Set the login password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the absolute per-command deadline (in milliseconds)
    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.config.command_timeout_ms = ms;
        self
    }

    /// Set the maximum accepted word length (in bytes)
    pub fn max_word_len(mut self, len: u32) -> Self {
        self.config.max_word_len = len;
        self
    }

    /// Enable or disable automatic request tagging
    pub fn auto_tag(mut self, enabled: bool) -> Self {
        self.config.auto_tag = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
