//! Application configuration loaded from environment variables.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::BotError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Market Connection ===
    /// Base address of the CodeMarket server.
    #[serde(default = "default_market_url")]
    pub codemarket_url: String,

    /// Optional timeout for individual requests. Unset means no timeout.
    #[serde(default)]
    pub http_timeout_ms: Option<u64>,

    // === Vendor Identity ===
    /// Vendor name to register with. A random number is used when unset.
    #[serde(default)]
    pub vendor_name: Option<String>,

    /// Optional vendor url sent at registration.
    #[serde(default)]
    pub vendor_url: Option<String>,

    // === Bot Behaviour ===
    /// Seconds to sleep between loop iterations.
    #[serde(default = "default_loop_interval")]
    pub loop_interval_secs: u64,

    /// Trade against an in-memory simulated market instead of the server.
    #[serde(default)]
    pub dry_run: bool,

    // === Server Configuration ===
    /// HTTP server port for health/status/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

/// Log directive used in verbose mode.
pub const VERBOSE_LOG_DIRECTIVE: &str = "codemarket_bot=debug,info";

fn default_market_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_loop_interval() -> u64 {
    10
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            codemarket_url: default_market_url(),
            http_timeout_ms: None,
            vendor_name: None,
            vendor_url: None,
            loop_interval_secs: default_loop_interval(),
            dry_run: false,
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Load and validate in one step.
    pub fn load_validated() -> crate::Result<Self> {
        let config = Self::load()?;
        config.validate().map_err(BotError::InvalidConfig)?;
        Ok(config)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        let url = Url::parse(&self.codemarket_url)
            .map_err(|e| format!("CODEMARKET_URL is not a valid url: {}", e))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err("CODEMARKET_URL must use http or https".to_string());
        }

        if self.loop_interval_secs == 0 {
            return Err("LOOP_INTERVAL_SECS must be at least 1".to_string());
        }

        if matches!(&self.vendor_name, Some(name) if name.trim().is_empty()) {
            return Err("VENDOR_NAME must not be blank".to_string());
        }

        Ok(())
    }

    /// Delay between bot iterations.
    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval_secs)
    }

    /// Filter directive for the log subscriber.
    ///
    /// `--verbose` or `VERBOSE=true` raises this crate to debug; otherwise
    /// `RUST_LOG` is used as given.
    pub fn log_directive(&self, verbose_flag: bool) -> String {
        if verbose_flag || self.verbose {
            VERBOSE_LOG_DIRECTIVE.to_string()
        } else {
            self.rust_log.clone()
        }
    }

    /// Request timeout, if one is configured.
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_ms.map(Duration::from_millis)
    }
}
