//! Unified error types for the CodeMarket bot.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Unified error type for the bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Market client error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// The ledger did not contain the bot's own vendor catalog.
    #[error("vendor {name} missing from ledger state")]
    VendorMissing {
        /// The vendor name the bot registered with.
        name: String,
    },

    /// The ledger did not contain the shared store pool.
    #[error("ledger state has no \"stored\" pool")]
    StoreMissing,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by every market client operation.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Connection refused, reset, timed out, or an unreadable body.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status and a body that is not JSON.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        /// Endpoint path.
        endpoint: &'static str,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The server reported an application-level error in the response body.
    #[error("market rejected request: {0}")]
    Rejected(ErrorBody),

    /// The response was JSON but not the shape the endpoint promises.
    #[error("failed to decode {endpoint} response: {reason}")]
    Decode {
        /// Endpoint path.
        endpoint: &'static str,
        /// Reason for failure.
        reason: String,
    },

    /// Registration succeeded at the HTTP level but carried no UUID.
    #[error("registration response did not contain a uuid")]
    MissingUuid,

    /// The configured base address is not a valid URL.
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

impl MarketError {
    /// Whether this is the ledger's terminal `error` condition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MarketError::Rejected(body) if body.is_terminal())
    }
}

/// Field-to-message map of an application error body.
///
/// The server reports failures as flat JSON objects such as
/// `{"error": "vendor not found"}` or `{"UUID": "not found"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    /// Error messages keyed by the offending field.
    pub fields: BTreeMap<String, String>,
}

impl ErrorBody {
    /// Key the server uses for terminal conditions.
    pub const ERROR_KEY: &'static str = "error";

    /// Build an error body from a single field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.into(), message.into());
        Self { fields }
    }

    /// Build an error body from a JSON object, stringifying non-string values.
    pub fn from_object(object: &serde_json::Map<String, Value>) -> Self {
        let fields = object
            .iter()
            .map(|(k, v)| {
                let message = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), message)
            })
            .collect();
        Self { fields }
    }

    /// Whether the body carries the terminal `error` key.
    pub fn is_terminal(&self) -> bool {
        self.fields.contains_key(Self::ERROR_KEY)
    }

    /// Message attached to a field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            return f.write_str("empty error body");
        }
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
