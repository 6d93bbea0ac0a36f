//! CodeMarket HTTP client and the client interface the bot is written against.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::{ErrorBody, MarketError};
use crate::metrics;

use super::types::{
    Endpoint, LedgerState, Method, PurchaseOrder, Receipt, Registration, StockRequest, UuidForm,
};

/// The six CodeMarket operations.
///
/// The bot only depends on this trait, so tests and dry runs can swap in
/// [`MockMarketClient`](super::MockMarketClient).
#[async_trait]
pub trait MarketApi: Send + Sync {
    /// Register a new vendor and return its uuid.
    async fn register_vendor(
        &self,
        vendor_name: &str,
        vendor_url: Option<&str>,
    ) -> Result<String, MarketError>;

    /// Fetch the current ledger state on behalf of a vendor.
    async fn get_ledger_state(&self, uuid: &str) -> Result<LedgerState, MarketError>;

    /// Move items between a vendor's store and stock and set the item price.
    async fn stock(&self, request: &StockRequest) -> Result<Receipt, MarketError>;

    /// Names of all registered vendors.
    async fn get_vendor_names(&self) -> Result<Vec<String>, MarketError>;

    /// Urls of all registered vendors.
    async fn get_vendor_urls(&self) -> Result<Vec<String>, MarketError>;

    /// Buy items from a named vendor.
    async fn purchase(&self, order: &PurchaseOrder) -> Result<Receipt, MarketError>;
}

#[async_trait]
impl<T: MarketApi + ?Sized> MarketApi for Arc<T> {
    async fn register_vendor(
        &self,
        vendor_name: &str,
        vendor_url: Option<&str>,
    ) -> Result<String, MarketError> {
        (**self).register_vendor(vendor_name, vendor_url).await
    }

    async fn get_ledger_state(&self, uuid: &str) -> Result<LedgerState, MarketError> {
        (**self).get_ledger_state(uuid).await
    }

    async fn stock(&self, request: &StockRequest) -> Result<Receipt, MarketError> {
        (**self).stock(request).await
    }

    async fn get_vendor_names(&self) -> Result<Vec<String>, MarketError> {
        (**self).get_vendor_names().await
    }

    async fn get_vendor_urls(&self) -> Result<Vec<String>, MarketError> {
        (**self).get_vendor_urls().await
    }

    async fn purchase(&self, order: &PurchaseOrder) -> Result<Receipt, MarketError> {
        (**self).purchase(order).await
    }
}

/// HTTP client for a CodeMarket server.
#[derive(Debug, Clone)]
pub struct CodeMarketClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base address every endpoint path is resolved against.
    base_url: Url,
}

impl CodeMarketClient {
    /// Create a client for the market at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, MarketError> {
        Self::with_http(base_url, reqwest::Client::new())
    }

    /// Create a client from config, applying the optional request timeout.
    pub fn from_config(config: &Config) -> Result<Self, MarketError> {
        let mut builder = reqwest::Client::builder()
            // Keep connections alive between polling iterations
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(90));

        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }

        Self::with_http(&config.codemarket_url, builder.build()?)
    }

    /// Create a client around an existing `reqwest::Client`.
    ///
    /// Any path on `base_url` is kept as a prefix for every endpoint.
    pub fn with_http(base_url: &str, http: reqwest::Client) -> Result<Self, MarketError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    /// Get the base address.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint against the base address.
    pub fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url, MarketError> {
        Ok(self.base_url.join(endpoint.path().trim_start_matches('/'))?)
    }

    /// Issue a request and parse the body as JSON, whatever the status.
    ///
    /// Error statuses usually carry a JSON error body; only bodies that fail
    /// to parse are reported as [`MarketError::Status`].
    async fn call<F: Serialize + ?Sized>(
        &self,
        endpoint: Endpoint,
        form: Option<&F>,
    ) -> Result<Value, MarketError> {
        let url = self.endpoint_url(endpoint)?;
        let start = Instant::now();

        let request = match endpoint.method() {
            Method::Get => self.http.get(url),
            Method::Post => {
                let request = self.http.post(url);
                match form {
                    Some(form) => request.form(form),
                    None => request,
                }
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        metrics::record_http_latency(start, endpoint.as_ref());

        debug!(endpoint = %endpoint, status = status.as_u16(), "Market responded");

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(value),
            Err(e) if status.is_success() => Err(MarketError::Decode {
                endpoint: endpoint.path(),
                reason: e.to_string(),
            }),
            Err(_) => {
                warn!(endpoint = %endpoint, status = status.as_u16(), "Non-JSON error body");
                Err(MarketError::Status {
                    endpoint: endpoint.path(),
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

/// Extract the uuid from a registration response.
pub fn parse_registration(value: Value) -> Result<String, MarketError> {
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(MarketError::Decode {
                endpoint: Endpoint::Register.path(),
                reason: format!("expected object, got {}", other),
            })
        }
    };

    match object.get("uuid") {
        Some(Value::String(uuid)) if !uuid.is_empty() => Ok(uuid.clone()),
        _ if object.keys().any(|k| k != "uuid") => {
            Err(MarketError::Rejected(ErrorBody::from_object(&object)))
        }
        _ => Err(MarketError::MissingUuid),
    }
}

/// Interpret a ledger response.
///
/// An object with an `error` key, or with any string-valued field, is an
/// error body. Everything else must be a map of catalogs.
pub fn parse_ledger_state(value: Value) -> Result<LedgerState, MarketError> {
    if let Value::Object(object) = &value {
        let is_error = object.contains_key(ErrorBody::ERROR_KEY)
            || object.values().any(Value::is_string);
        if is_error {
            return Err(MarketError::Rejected(ErrorBody::from_object(object)));
        }
    }

    serde_json::from_value(value).map_err(|e| MarketError::Decode {
        endpoint: Endpoint::LedgerState.path(),
        reason: e.to_string(),
    })
}

/// Interpret a stock or purchase response.
pub fn parse_receipt(endpoint: Endpoint, value: Value) -> Result<Receipt, MarketError> {
    match value {
        Value::Object(object) if object.contains_key(Receipt::SUCCESS_KEY) => {
            Ok(Receipt::from_object(&object))
        }
        Value::Object(object) => Err(MarketError::Rejected(ErrorBody::from_object(&object))),
        other => Err(MarketError::Decode {
            endpoint: endpoint.path(),
            reason: format!("expected object, got {}", other),
        }),
    }
}

/// Interpret a list-of-strings response.
pub fn parse_string_list(endpoint: Endpoint, value: Value) -> Result<Vec<String>, MarketError> {
    match value {
        Value::Object(object) => Err(MarketError::Rejected(ErrorBody::from_object(&object))),
        other => serde_json::from_value(other).map_err(|e| MarketError::Decode {
            endpoint: endpoint.path(),
            reason: e.to_string(),
        }),
    }
}

#[async_trait]
impl MarketApi for CodeMarketClient {
    #[instrument(skip(self))]
    async fn register_vendor(
        &self,
        vendor_name: &str,
        vendor_url: Option<&str>,
    ) -> Result<String, MarketError> {
        let form = Registration {
            vendor_name: vendor_name.to_string(),
            vendor_url: vendor_url.unwrap_or_default().to_string(),
        };
        let value = self.call(Endpoint::Register, Some(&form)).await?;
        parse_registration(value)
    }

    #[instrument(skip_all)]
    async fn get_ledger_state(&self, uuid: &str) -> Result<LedgerState, MarketError> {
        let form = UuidForm {
            uuid: uuid.to_string(),
        };
        let value = self.call(Endpoint::LedgerState, Some(&form)).await?;
        parse_ledger_state(value)
    }

    #[instrument(skip_all, fields(item = %request.item, quantity = request.quantity))]
    async fn stock(&self, request: &StockRequest) -> Result<Receipt, MarketError> {
        let value = self.call(Endpoint::Stock, Some(request)).await?;
        parse_receipt(Endpoint::Stock, value)
    }

    #[instrument(skip(self))]
    async fn get_vendor_names(&self) -> Result<Vec<String>, MarketError> {
        let value = self.call::<()>(Endpoint::VendorNames, None).await?;
        parse_string_list(Endpoint::VendorNames, value)
    }

    #[instrument(skip(self))]
    async fn get_vendor_urls(&self) -> Result<Vec<String>, MarketError> {
        let value = self.call::<()>(Endpoint::VendorUrls, None).await?;
        parse_string_list(Endpoint::VendorUrls, value)
    }

    #[instrument(skip_all, fields(item = %order.item, count = order.count, from = %order.from))]
    async fn purchase(&self, order: &PurchaseOrder) -> Result<Receipt, MarketError> {
        let value = self.call(Endpoint::Purchase, Some(order)).await?;
        parse_receipt(Endpoint::Purchase, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_creation_works() {
        let client = CodeMarketClient::new("http://localhost:8000").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/");
        assert_eq!(
            client.endpoint_url(Endpoint::Stock).unwrap().as_str(),
            "http://localhost:8000/api/stock"
        );
    }

    #[test]
    fn base_path_prefixes_every_endpoint() {
        for base in ["http://localhost:8000/market", "http://localhost:8000/market/"] {
            let client = CodeMarketClient::new(base).unwrap();
            assert_eq!(client.base_url().as_str(), "http://localhost:8000/market/");
            assert_eq!(
                client.endpoint_url(Endpoint::Stock).unwrap().as_str(),
                "http://localhost:8000/market/api/stock"
            );
            assert_eq!(
                client.endpoint_url(Endpoint::Register).unwrap().as_str(),
                "http://localhost:8000/market/register"
            );
        }
    }

    #[test]
    fn client_rejects_invalid_base_url() {
        assert!(matches!(
            CodeMarketClient::new("localhost without scheme"),
            Err(MarketError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn from_config_applies_base_url() {
        let config = Config {
            codemarket_url: "http://[::1]:8000".to_string(),
            http_timeout_ms: Some(500),
            ..Config::default()
        };
        let client = CodeMarketClient::from_config(&config).unwrap();
        assert_eq!(
            client.endpoint_url(Endpoint::Register).unwrap().as_str(),
            "http://[::1]:8000/register"
        );
    }

    #[test]
    fn registration_parsing() {
        assert_eq!(parse_registration(json!({"uuid": "abc-1"})).unwrap(), "abc-1");

        let err = parse_registration(json!({"vendor_name": "is in use"})).unwrap_err();
        match err {
            MarketError::Rejected(body) => assert_eq!(body.get("vendor_name"), Some("is in use")),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            parse_registration(json!({})),
            Err(MarketError::MissingUuid)
        ));
        assert!(matches!(
            parse_registration(json!(["abc"])),
            Err(MarketError::Decode { .. })
        ));
    }

    #[test]
    fn ledger_parsing_detects_error_bodies() {
        let err = parse_ledger_state(json!({"error": "vendor not found"})).unwrap_err();
        assert!(err.is_terminal());

        let err = parse_ledger_state(json!({"UUID": "not found"})).unwrap_err();
        assert!(matches!(err, MarketError::Rejected(_)));
        assert!(!err.is_terminal());

        let ledger = parse_ledger_state(json!({"stored": [["u8"], [], [4]]})).unwrap();
        assert_eq!(ledger.stored().unwrap().count(0), 4);

        assert!(matches!(
            parse_ledger_state(json!({"stored": [1, 2]})),
            Err(MarketError::Decode { .. })
        ));
    }

    #[test]
    fn receipt_and_list_parsing() {
        let receipt = parse_receipt(Endpoint::Stock, json!({"success": "true"})).unwrap();
        assert!(receipt.success());

        let err = parse_receipt(Endpoint::Purchase, json!({"seller": "not found"})).unwrap_err();
        assert!(matches!(err, MarketError::Rejected(_)));

        let names = parse_string_list(Endpoint::VendorNames, json!(["a", "b"])).unwrap();
        assert_eq!(names, vec!["a", "b"]);
        assert!(parse_string_list(Endpoint::VendorUrls, json!([1])).is_err());
    }
}
