//! In-memory CodeMarket for unit tests and dry runs.
//!
//! The mock keeps a small market of vendors and mirrors the server's
//! observable behavior: registration hands every vendor the configured
//! items in its store, the ledger exposes stocked catalogs plus the caller's
//! store pool, and stock/purchase requests move counts around. Every call is
//! recorded so tests can assert on exactly what the bot sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{ErrorBody, MarketError};

use super::client::MarketApi;
use super::types::{Catalog, LedgerState, PurchaseOrder, Receipt, StockRequest};

/// Items handed to every newly registered vendor.
pub const DEFAULT_ITEMS: &[&str] = &["bool", "u8", "u16", "u32", "i64", "char"];

/// Configuration for mock market behavior.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Item names every new vendor receives.
    pub items: Vec<String>,
    /// Initial store count per item.
    pub store_count: u32,
    /// Initial balance per vendor.
    pub initial_bits: f64,
    /// Report `{"error": ...}` once this many ledger fetches have succeeded.
    pub ledger_error_after: Option<usize>,
    /// Whether to reject every registration.
    pub fail_registration: bool,
    /// Whether to reject every stock request.
    pub fail_stock: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            items: DEFAULT_ITEMS.iter().map(|s| s.to_string()).collect(),
            store_count: 50,
            initial_bits: 1000.0,
            ledger_error_after: None,
            fail_registration: false,
            fail_stock: false,
            latency_ms: 0,
        }
    }
}

/// A request received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `register_vendor`.
    Register {
        /// Requested name.
        vendor_name: String,
        /// Requested url.
        vendor_url: Option<String>,
    },
    /// `get_ledger_state`.
    LedgerState {
        /// Caller uuid.
        uuid: String,
    },
    /// `stock`.
    Stock(StockRequest),
    /// `get_vendor_names`.
    VendorNames,
    /// `get_vendor_urls`.
    VendorUrls,
    /// `purchase`.
    Purchase(PurchaseOrder),
}

#[derive(Debug, Clone)]
struct MockItem {
    name: String,
    price: f64,
    stock: u32,
    stored: u32,
}

#[derive(Debug, Clone)]
struct MockVendor {
    name: String,
    url: String,
    uuid: String,
    bits: f64,
    items: Vec<MockItem>,
}

impl MockVendor {
    fn item_mut(&mut self, name: &str) -> Option<&mut MockItem> {
        self.items.iter_mut().find(|i| i.name == name)
    }

    fn stocked(&self) -> Catalog {
        Catalog {
            names: self.items.iter().map(|i| i.name.clone()).collect(),
            prices: self.items.iter().map(|i| i.price).collect(),
            counts: self.items.iter().map(|i| i.stock).collect(),
        }
    }

    fn stored(&self) -> Catalog {
        Catalog {
            names: self.items.iter().map(|i| i.name.clone()).collect(),
            prices: Vec::new(),
            counts: self.items.iter().map(|i| i.stored).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    vendors: Vec<MockVendor>,
    calls: Vec<MockCall>,
    ledger_fetches: usize,
    next_id: u64,
    next_uuid: Option<String>,
    fixed_ledger: Option<LedgerState>,
}

impl MockState {
    fn vendor_by_uuid(&self, uuid: &str) -> Option<usize> {
        self.vendors.iter().position(|v| v.uuid == uuid)
    }
}

/// Mock CodeMarket client for testing.
#[derive(Debug, Clone)]
pub struct MockMarketClient {
    /// Mock configuration.
    config: MockConfig,
    /// Shared market state.
    state: Arc<Mutex<MockState>>,
}

impl MockMarketClient {
    /// Create a new mock market with default configuration.
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Create a mock market with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    /// Make the next registration return this uuid.
    pub fn set_next_uuid(&self, uuid: impl Into<String>) {
        self.state().next_uuid = Some(uuid.into());
    }

    /// Serve this ledger on every fetch instead of the simulated one.
    ///
    /// Stock requests are then acknowledged without touching any counts.
    pub fn set_ledger(&self, ledger: LedgerState) {
        self.state().fixed_ledger = Some(ledger);
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Stock requests received so far.
    pub fn stock_requests(&self) -> Vec<StockRequest> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Stock(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of ledger fetches received.
    pub fn ledger_fetches(&self) -> usize {
        self.state().ledger_fetches
    }

    /// A vendor's stocked catalog.
    pub fn stocked(&self, vendor_name: &str) -> Option<Catalog> {
        self.state()
            .vendors
            .iter()
            .find(|v| v.name == vendor_name)
            .map(MockVendor::stocked)
    }

    /// A vendor's store pool.
    pub fn stored(&self, vendor_name: &str) -> Option<Catalog> {
        self.state()
            .vendors
            .iter()
            .find(|v| v.name == vendor_name)
            .map(MockVendor::stored)
    }

    /// A vendor's remaining balance.
    pub fn bits(&self, vendor_name: &str) -> Option<f64> {
        self.state()
            .vendors
            .iter()
            .find(|v| v.name == vendor_name)
            .map(|v| v.bits)
    }
}

impl Default for MockMarketClient {
    fn default() -> Self {
        Self::new()
    }
}

fn success_receipt(fields: &[(&str, String)]) -> Receipt {
    let mut receipt = Receipt::default();
    receipt
        .fields
        .insert(Receipt::SUCCESS_KEY.to_string(), "true".to_string());
    for (k, v) in fields {
        receipt.fields.insert(k.to_string(), v.clone());
    }
    receipt
}

#[async_trait]
impl MarketApi for MockMarketClient {
    async fn register_vendor(
        &self,
        vendor_name: &str,
        vendor_url: Option<&str>,
    ) -> Result<String, MarketError> {
        self.simulate_latency().await;

        let mut state = self.state();
        state.calls.push(MockCall::Register {
            vendor_name: vendor_name.to_string(),
            vendor_url: vendor_url.map(str::to_string),
        });

        if self.config.fail_registration {
            return Err(MarketError::Rejected(ErrorBody::new(
                "error",
                "registration unsuccessful, aborting",
            )));
        }
        if vendor_name.is_empty() {
            return Err(MarketError::Rejected(ErrorBody::new("vendor_name", "is empty")));
        }

        let url = match vendor_url {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => vendor_name.to_lowercase().replace(' ', "_"),
        };
        if state
            .vendors
            .iter()
            .any(|v| v.name == vendor_name || v.url == url)
        {
            return Err(MarketError::Rejected(ErrorBody::new("vendor_name", "is in use")));
        }

        state.next_id += 1;
        let uuid = match state.next_uuid.take() {
            Some(uuid) => uuid,
            None => format!("mock-{:04}", state.next_id),
        };

        let items = self
            .config
            .items
            .iter()
            .map(|name| MockItem {
                name: name.clone(),
                price: 0.0,
                stock: 0,
                stored: self.config.store_count,
            })
            .collect();

        state.vendors.push(MockVendor {
            name: vendor_name.to_string(),
            url,
            uuid: uuid.clone(),
            bits: self.config.initial_bits,
            items,
        });

        Ok(uuid)
    }

    async fn get_ledger_state(&self, uuid: &str) -> Result<LedgerState, MarketError> {
        self.simulate_latency().await;

        let mut state = self.state();
        state.calls.push(MockCall::LedgerState {
            uuid: uuid.to_string(),
        });
        state.ledger_fetches += 1;

        if let Some(limit) = self.config.ledger_error_after {
            if state.ledger_fetches > limit {
                return Err(MarketError::Rejected(ErrorBody::new(
                    ErrorBody::ERROR_KEY,
                    "vendor not found",
                )));
            }
        }

        if let Some(ledger) = &state.fixed_ledger {
            return Ok(ledger.clone());
        }

        let index = state
            .vendor_by_uuid(uuid)
            .ok_or_else(|| MarketError::Rejected(ErrorBody::new("UUID", "not found")))?;

        let mut ledger = LedgerState::default();
        for vendor in &state.vendors {
            ledger
                .catalogs
                .insert(vendor.name.clone(), vendor.stocked());
        }
        ledger
            .catalogs
            .insert(LedgerState::STORED.to_string(), state.vendors[index].stored());

        Ok(ledger)
    }

    async fn stock(&self, request: &StockRequest) -> Result<Receipt, MarketError> {
        self.simulate_latency().await;

        let mut state = self.state();
        state.calls.push(MockCall::Stock(request.clone()));

        if self.config.fail_stock {
            return Err(MarketError::Rejected(ErrorBody::new("stock", "rejected")));
        }
        if state.fixed_ledger.is_some() {
            return Ok(success_receipt(&[]));
        }

        let index = state
            .vendor_by_uuid(&request.uuid)
            .ok_or_else(|| MarketError::Rejected(ErrorBody::new("uuid", "not found")))?;
        let item = state.vendors[index]
            .item_mut(&request.item)
            .ok_or_else(|| MarketError::Rejected(ErrorBody::new("item", "not found")))?;

        let wanted = request.quantity.unsigned_abs().min(u64::from(u32::MAX)) as u32;
        let moved = if request.quantity >= 0 {
            let moved = wanted.min(item.stored);
            item.stored -= moved;
            item.stock += moved;
            moved
        } else {
            let moved = wanted.min(item.stock);
            item.stock -= moved;
            item.stored += moved;
            moved
        };
        item.price = request.price;

        Ok(success_receipt(&[("moved", moved.to_string())]))
    }

    async fn get_vendor_names(&self) -> Result<Vec<String>, MarketError> {
        self.simulate_latency().await;

        let mut state = self.state();
        state.calls.push(MockCall::VendorNames);
        Ok(state.vendors.iter().map(|v| v.name.clone()).collect())
    }

    async fn get_vendor_urls(&self) -> Result<Vec<String>, MarketError> {
        self.simulate_latency().await;

        let mut state = self.state();
        state.calls.push(MockCall::VendorUrls);
        Ok(state.vendors.iter().map(|v| v.url.clone()).collect())
    }

    async fn purchase(&self, order: &PurchaseOrder) -> Result<Receipt, MarketError> {
        self.simulate_latency().await;

        let mut state = self.state();
        state.calls.push(MockCall::Purchase(order.clone()));

        let buyer = state.vendor_by_uuid(&order.buyer_uuid);
        let seller = state.vendors.iter().position(|v| v.name == order.from);
        let (buyer, seller) = match (buyer, seller) {
            (Some(b), Some(s)) => (b, s),
            (b, s) => {
                let mut body = ErrorBody::default();
                if s.is_none() {
                    body.fields.insert("seller".into(), "not found".into());
                }
                if b.is_none() {
                    body.fields.insert("buyer".into(), "not found".into());
                }
                return Err(MarketError::Rejected(body));
            }
        };

        let (price, on_hand) = match state.vendors[seller]
            .items
            .iter()
            .find(|i| i.name == order.item)
        {
            Some(item) if item.stock == 0 => {
                return Err(MarketError::Rejected(ErrorBody::new("item", "out of stock")))
            }
            Some(item) => (item.price, item.stock),
            None => {
                return Err(MarketError::Rejected(ErrorBody::new(
                    "item",
                    "not found at seller",
                )))
            }
        };

        let total = price * f64::from(order.count);
        if total > state.vendors[buyer].bits {
            return Err(MarketError::Rejected(ErrorBody::new(
                "buyer",
                "cannot afford the purchase",
            )));
        }

        let sold = order.count.min(on_hand);
        let understock = order.count - sold;

        if let Some(item) = state.vendors[seller].item_mut(&order.item) {
            item.stock -= sold;
        }
        let seller_name = state.vendors[seller].name.clone();
        let buyer_vendor = &mut state.vendors[buyer];
        buyer_vendor.bits -= f64::from(sold) * price;
        match buyer_vendor.item_mut(&order.item) {
            Some(item) => item.stock += sold,
            None => buyer_vendor.items.push(MockItem {
                name: order.item.clone(),
                price,
                stock: sold,
                stored: 0,
            }),
        }
        let buyer_name = buyer_vendor.name.clone();

        Ok(success_receipt(&[
            ("total", total.to_string()),
            ("understock", understock.to_string()),
            ("seller", seller_name),
            ("buyer", buyer_name),
        ]))
    }
}
