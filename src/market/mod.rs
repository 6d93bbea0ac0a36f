//! Market module for the CodeMarket server.
//!
//! This module handles:
//! - Wire and domain types (ledger state, catalogs, requests, receipts)
//! - The `MarketApi` client interface and its HTTP implementation
//! - An in-memory market for tests and dry runs

pub mod client;
pub mod mock;
pub mod types;

pub use client::{CodeMarketClient, MarketApi};
pub use mock::{MockCall, MockConfig, MockMarketClient};
pub use types::{
    Catalog, Endpoint, LedgerState, PurchaseOrder, Receipt, StockRequest, Vendor,
};
