//! Randomized trading bot for the CodeMarket simulator.
//!
//! The bot registers a vendor with a CodeMarket server, then loops: it reads
//! the ledger, picks one item from its store pool at random, moves a random
//! quantity of it into stock at a fresh random price, and sleeps. The loop
//! ends when the ledger reports an error or shutdown is requested.
//!
//! ```text
//! store:  [5, 2]   own: [3, 0]
//! index 0 -> bound max(5, 3) = 5 -> quantity in [0, 5)
//! index 1 -> bound max(2, 0) = 2 -> quantity in [0, 2)
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: CodeMarket client, wire types and an in-memory market
//! - [`bot`]: Rebalancing decisions and the polling loop
//! - [`api`]: HTTP API for health/status/metrics
//! - [`metrics`]: Prometheus counters and latency histograms
//! - [`utils`]: Shutdown signal handling

pub mod api;
pub mod bot;
pub mod config;
pub mod error;
pub mod market;
pub mod metrics;
pub mod utils;

pub use bot::{RunOutcome, TradingBot};
pub use config::Config;
pub use error::{BotError, MarketError, Result};
