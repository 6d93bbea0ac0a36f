//! Bot module.
//!
//! This module handles:
//! - Random rebalancing decisions
//! - The register/poll/stock loop
//! - The sleep abstraction the loop waits on

pub mod runner;
pub mod strategy;
pub mod timer;

pub use runner::{
    BotStats, RunOutcome, SharedStats, StepOutcome, TradingBot, DEFAULT_LOOP_INTERVAL,
    VENDOR_NAME_RANGE,
};
pub use strategy::{plan_rebalance, RebalancePlan};
pub use timer::{RecordingTimer, Timer, TokioTimer};
