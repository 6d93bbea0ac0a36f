//! The trading bot: register once, then poll-decide-stock-sleep until the
//! market reports an error or shutdown is requested.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};

use super::strategy::{plan_rebalance, RebalancePlan};
use super::timer::{Timer, TokioTimer};
use crate::error::{BotError, ErrorBody, MarketError};
use crate::market::{MarketApi, Vendor};
use crate::metrics;

/// Default pause between iterations.
pub const DEFAULT_LOOP_INTERVAL: Duration = Duration::from_secs(10);

/// Random vendor names are drawn from `[0, VENDOR_NAME_RANGE)`.
pub const VENDOR_NAME_RANGE: u32 = 100_000;

/// Running counters for one bot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BotStats {
    /// Registered vendor name.
    pub vendor: Option<String>,
    /// Completed loop iterations.
    pub iterations: u64,
    /// Stock requests accepted by the market.
    pub stock_requests: u64,
    /// Stock requests the market rejected.
    pub stock_rejections: u64,
    /// Iterations that had nothing to stock.
    pub skipped: u64,
    /// Item moved in the latest iteration.
    pub last_item: Option<String>,
    /// Quantity moved in the latest iteration.
    pub last_quantity: Option<u32>,
    /// When the last iteration finished.
    #[serde(skip)]
    pub updated_at: Option<OffsetDateTime>,
}

/// Stats shared between the bot and the status API.
pub type SharedStats = Arc<RwLock<BotStats>>;

/// Result of a single iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A stock request was submitted for this plan.
    Stocked(RebalancePlan),
    /// The store pool was empty; nothing submitted.
    Skipped,
    /// The ledger reported its terminal `error`; nothing submitted.
    MarketError(ErrorBody),
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The ledger reported an error.
    MarketError {
        /// The ledger's error body.
        reason: ErrorBody,
        /// Iterations completed before the error.
        iterations: u64,
    },
    /// Shutdown was requested.
    Cancelled {
        /// Iterations completed before shutdown.
        iterations: u64,
    },
}

/// Randomized stock-rebalancing bot for a single vendor identity.
pub struct TradingBot<C, T = TokioTimer> {
    /// Market client.
    client: C,
    /// Sleeps between iterations.
    timer: T,
    /// Source of every random decision.
    rng: StdRng,
    /// Pause between iterations.
    interval: Duration,
    /// Url sent at registration.
    vendor_url: Option<String>,
    /// Counters shared with the status API.
    stats: SharedStats,
}

impl<C: MarketApi> TradingBot<C, TokioTimer> {
    /// Create a bot that sleeps on the tokio clock.
    pub fn new(client: C) -> Self {
        Self::with_timer(client, TokioTimer)
    }
}

impl<C: MarketApi, T: Timer> TradingBot<C, T> {
    /// Create a bot with a custom timer.
    pub fn with_timer(client: C, timer: T) -> Self {
        Self {
            client,
            timer,
            rng: StdRng::from_entropy(),
            interval: DEFAULT_LOOP_INTERVAL,
            vendor_url: None,
            stats: SharedStats::default(),
        }
    }

    /// Set the pause between iterations.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Seed the random source for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Set the url sent at registration.
    pub fn with_vendor_url(mut self, url: Option<String>) -> Self {
        self.vendor_url = url;
        self
    }

    /// Share stats with another component.
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    /// Handle to the shared stats.
    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    /// Get the market client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Draw a random vendor name. Collisions are left to the server.
    pub fn random_vendor_name(&mut self) -> String {
        self.rng.gen_range(0..VENDOR_NAME_RANGE).to_string()
    }

    /// Register with the market under `name`, or a random name when `None`.
    #[instrument(skip(self))]
    pub async fn register(&mut self, name: Option<String>) -> Result<Vendor, BotError> {
        let name = match name {
            Some(name) => name,
            None => self.random_vendor_name(),
        };

        let uuid = self
            .client
            .register_vendor(&name, self.vendor_url.as_deref())
            .await?;
        metrics::inc_registrations();

        info!(vendor = %name, "Registered vendor");
        self.stats.write().await.vendor = Some(name.clone());

        Ok(Vendor { name, uuid })
    }

    /// Run one iteration: fetch the ledger, plan, and submit a stock request.
    ///
    /// A rejected stock request is logged and counted; any other client
    /// failure is returned.
    #[instrument(skip_all, fields(vendor = %vendor.name))]
    pub async fn step(&mut self, vendor: &Vendor) -> Result<StepOutcome, BotError> {
        let _timer = metrics::timer_iteration();

        let ledger = match self.client.get_ledger_state(&vendor.uuid).await {
            Ok(ledger) => ledger,
            Err(MarketError::Rejected(body)) if body.is_terminal() => {
                return Ok(StepOutcome::MarketError(body));
            }
            Err(e) => return Err(e.into()),
        };
        metrics::inc_ledger_fetches();

        let own = ledger
            .vendor(&vendor.name)
            .ok_or_else(|| BotError::VendorMissing {
                name: vendor.name.clone(),
            })?;
        let store = ledger.stored().ok_or(BotError::StoreMissing)?;

        let Some(plan) = plan_rebalance(own, store, &mut self.rng) else {
            warn!("Store pool is empty, nothing to stock");
            metrics::inc_skipped_iterations();
            let mut stats = self.stats.write().await;
            stats.iterations += 1;
            stats.skipped += 1;
            stats.updated_at = Some(OffsetDateTime::now_utc());
            return Ok(StepOutcome::Skipped);
        };

        debug!(
            item = %plan.item,
            store = plan.store_count,
            own = plan.own_count,
            quantity = plan.quantity,
            price = plan.price,
            "Planned rebalance"
        );

        let accepted = match self.client.stock(&plan.to_request(&vendor.uuid)).await {
            Ok(receipt) => {
                debug!(success = receipt.success(), "Stock request acknowledged");
                metrics::inc_stock_requests();
                true
            }
            Err(MarketError::Rejected(body)) => {
                warn!(item = %plan.item, reason = %body, "Stock request rejected");
                metrics::inc_stock_rejections();
                false
            }
            Err(e) => return Err(e.into()),
        };

        let mut stats = self.stats.write().await;
        stats.iterations += 1;
        if accepted {
            stats.stock_requests += 1;
        } else {
            stats.stock_rejections += 1;
        }
        stats.last_item = Some(plan.item.clone());
        stats.last_quantity = Some(plan.quantity);
        stats.updated_at = Some(OffsetDateTime::now_utc());

        Ok(StepOutcome::Stocked(plan))
    }

    /// Loop until the ledger reports an error or `shutdown` flips to `true`.
    ///
    /// Shutdown is checked before every iteration and raced against the
    /// sleep, so no request is issued once it is observed.
    #[instrument(skip_all, fields(vendor = %vendor.name))]
    pub async fn run(
        &mut self,
        vendor: &Vendor,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunOutcome, BotError> {
        let mut iterations = 0u64;

        loop {
            let stop = *shutdown.borrow();
            if stop {
                info!(iterations, "Shutdown requested, stopping bot");
                return Ok(RunOutcome::Cancelled { iterations });
            }

            if let StepOutcome::MarketError(reason) = self.step(vendor).await? {
                info!(iterations, reason = %reason, "Market reported an error, stopping bot");
                return Ok(RunOutcome::MarketError { reason, iterations });
            }
            iterations += 1;

            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(iterations, "Shutdown requested, stopping bot");
                    return Ok(RunOutcome::Cancelled { iterations });
                }
                _ = self.timer.sleep(self.interval) => {}
            }
        }
    }

    /// Register, then run until the market reports an error or shutdown.
    pub async fn register_and_run(
        &mut self,
        name: Option<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Vendor, RunOutcome), BotError> {
        let vendor = self.register(name).await?;
        let outcome = self.run(&vendor, shutdown).await?;
        Ok((vendor, outcome))
    }
}

/// Resolves once the flag is `true`; never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
