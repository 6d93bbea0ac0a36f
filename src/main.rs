//! CodeMarket trading bot entry point.

use std::net::SocketAddr;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use codemarket_bot::api::{serve, AppState};
use codemarket_bot::bot::{RunOutcome, TradingBot};
use codemarket_bot::config::Config;
use codemarket_bot::market::{
    CodeMarketClient, MarketApi, MockMarketClient, PurchaseOrder, StockRequest,
};
use codemarket_bot::metrics;
use codemarket_bot::utils::shutdown_channel;

/// Randomized stock-rebalancing bot for the CodeMarket simulator.
#[derive(Parser, Debug)]
#[command(name = "codemarket-bot")]
#[command(about = "Registers a vendor on a CodeMarket server and rebalances its stock at random")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(ClapArgs, Debug, Default, Clone)]
struct RunArgs {
    /// Trade against an in-memory market instead of the server.
    #[arg(long)]
    dry_run: Option<bool>,

    /// HTTP server port for health/status/metrics.
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds between iterations.
    #[arg(long)]
    interval: Option<u64>,

    /// Vendor name to register (random when unset).
    #[arg(long)]
    name: Option<String>,

    /// Vendor url to register.
    #[arg(long)]
    url: Option<String>,

    /// Seed for reproducible decisions.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register and run the bot loop (default).
    Run(RunArgs),

    /// Check configuration validity.
    CheckConfig,

    /// Register a vendor and print its UUID.
    Register {
        /// Vendor name.
        name: String,
        /// Vendor url.
        #[arg(long)]
        url: Option<String>,
    },

    /// Print the ledger as seen by a vendor.
    Ledger {
        /// Vendor UUID.
        uuid: String,
    },

    /// List registered vendor names and urls.
    Vendors,

    /// Move items between a vendor's store and stock.
    Stock {
        /// Vendor UUID.
        uuid: String,
        /// Item name.
        item: String,
        /// New price.
        price: f64,
        /// Quantity to stock; negative returns items to the store.
        #[arg(allow_hyphen_values = true)]
        quantity: i64,
    },

    /// Buy items from another vendor.
    Purchase {
        /// Buyer UUID.
        uuid: String,
        /// Seller vendor name.
        from: String,
        /// Item name.
        item: String,
        /// Number of items.
        count: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load errors are reported again by the command itself.
    let directive = Config::load()
        .unwrap_or_default()
        .log_directive(args.verbose);
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Run(run)) => cmd_run(run).await,
        Some(Command::Register { name, url }) => cmd_register(name, url).await,
        Some(Command::Ledger { uuid }) => cmd_ledger(uuid).await,
        Some(Command::Vendors) => cmd_vendors().await,
        Some(Command::Stock {
            uuid,
            item,
            price,
            quantity,
        }) => {
            cmd_stock(StockRequest {
                item,
                price,
                quantity,
                uuid,
            })
            .await
        }
        Some(Command::Purchase {
            uuid,
            from,
            item,
            count,
        }) => {
            cmd_purchase(PurchaseOrder {
                item,
                count,
                from,
                buyer_uuid: uuid,
            })
            .await
        }
        None => cmd_run(args.run).await,
    }
}

/// Client for one-shot commands.
fn market_client() -> anyhow::Result<CodeMarketClient> {
    let config = Config::load_validated().map_err(|e| {
        error!("{}", e);
        e
    })?;
    Ok(CodeMarketClient::from_config(&config)?)
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("CODEMARKET BOT - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Market URL: {}", config.codemarket_url);
    println!(
        "  Vendor Name: {}",
        config.vendor_name.as_deref().unwrap_or("(random)")
    );
    println!(
        "  Vendor URL: {}",
        config.vendor_url.as_deref().unwrap_or("(derived by server)")
    );
    println!("  Loop Interval: {}s", config.loop_interval_secs);
    match config.http_timeout_ms {
        Some(ms) => println!("  Request Timeout: {}ms", ms),
        None => println!("  Request Timeout: none"),
    }
    println!("  Dry Run: {}", config.dry_run);
    println!("  Status Port: {}", config.port);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Register and run the bot until the market reports an error or shutdown.
async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(dry_run) = args.dry_run {
        config.dry_run = dry_run;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(interval) = args.interval {
        config.loop_interval_secs = interval;
    }
    if args.name.is_some() {
        config.vendor_name = args.name;
    }
    if args.url.is_some() {
        config.vendor_url = args.url;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!("Configuration loaded successfully");
    info!(
        "Mode: {}",
        if config.dry_run { "SIMULATION" } else { "LIVE" }
    );
    info!("Market: {}", config.codemarket_url);
    info!("Loop interval: {}s", config.loop_interval_secs);

    if config.dry_run {
        run_bot(MockMarketClient::new(), &config, args.seed).await
    } else {
        let client = CodeMarketClient::from_config(&config)?;
        run_bot(client, &config, args.seed).await
    }
}

async fn run_bot<C: MarketApi>(client: C, config: &Config, seed: Option<u64>) -> anyhow::Result<()> {
    let app_state = AppState::new().with_prometheus(metrics::install_prometheus());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let (addr, _server_handle) = serve(app_state.clone(), addr).await?;
    info!("HTTP server listening on {}", addr);

    let mut bot = TradingBot::new(client)
        .with_interval(config.loop_interval())
        .with_vendor_url(config.vendor_url.clone())
        .with_stats(app_state.stats.clone());
    if let Some(seed) = seed {
        bot = bot.with_seed(seed);
    }

    let vendor = bot.register(config.vendor_name.clone()).await.map_err(|e| {
        error!("Registration failed: {}", e);
        e
    })?;
    app_state.set_ready(true);

    info!("========================================");
    info!("CODEMARKET BOT STARTED");
    info!("========================================");
    info!("Vendor: {}", vendor.name);
    info!("UUID: {}", vendor.uuid);
    info!("========================================");

    let (_shutdown_tx, shutdown_rx) = shutdown_channel();
    let outcome = bot.run(&vendor, shutdown_rx).await;
    app_state.set_ready(false);

    match outcome? {
        RunOutcome::MarketError { reason, iterations } => {
            warn!(iterations, "Market reported an error: {}", reason);
        }
        RunOutcome::Cancelled { iterations } => {
            info!(iterations, "Bot stopped");
        }
    }

    let stats = bot.stats().read().await.clone();
    info!(
        "Final stats: {} iterations, {} stocked, {} rejected, {} skipped",
        stats.iterations, stats.stock_requests, stats.stock_rejections, stats.skipped
    );

    Ok(())
}

/// Register a vendor and print its UUID.
async fn cmd_register(name: String, url: Option<String>) -> anyhow::Result<()> {
    let client = market_client()?;
    let uuid = client.register_vendor(&name, url.as_deref()).await?;
    metrics::inc_registrations();
    println!("{}", uuid);
    Ok(())
}

/// Print the ledger as seen by a vendor.
async fn cmd_ledger(uuid: String) -> anyhow::Result<()> {
    let client = market_client()?;
    let ledger = client.get_ledger_state(&uuid).await?;

    for name in ledger.vendor_names() {
        println!("{}", name);
        if let Some(catalog) = ledger.vendor(name) {
            for item in catalog.items() {
                println!(
                    "  {:<12} count {:>5}  price {}",
                    item.name,
                    item.count,
                    item.price.map_or_else(|| "-".to_string(), |p| format!("{:.4}", p))
                );
            }
        }
    }
    if let Some(stored) = ledger.stored() {
        println!("stored");
        for item in stored.items() {
            println!("  {:<12} count {:>5}", item.name, item.count);
        }
    }

    Ok(())
}

/// List registered vendor names and urls.
async fn cmd_vendors() -> anyhow::Result<()> {
    let client = market_client()?;
    let (names, urls) = tokio::try_join!(client.get_vendor_names(), client.get_vendor_urls())?;

    for (i, name) in names.iter().enumerate() {
        println!("{:<20} {}", name, urls.get(i).map(String::as_str).unwrap_or("-"));
    }

    Ok(())
}

/// Submit one stock request.
async fn cmd_stock(request: StockRequest) -> anyhow::Result<()> {
    let client = market_client()?;
    let receipt = client.stock(&request).await?;
    metrics::inc_stock_requests();
    for (k, v) in &receipt.fields {
        println!("{}: {}", k, v);
    }
    Ok(())
}

/// Buy items from another vendor.
async fn cmd_purchase(order: PurchaseOrder) -> anyhow::Result<()> {
    let client = market_client()?;
    let receipt = client.purchase(&order).await?;
    metrics::inc_purchases();

    println!("success: {}", receipt.success());
    if let Some(total) = receipt.total() {
        println!("total: {}", total);
    }
    if let Some(understock) = receipt.understock() {
        println!("understock: {}", understock);
    }

    Ok(())
}
