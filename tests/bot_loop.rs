//! Bot loop behavior against the in-memory market.

use std::time::Duration;

use codemarket_bot::bot::{RecordingTimer, RunOutcome, TradingBot};
use codemarket_bot::market::{MarketApi, MockCall, MockConfig, MockMarketClient};
use pretty_assertions::assert_eq;
use tokio::sync::watch;

const TIMEOUT: Duration = Duration::from_secs(5);

fn mock_with_error_after(fetches: usize) -> MockMarketClient {
    MockMarketClient::with_config(MockConfig {
        ledger_error_after: Some(fetches),
        ..Default::default()
    })
}

#[tokio::test]
async fn uuid_is_the_only_credential_after_registration() {
    let client = mock_with_error_after(5);
    client.set_next_uuid("abc-1");
    let timer = RecordingTimer::new();
    let mut bot = TradingBot::with_timer(client.clone(), timer.clone()).with_seed(11);
    let (_tx, rx) = watch::channel(false);

    let (vendor, outcome) = bot
        .register_and_run(Some("4217".into()), rx)
        .await
        .unwrap();
    assert_eq!(vendor.uuid, "abc-1");

    for call in client.calls().iter().skip(1) {
        match call {
            MockCall::LedgerState { uuid } => assert_eq!(uuid, "abc-1"),
            MockCall::Stock(request) => assert_eq!(request.uuid, "abc-1"),
            other => panic!("unexpected call: {other:?}"),
        }
    }

    match outcome {
        RunOutcome::MarketError { reason, iterations } => {
            assert_eq!(iterations, 5);
            assert_eq!(reason.get("error"), Some("vendor not found"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(timer.sleeps().len(), 5);
}

#[tokio::test]
async fn ledger_error_stops_before_any_stock() {
    let client = mock_with_error_after(0);
    let mut bot = TradingBot::with_timer(client.clone(), RecordingTimer::new());
    let (_tx, rx) = watch::channel(false);

    let (_, outcome) = bot.register_and_run(None, rx).await.unwrap();

    assert!(matches!(outcome, RunOutcome::MarketError { iterations: 0, .. }));
    assert!(client.stock_requests().is_empty());
    assert!(matches!(client.calls().last(), Some(MockCall::LedgerState { .. })));
    assert_eq!(client.ledger_fetches(), 1);
}

#[tokio::test]
async fn unknown_uuid_is_an_error() {
    let client = MockMarketClient::new();
    let mut bot = TradingBot::with_timer(client.clone(), RecordingTimer::new());
    let vendor = codemarket_bot::market::Vendor {
        name: "ghost".into(),
        uuid: "nope".into(),
    };
    let (_tx, rx) = watch::channel(false);

    let err = bot.run(&vendor, rx).await.unwrap_err();
    assert!(err.to_string().contains("UUID"));
    assert!(client.stock_requests().is_empty());
}

#[tokio::test]
async fn rebalancing_conserves_items() {
    let client = mock_with_error_after(40);
    let mut bot = TradingBot::with_timer(client.clone(), RecordingTimer::new()).with_seed(3);
    let (_tx, rx) = watch::channel(false);

    let (vendor, _) = bot.register_and_run(None, rx).await.unwrap();

    let stocked = client.stocked(&vendor.name).unwrap();
    let stored = client.stored(&vendor.name).unwrap();
    for i in 0..stored.len() {
        assert_eq!(stocked.count(i) + stored.count(i), 50);
    }
    assert!(stocked.counts.iter().any(|&c| c > 0), "nothing was stocked");
    assert_eq!(bot.stats().read().await.iterations, 40);
}

#[tokio::test]
async fn cancellation_before_start_sends_nothing() {
    let client = MockMarketClient::new();
    let mut bot = TradingBot::with_timer(client.clone(), RecordingTimer::new());
    let vendor = bot.register(Some("4217".into())).await.unwrap();

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let outcome = bot.run(&vendor, rx).await.unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled { iterations: 0 });
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn cancellation_interrupts_sleep() {
    let client = MockMarketClient::new();
    let mut bot = TradingBot::new(client.clone())
        .with_interval(Duration::from_secs(3600))
        .with_seed(21);
    let vendor = bot.register(None).await.unwrap();

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(async move { bot.run(&vendor, rx).await });

    tokio::time::timeout(TIMEOUT, async {
        while client.stock_requests().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tx.send(true).unwrap();
    let outcome = tokio::time::timeout(TIMEOUT, task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(outcome, RunOutcome::Cancelled { iterations: 1 });
    assert_eq!(client.ledger_fetches(), 1);
    assert_eq!(client.stock_requests().len(), 1);
}

#[tokio::test]
async fn dropped_sender_does_not_cancel() {
    let client = mock_with_error_after(2);
    let mut bot = TradingBot::with_timer(client.clone(), RecordingTimer::new());
    let (tx, rx) = watch::channel(false);
    drop(tx);

    let (_, outcome) = bot.register_and_run(None, rx).await.unwrap();
    assert!(matches!(outcome, RunOutcome::MarketError { iterations: 2, .. }));
}

#[tokio::test]
async fn other_vendors_are_visible() {
    let client = MockMarketClient::new();
    client.register_vendor("neighbor", Some("shop")).await.unwrap();

    let mut bot = TradingBot::with_timer(client.clone(), RecordingTimer::new());
    let vendor = bot.register(Some("4217".into())).await.unwrap();

    let ledger = client.get_ledger_state(&vendor.uuid).await.unwrap();
    assert_eq!(ledger.vendor_names(), vec!["4217", "neighbor"]);
    assert_eq!(
        client.get_vendor_urls().await.unwrap(),
        vec!["shop".to_string(), "4217".to_string()]
    );
}
