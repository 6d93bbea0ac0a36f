//! HTTP client tests against a local stub CodeMarket server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;

use codemarket_bot::bot::{RecordingTimer, RunOutcome, TradingBot};
use codemarket_bot::error::MarketError;
use codemarket_bot::market::{CodeMarketClient, MarketApi, PurchaseOrder, StockRequest};

type FormData = HashMap<String, String>;

#[derive(Clone, Default)]
struct Stub {
    requests: Arc<Mutex<Vec<(&'static str, FormData)>>>,
    ledger_calls: Arc<AtomicUsize>,
}

impl Stub {
    fn record(&self, path: &'static str, form: FormData) {
        self.requests.lock().unwrap().push((path, form));
    }

    fn requests(&self) -> Vec<(&'static str, FormData)> {
        self.requests.lock().unwrap().clone()
    }
}

async fn register(State(stub): State<Stub>, Form(form): Form<FormData>) -> Json<Value> {
    stub.record("register", form.clone());
    match form.get("vendor_name").map(String::as_str) {
        Some("4217") => Json(json!({ "uuid": "abc-1" })),
        Some("") | None => Json(json!({ "vendor_name": "is empty" })),
        Some(_) => Json(json!({ "vendor_name": "is in use" })),
    }
}

async fn ledger_state(State(stub): State<Stub>, Form(form): Form<FormData>) -> impl IntoResponse {
    stub.record("ledger_state", form);
    if stub.ledger_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        (
            StatusCode::OK,
            Json(json!({
                "4217": [["apple", "banana"], [1.0, 2.0], [3, 0]],
                "stored": [["apple", "banana"], [], [5, 2]],
            })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "vendor not found" })),
        )
    }
}

async fn stock(State(stub): State<Stub>, Form(form): Form<FormData>) -> Json<Value> {
    stub.record("stock", form.clone());
    if form.get("name").map(String::as_str) == Some("bad") {
        Json(json!({ "item": "not found" }))
    } else {
        Json(json!({ "success": "true" }))
    }
}

async fn vendor_names() -> Json<Value> {
    Json(json!(["4217", "Rotund Dealer"]))
}

async fn vendor_urls() -> Json<Value> {
    Json(json!(["4217", "rotund_dealer"]))
}

async fn purchase(State(stub): State<Stub>, Form(form): Form<FormData>) -> impl IntoResponse {
    stub.record("purchase", form.clone());
    match form.get("from").map(String::as_str) {
        Some("Rotund Dealer") => Json(json!({
            "success": "true",
            "total": "2.5",
            "understock": "1",
        }))
        .into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
    }
}

async fn start_stub() -> (SocketAddr, Stub) {
    let stub = Stub::default();
    let app = Router::new()
        .route("/register", post(register))
        .route("/api/ledger_state", post(ledger_state))
        .route("/api/stock", post(stock))
        .route("/api/vendor_names", get(vendor_names))
        .route("/api/vendor_urls", get(vendor_urls))
        .route("/api/purchase", post(purchase))
        .with_state(stub.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, stub)
}

fn client_for(addr: SocketAddr) -> CodeMarketClient {
    CodeMarketClient::new(&format!("http://{}", addr)).unwrap()
}

#[tokio::test]
async fn bot_runs_against_http_server_until_ledger_error() {
    let (addr, stub) = start_stub().await;
    let timer = RecordingTimer::new();
    let mut bot = TradingBot::with_timer(client_for(addr), timer.clone()).with_seed(17);
    let (_tx, rx) = watch::channel(false);

    let (vendor, outcome) = bot
        .register_and_run(Some("4217".into()), rx)
        .await
        .unwrap();

    assert_eq!(vendor.uuid, "abc-1");
    match outcome {
        RunOutcome::MarketError { reason, iterations } => {
            assert_eq!(iterations, 1);
            assert_eq!(reason.get("error"), Some("vendor not found"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let requests = stub.requests();
    let paths: Vec<_> = requests.iter().map(|(p, _)| *p).collect();
    assert_eq!(paths, vec!["register", "ledger_state", "stock", "ledger_state"]);

    assert_eq!(requests[0].1["vendor_name"], "4217");
    assert_eq!(requests[0].1["vendor_url"], "");
    for (_, form) in &requests[1..] {
        assert_eq!(form["uuid"], "abc-1");
    }

    let stock_form = &requests[2].1;
    let item = stock_form["name"].as_str();
    let quantity: i64 = stock_form["stock"].parse().unwrap();
    let price: f64 = stock_form["price"].parse().unwrap();
    match item {
        "apple" => assert!((0..5).contains(&quantity)),
        "banana" => assert!((0..2).contains(&quantity)),
        other => panic!("unexpected item {other}"),
    }
    assert!((0.0..1.0).contains(&price));
    assert_eq!(timer.sleeps().len(), 1);
}

#[tokio::test]
async fn registration_errors_are_rejections() {
    let (addr, _) = start_stub().await;
    let client = client_for(addr);

    let err = client.register_vendor("someone", None).await.unwrap_err();
    match err {
        MarketError::Rejected(body) => assert_eq!(body.get("vendor_name"), Some("is in use")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn stock_rejection_carries_the_error_body() {
    let (addr, _) = start_stub().await;
    let client = client_for(addr);

    let ok = client
        .stock(&StockRequest {
            item: "apple".into(),
            price: 0.25,
            quantity: -3,
            uuid: "abc-1".into(),
        })
        .await
        .unwrap();
    assert!(ok.success());

    let err = client
        .stock(&StockRequest {
            item: "bad".into(),
            price: 0.25,
            quantity: 1,
            uuid: "abc-1".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Rejected(ref b) if b.get("item") == Some("not found")));
}

#[tokio::test]
async fn vendor_listings_are_parsed() {
    let (addr, _) = start_stub().await;
    let client = client_for(addr);

    assert_eq!(
        client.get_vendor_names().await.unwrap(),
        vec!["4217", "Rotund Dealer"]
    );
    assert_eq!(
        client.get_vendor_urls().await.unwrap(),
        vec!["4217", "rotund_dealer"]
    );
}

#[tokio::test]
async fn purchase_receipt_and_plain_text_failures() {
    let (addr, stub) = start_stub().await;
    let client = client_for(addr);

    let receipt = client
        .purchase(&PurchaseOrder {
            item: "u8".into(),
            count: 3,
            from: "Rotund Dealer".into(),
            buyer_uuid: "abc-1".into(),
        })
        .await
        .unwrap();
    assert!(receipt.success());
    assert_eq!(receipt.total(), Some(2.5));
    assert_eq!(receipt.understock(), Some(1));

    let sent = &stub.requests()[0].1;
    assert_eq!(sent["item"], "u8");
    assert_eq!(sent["count"], "3");
    assert_eq!(sent["to"], "abc-1");

    let err = client
        .purchase(&PurchaseOrder {
            item: "u8".into(),
            count: 1,
            from: "nobody".into(),
            buyer_uuid: "abc-1".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Status { status: 500, .. }));
}

#[tokio::test]
async fn connection_refused_is_an_http_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client_for(addr).get_vendor_names().await.unwrap_err();
    assert!(matches!(err, MarketError::Http(_)));
}
