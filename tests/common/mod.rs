/// Common test utilities and helpers
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::Value;
use tower::ServiceExt;

use ironstreet_checkout::config::{AppConfig, Environment};
use ironstreet_checkout::db::{init_db, upsert_products, DbPool};
use ironstreet_checkout::models::{CatalogSeedEntry, ExternalId};
use ironstreet_checkout::provider::MockProvider;
use ironstreet_checkout::{build_router, AppState};

pub const KEY_ID: &str = "rzp_test_key";
pub const SECRET: &str = "rzp_test_secret";

pub struct TestApp {
    pub router: Router,
    pub db: DbPool,
    pub provider: MockProvider,
}

/// Setup test application backed by an in-memory catalog: 42 = 500.00, 7 = 1200
pub async fn setup_test_app(environment: Environment) -> TestApp {
    let db = init_db("sqlite::memory:", 1).await.unwrap();

    let catalog = vec![
        seed_entry(ExternalId::from(42), "Rustic Coffee Table", dec!(500.00)),
        seed_entry(ExternalId::from("7"), "Bar Chair", dec!(1200)),
    ];
    upsert_products(&db, &catalog).await.unwrap();

    let config = AppConfig {
        razorpay_key_id: KEY_ID.to_string(),
        razorpay_key_secret: SECRET.to_string(),
        environment,
        ..AppConfig::default()
    };

    let provider = MockProvider::new();
    let state = Arc::new(AppState::new(db.clone(), config, Arc::new(provider.clone())));

    TestApp {
        router: build_router(state),
        db,
        provider,
    }
}

fn seed_entry(id: ExternalId, name: &str, price: rust_decimal::Decimal) -> CatalogSeedEntry {
    CatalogSeedEntry {
        id,
        name: name.to_string(),
        price: Some(price),
        old_price: None,
        image_url: None,
        category: Some("Table".to_string()),
        badge_text: None,
        is_featured: false,
    }
}

pub async fn post_json(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

pub async fn order_count(db: &DbPool) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
        .fetch_one(db)
        .await
        .unwrap();
    count
}
