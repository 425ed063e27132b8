//! IRON STREET checkout API
//!
//! 注文合計の算出（カタログ価格のみ）、決済プロバイダ注文の作成、
//! 決済署名の検証と注文保存を行う。

pub mod config;
pub mod db;
pub mod discount;
pub mod error;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod pricing;
pub mod provider;
pub mod signature;
pub mod store;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::provider::PaymentProvider;
use crate::store::{OrderLedger, PriceOracle, SqliteStore};

/// ハンドラ共有状態
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<AppConfig>,
    pub oracle: Arc<dyn PriceOracle>,
    pub ledger: Arc<dyn OrderLedger>,
    pub provider: Arc<dyn PaymentProvider>,
}

impl AppState {
    /// SQLite を Price Oracle / Order Ledger として使う構成
    pub fn new(db: DbPool, config: AppConfig, provider: Arc<dyn PaymentProvider>) -> Self {
        let store = Arc::new(SqliteStore::new(db.clone()));
        Self {
            db,
            config: Arc::new(config),
            oracle: store.clone(),
            ledger: store,
            provider,
        }
    }
}

/// ルーター構築
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.config.cors_allow_origin.as_deref());

    Router::new()
        .route("/", get(handlers::banner))
        .route("/api/health", get(handlers::health_check))
        .route("/api/products", get(handlers::products::list_products))
        .route("/api/products/:product_id", get(handlers::products::get_product))
        .route("/api/payments/create-order", post(handlers::payments::create_order))
        .route("/api/payments/verify-payment", post(handlers::payments::verify_payment))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let Some(origin) = allow_origin else {
        return CorsLayer::permissive();
    };

    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!("Invalid CORS_ALLOW_ORIGIN {:?}, falling back to permissive", origin);
            CorsLayer::permissive()
        }
    }
}
