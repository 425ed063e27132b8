use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use ironstreet_checkout::config::AppConfig;
use ironstreet_checkout::db::{init_db, seed_catalog};
use ironstreet_checkout::provider::RazorpayClient;
use ironstreet_checkout::{build_router, AppState};

// ========================================
// メイン
// ========================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 設定（RAZORPAY_KEY_SECRET が無ければ起動しない）
    let config = AppConfig::from_env().context("failed to load configuration")?;
    info!("Configuration loaded: {:?}", config);

    // DB 初期化
    let db = init_db(&config.database_url, config.database_max_connections).await?;

    if let Some(path) = &config.catalog_seed_path {
        seed_catalog(&db, path).await?;
    }

    // 決済プロバイダ
    let provider = RazorpayClient::new(
        &config.razorpay_api_base,
        &config.razorpay_key_id,
        &config.razorpay_key_secret,
    )
    .context("failed to build payment provider client")?;

    let bind_addr = config.bind_addr.clone();
    let environment = config.environment;
    let state = Arc::new(AppState::new(db, config, Arc::new(provider)));

    // ルーター構築
    let app = build_router(state);

    info!("🚀 IRON STREET Checkout API listening on {}", bind_addr);
    info!("📦 Environment: {:?}", environment);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
