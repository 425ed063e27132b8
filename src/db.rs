//! Database Module
//! SQLite を使用した products/payment_orders/orders の管理

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tokio::fs;
use tracing::info;

use crate::models::CatalogSeedEntry;

/// データベース接続プール
pub type DbPool = Pool<Sqlite>;

/// データベースを初期化
pub async fn init_db(db_url: &str, max_connections: u32) -> Result<DbPool> {
    info!("Initializing database: {}", db_url);

    if let Some(parent) = sqlite_file_parent(db_url) {
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .with_context(|| format!("failed to connect to {}", db_url))?;

    // スキーマ作成
    create_schema(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// `sqlite:data/x.db?mode=rwc` → `data`（メモリDBは None）
fn sqlite_file_parent(db_url: &str) -> Option<PathBuf> {
    let path = db_url.strip_prefix("sqlite://").or_else(|| db_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// スキーマ作成
async fn create_schema(pool: &DbPool) -> Result<()> {
    // products テーブル（Price Oracle）
    // price は TEXT のまま保持し、読み出し側で Decimal に変換する
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT,
            price TEXT,
            old_price TEXT,
            image_url TEXT,
            badge_text TEXT,
            is_featured INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at_ms INTEGER,
            updated_at_ms INTEGER
        )
    "#)
    .execute(pool)
    .await?;

    // payment_orders テーブル（プロバイダ注文の控え）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS payment_orders (
            provider_order_id TEXT PRIMARY KEY,
            receipt_id TEXT NOT NULL,
            amount_minor INTEGER NOT NULL,
            currency TEXT NOT NULL DEFAULT 'INR',
            notes TEXT NOT NULL DEFAULT '{}',
            created_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // orders テーブル（署名検証済みの注文のみ）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            user_id TEXT,
            cart_items TEXT NOT NULL,
            total_amount TEXT NOT NULL,
            shipping_address TEXT NOT NULL,
            contact_info TEXT NOT NULL,
            provider_order_id TEXT NOT NULL,
            provider_payment_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'paid',
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // 同一 payment_id の二重登録防止
    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_payment_id ON orders(provider_payment_id)")
        .execute(pool).await?;

    // インデックス作成
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_provider_order ON orders(provider_order_id)")
        .execute(pool).await?;

    Ok(())
}

/// カタログ JSON を products に取り込む（既存 id は上書き）
pub async fn seed_catalog(pool: &DbPool, path: &Path) -> Result<usize> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let entries: Vec<CatalogSeedEntry> = serde_json::from_str(&content)
        .with_context(|| format!("invalid catalog json {}", path.display()))?;

    let count = upsert_products(pool, &entries).await?;
    info!("Catalog seeded: {} products from {}", count, path.display());
    Ok(count)
}

/// products へ upsert
pub async fn upsert_products(pool: &DbPool, entries: &[CatalogSeedEntry]) -> Result<usize> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut tx = pool.begin().await?;

    for entry in entries {
        sqlx::query(r#"
            INSERT INTO products (
                id, name, category, price, old_price, image_url, badge_text,
                is_featured, is_active, created_at_ms, updated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                price = excluded.price,
                old_price = excluded.old_price,
                image_url = excluded.image_url,
                badge_text = excluded.badge_text,
                is_featured = excluded.is_featured,
                is_active = 1,
                updated_at_ms = excluded.updated_at_ms
        "#)
        .bind(entry.id.normalized())
        .bind(&entry.name)
        .bind(&entry.category)
        .bind(entry.price.map(|p| p.to_string()))
        .bind(entry.old_price.map(|p| p.to_string()))
        .bind(&entry.image_url)
        .bind(&entry.badge_text)
        .bind(i32::from(entry.is_featured))
        .bind(now_ms)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(entries.len())
}
