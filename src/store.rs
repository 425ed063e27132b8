//! Store Module
//! Price Oracle / Order Ledger のインターフェースと SQLite 実装

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::{order_status, NewOrder, PaymentOrder, PaymentOrderRecord, PriceRecord};

#[derive(Debug, Error)]
#[error("price lookup failed: {0}")]
pub struct OracleError(#[from] pub sqlx::Error);

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("DB error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to serialize order field: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 信頼できる単価の取得元
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// 指定 id の価格レコードを返す。存在しない id は単に結果に含まれない
    async fn fetch_prices(&self, product_ids: &[String]) -> Result<Vec<PriceRecord>, OracleError>;
}

/// 注文 insert の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerInsert {
    Created(String),
    /// 同じ provider_payment_id の注文が既にある
    Existing(String),
}

impl LedgerInsert {
    pub fn order_id(&self) -> &str {
        match self {
            LedgerInsert::Created(id) | LedgerInsert::Existing(id) => id,
        }
    }
}

/// 決済済み注文の保存先
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn record_payment_order(&self, order: &PaymentOrder) -> Result<(), LedgerError>;

    async fn find_payment_order(
        &self,
        provider_order_id: &str,
    ) -> Result<Option<PaymentOrderRecord>, LedgerError>;

    /// provider_payment_id 単位で一度だけ保存する
    async fn insert_paid_order(&self, order: &NewOrder) -> Result<LedgerInsert, LedgerError>;
}

// ========================================
// SQLite
// ========================================

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PriceOracle for SqliteStore {
    async fn fetch_prices(&self, product_ids: &[String]) -> Result<Vec<PriceRecord>, OracleError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        // CAST で REAL/INTEGER 列も TEXT として受け取る
        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, CAST(price AS TEXT) AS price FROM products WHERE is_active = 1 AND id IN (",
        );
        let mut separated = query.separated(", ");
        for id in product_ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let records = query
            .build_query_as::<PriceRecord>()
            .fetch_all(&self.db)
            .await?;
        Ok(records)
    }
}

#[async_trait]
impl OrderLedger for SqliteStore {
    async fn record_payment_order(&self, order: &PaymentOrder) -> Result<(), LedgerError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let notes = serde_json::to_string(&order.notes)?;

        sqlx::query(r#"
            INSERT INTO payment_orders (
                provider_order_id, receipt_id, amount_minor, currency, notes, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider_order_id) DO NOTHING
        "#)
        .bind(&order.provider_order_id)
        .bind(&order.receipt_id)
        .bind(order.amount_minor_units)
        .bind(&order.currency)
        .bind(&notes)
        .bind(now_ms)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn find_payment_order(
        &self,
        provider_order_id: &str,
    ) -> Result<Option<PaymentOrderRecord>, LedgerError> {
        let record: Option<PaymentOrderRecord> =
            sqlx::query_as("SELECT * FROM payment_orders WHERE provider_order_id = ?")
                .bind(provider_order_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(record)
    }

    async fn insert_paid_order(&self, order: &NewOrder) -> Result<LedgerInsert, LedgerError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let order_id = Uuid::new_v4().to_string();

        let cart_items = serde_json::to_string(&order.cart_items)?;
        let shipping_address = serde_json::to_string(&order.shipping_address)?;
        let contact_info = serde_json::to_string(&order.contact_info)?;

        let result = sqlx::query(r#"
            INSERT INTO orders (
                order_id, user_id, cart_items, total_amount, shipping_address,
                contact_info, provider_order_id, provider_payment_id, status,
                created_at_ms, updated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider_payment_id) DO NOTHING
        "#)
        .bind(&order_id)
        .bind(&order.user_id)
        .bind(&cart_items)
        .bind(order.total_amount.to_string())
        .bind(&shipping_address)
        .bind(&contact_info)
        .bind(&order.provider_order_id)
        .bind(&order.provider_payment_id)
        .bind(order_status::PAID)
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            info!("Order saved: order_id={}, payment_id={}", order_id, order.provider_payment_id);
            return Ok(LedgerInsert::Created(order_id));
        }

        // 既存注文（リトライ・二重送信）
        let (existing,): (String,) =
            sqlx::query_as("SELECT order_id FROM orders WHERE provider_payment_id = ?")
                .bind(&order.provider_payment_id)
                .fetch_one(&self.db)
                .await?;
        info!(
            "Order already recorded: order_id={}, payment_id={}",
            existing, order.provider_payment_id
        );
        Ok(LedgerInsert::Existing(existing))
    }
}
