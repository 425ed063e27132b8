//! Data Models
//! CartItem, PriceRecord, PaymentOrder, Order などのデータ構造定義

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::payments::VerificationError;

// ========================================
// Identifiers
// ========================================

/// 商品ID / ユーザーID
///
/// ブラウザ側のカートは数値 (`5`) と文字列 (`"chair-abc"`) の両方を送ってくるので
/// 受け取った形のまま保持し、比較は常に [`ExternalId::normalized`] で行う。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Text(String),
    Number(serde_json::Number),
}

impl ExternalId {
    /// trim + 文字列化した比較用キー
    ///
    /// 整数値の浮動小数 (`42.0`) は `"42"` に揃える
    pub fn normalized(&self) -> String {
        match self {
            ExternalId::Text(s) => s.trim().to_string(),
            ExternalId::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                    format!("{}", f as i64)
                }
                _ => n.to_string(),
            },
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl From<&str> for ExternalId {
    fn from(s: &str) -> Self {
        ExternalId::Text(s.to_string())
    }
}

impl From<u64> for ExternalId {
    fn from(n: u64) -> Self {
        ExternalId::Number(n.into())
    }
}

// ========================================
// Cart
// ========================================

/// カート明細（クライアント送信値）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ExternalId,
    #[serde(default)]
    pub name: String,
    /// 表示用の価格。課金計算には一切使わない
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<serde_json::Value>,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// 購入者連絡先
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ContactInfo {
    /// email と phone が空でないこと
    pub fn is_complete(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.email) && present(&self.phone)
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Guest Customer")
            .to_string()
    }
}

// ========================================
// Pricing
// ========================================

/// Price Oracle が返す価格レコード
///
/// `price` は DB の値をテキストのまま保持する。NULL や数値でない値は「販売不可」。
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PriceRecord {
    pub id: String,
    pub price: Option<String>,
}

impl PriceRecord {
    /// 正規化済みの単価。非数値・負数は None
    pub fn unit_price(&self) -> Option<Decimal> {
        let raw = self.price.as_deref()?.trim();
        let price = Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .ok()?;
        (!price.is_sign_negative()).then_some(price)
    }
}

/// サーバー側で算出した注文合計
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotal {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub grand_total: Decimal,
    pub grand_total_minor_units: i64,
}

// ========================================
// Payment Order
// ========================================

pub const CURRENCY_INR: &str = "INR";

/// 決済プロバイダ側で作成された注文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub provider_order_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub receipt_id: String,
    pub notes: BTreeMap<String, String>,
}

/// payment_orders (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentOrderRecord {
    pub provider_order_id: String,
    pub receipt_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub notes: String,
    pub created_at_ms: i64,
}

/// プロバイダから返ってくる署名付き決済確認
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub provider_signature: String,
}

impl PaymentConfirmation {
    /// 3項目すべてが揃っている場合のみ生成する（空文字は欠落扱い）
    pub fn from_parts(
        provider_order_id: Option<&str>,
        provider_payment_id: Option<&str>,
        provider_signature: Option<&str>,
    ) -> Result<Self, VerificationError> {
        let take = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
        match (
            take(provider_order_id),
            take(provider_payment_id),
            take(provider_signature),
        ) {
            (Some(provider_order_id), Some(provider_payment_id), Some(provider_signature)) => {
                Ok(Self {
                    provider_order_id,
                    provider_payment_id,
                    provider_signature,
                })
            }
            _ => Err(VerificationError::MissingFields),
        }
    }
}

// ========================================
// Order
// ========================================

pub mod order_status {
    pub const PAID: &str = "paid";
}

/// 署名検証後に保存する注文内容
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<String>,
    pub cart_items: Vec<CartItem>,
    pub total_amount: Decimal,
    pub shipping_address: serde_json::Value,
    pub contact_info: ContactInfo,
    pub provider_order_id: String,
    pub provider_payment_id: String,
}

/// orders (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderRecord {
    pub order_id: String,
    pub user_id: Option<String>,
    pub cart_items: String,
    pub total_amount: String,
    pub shipping_address: String,
    pub contact_info: String,
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub status: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

// ========================================
// Product (catalog)
// ========================================

/// Product (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub price: Option<String>,
    pub old_price: Option<String>,
    pub image_url: Option<String>,
    pub badge_text: Option<String>,
    pub is_featured: i32,
    pub is_active: i32,
    pub created_at_ms: Option<i64>,
    pub updated_at_ms: Option<i64>,
}

/// Product レスポンス（API返却用）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub old_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub badge_text: Option<String>,
    pub is_featured: bool,
}

impl ProductResponse {
    pub fn from_product(p: &Product) -> Self {
        let parse = |v: &Option<String>| {
            v.as_deref()
                .and_then(|s| Decimal::from_str(s.trim()).ok())
        };
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            category: p.category.clone(),
            price: parse(&p.price),
            old_price: parse(&p.old_price),
            image_url: p.image_url.clone(),
            badge_text: p.badge_text.clone(),
            is_featured: p.is_featured == 1,
        }
    }
}

/// カタログ JSON (CATALOG_SEED_PATH) の1エントリ
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeedEntry {
    pub id: ExternalId,
    pub name: String,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub old_price: Option<Decimal>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub badge_text: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
}
