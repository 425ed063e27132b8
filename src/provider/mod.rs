//! Payment provider client
//!
//! The provider is constructed once at startup and shared as
//! `Arc<dyn PaymentProvider>` so tests can swap in [`mock::MockProvider`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod mock;
pub mod razorpay;

pub use mock::MockProvider;
pub use razorpay::RazorpayClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Payment provider order creation failed: {0}")]
    OrderCreationFailed(String),

    #[error("Payment provider returned no order id")]
    MissingOrderId,

    #[error("Payment provider client setup failed: {0}")]
    Client(String),
}

/// Order creation request sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderOrderRequest {
    /// Minor units (paise).
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

/// Order object returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderOrder {
    #[serde(default)]
    pub id: Option<String>,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "notes_or_empty")]
    pub notes: BTreeMap<String, String>,
}

/// The provider sends `notes: []` when an order has no notes.
fn notes_or_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect(),
        _ => BTreeMap::new(),
    })
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_response_parses_with_array_notes() {
        let order: ProviderOrder = serde_json::from_str(
            r#"{"id":"order_1","entity":"order","amount":101000,"currency":"INR","receipt":"r1","status":"created","notes":[]}"#,
        )
        .unwrap();

        assert_eq!(order.id.as_deref(), Some("order_1"));
        assert!(order.notes.is_empty());
    }

    #[test]
    fn order_response_keeps_object_notes() {
        let order: ProviderOrder = serde_json::from_str(
            r#"{"id":"order_1","amount":100,"currency":"INR","notes":{"customer_email":"a@b.in","count":2}}"#,
        )
        .unwrap();

        assert_eq!(order.notes["customer_email"], "a@b.in");
        assert_eq!(order.notes["count"], "2");
    }
}
