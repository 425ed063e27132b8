//! Payment order initiation and confirmation verification
//!
//! Verification has three outcomes. A bad signature persists nothing. A good
//! signature persists the order once per payment id. A good signature whose
//! order cannot be saved is reported separately: the money has moved at the
//! provider, so it must be reconciled by hand rather than shown as a failure.

use std::collections::BTreeMap;

use rand::Rng;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::{CartItem, ContactInfo, NewOrder, PaymentConfirmation, PaymentOrder};
use crate::pricing::MIN_CHARGE_MINOR_UNITS;
use crate::provider::{PaymentProvider, ProviderError, ProviderOrderRequest};
use crate::signature;
use crate::store::{LedgerInsert, OrderLedger};

const PROJECT_NAME: &str = "IRON STREET Order";

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Missing payment details for verification.")]
    MissingFields,

    #[error("Missing order details for saving.")]
    MissingOrderDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// Signature did not match; nothing was persisted.
    Failure,
    Success { order_id: String, payment_id: String },
    /// Signature matched but the order record could not be saved.
    SuccessPaymentPersistFailed { payment_id: String },
}

/// Buyer details attached to the provider order notes.
#[derive(Debug, Clone, Copy)]
pub struct PaymentMetadata<'a> {
    pub contact: &'a ContactInfo,
    pub cart_items: &'a [CartItem],
}

/// Order details the client submits alongside a confirmation.
#[derive(Debug, Clone)]
pub struct OrderContext {
    pub user_id: Option<String>,
    pub cart_items: Vec<CartItem>,
    /// Client's view of the total in rupees; superseded by the recorded
    /// payment order amount when one exists.
    pub client_total: Decimal,
    pub shipping_address: serde_json::Value,
    pub contact_info: ContactInfo,
}

// ========================================
// Initiation
// ========================================

/// Open a provider order for an amount already computed by
/// [`crate::pricing::compute_order_total`].
pub async fn create_payment_order(
    provider: &dyn PaymentProvider,
    amount_minor_units: i64,
    currency: &str,
    metadata: PaymentMetadata<'_>,
) -> Result<PaymentOrder, ProviderError> {
    if amount_minor_units < MIN_CHARGE_MINOR_UNITS {
        return Err(ProviderError::OrderCreationFailed(format!(
            "amount {} is below the minimum chargeable amount",
            amount_minor_units
        )));
    }

    let request = ProviderOrderRequest {
        amount: amount_minor_units,
        currency: currency.to_string(),
        receipt: generate_receipt_id(),
        notes: build_notes(metadata),
    };

    let order = provider.create_order(&request).await?;
    let provider_order_id = order
        .id
        .filter(|id| !id.is_empty())
        .ok_or(ProviderError::MissingOrderId)?;

    info!(
        "Payment order created: provider_order_id={}, receipt={}, amount={} {}",
        provider_order_id, request.receipt, order.amount, order.currency
    );

    Ok(PaymentOrder {
        provider_order_id,
        amount_minor_units: order.amount,
        currency: order.currency,
        receipt_id: order.receipt.unwrap_or(request.receipt),
        notes: if order.notes.is_empty() {
            request.notes
        } else {
            order.notes
        },
    })
}

fn build_notes(metadata: PaymentMetadata<'_>) -> BTreeMap<String, String> {
    let cart_summary: Vec<serde_json::Value> = metadata
        .cart_items
        .iter()
        .map(|item| serde_json::json!({ "id": item.id, "qty": item.quantity }))
        .collect();

    let mut notes = BTreeMap::new();
    notes.insert("customer_name".to_string(), metadata.contact.display_name());
    notes.insert(
        "customer_email".to_string(),
        metadata.contact.email.clone().unwrap_or_default(),
    );
    notes.insert(
        "customer_phone".to_string(),
        metadata.contact.phone.clone().unwrap_or_default(),
    );
    notes.insert("project_name".to_string(), PROJECT_NAME.to_string());
    notes.insert(
        "cart_summary".to_string(),
        serde_json::Value::Array(cart_summary).to_string(),
    );
    notes
}

/// `receipt_order_<millis>_<random>`, within the provider's 40 character limit.
fn generate_receipt_id() -> String {
    let random_bytes: [u8; 5] = rand::thread_rng().gen();
    let encoded = base32::encode(base32::Alphabet::Crockford, &random_bytes);
    format!(
        "receipt_order_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        encoded
    )
}

// ========================================
// Verification
// ========================================

/// Verify `confirmation` and persist the order on success.
pub async fn verify_and_persist(
    secret: &str,
    ledger: &dyn OrderLedger,
    confirmation: &PaymentConfirmation,
    context: OrderContext,
) -> VerificationResult {
    if !signature::verify(secret, confirmation) {
        // 決済自体は成功している可能性がある
        warn!(
            provider_order_id = %confirmation.provider_order_id,
            provider_payment_id = %confirmation.provider_payment_id,
            "Payment signature mismatch; charge status at provider unknown, nothing persisted"
        );
        return VerificationResult::Failure;
    }

    let total_amount =
        agreed_total(ledger, &confirmation.provider_order_id, context.client_total).await;

    let order = NewOrder {
        user_id: context.user_id,
        cart_items: context.cart_items,
        total_amount,
        shipping_address: context.shipping_address,
        contact_info: context.contact_info,
        provider_order_id: confirmation.provider_order_id.clone(),
        provider_payment_id: confirmation.provider_payment_id.clone(),
    };

    match ledger.insert_paid_order(&order).await {
        Ok(insert) => {
            if let LedgerInsert::Existing(order_id) = &insert {
                info!(
                    "Repeated verification for payment_id={}, returning order_id={}",
                    confirmation.provider_payment_id, order_id
                );
            }
            VerificationResult::Success {
                order_id: insert.order_id().to_string(),
                payment_id: confirmation.provider_payment_id.clone(),
            }
        }
        Err(e) => {
            error!(
                reconciliation = true,
                provider_order_id = %confirmation.provider_order_id,
                provider_payment_id = %confirmation.provider_payment_id,
                total_amount = %total_amount,
                error = %e,
                "Payment verified but order could not be saved"
            );
            VerificationResult::SuccessPaymentPersistFailed {
                payment_id: confirmation.provider_payment_id.clone(),
            }
        }
    }
}

/// Amount recorded when the provider order was opened, falling back to the
/// client's figure when no record is available.
async fn agreed_total(
    ledger: &dyn OrderLedger,
    provider_order_id: &str,
    client_total: Decimal,
) -> Decimal {
    match ledger.find_payment_order(provider_order_id).await {
        Ok(Some(record)) => {
            let recorded = Decimal::new(record.amount_minor, 2);
            if recorded != client_total {
                warn!(
                    "Client total {} differs from recorded amount {} for {}",
                    client_total, recorded, provider_order_id
                );
            }
            recorded
        }
        Ok(None) => {
            warn!("No payment order record for {}; using client total", provider_order_id);
            client_total
        }
        Err(e) => {
            warn!("Payment order lookup failed for {}: {}", provider_order_id, e);
            client_total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalId, PaymentOrderRecord};
    use crate::provider::MockProvider;
    use crate::store::LedgerError;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    const SECRET: &str = "test_secret";

    #[derive(Default)]
    struct Ledger {
        payment_orders: Mutex<Vec<PaymentOrder>>,
        orders: Mutex<Vec<NewOrder>>,
        fail_inserts: bool,
    }

    #[async_trait]
    impl OrderLedger for Ledger {
        async fn record_payment_order(&self, order: &PaymentOrder) -> Result<(), LedgerError> {
            self.payment_orders.lock().unwrap().push(order.clone());
            Ok(())
        }

        async fn find_payment_order(
            &self,
            provider_order_id: &str,
        ) -> Result<Option<PaymentOrderRecord>, LedgerError> {
            Ok(self
                .payment_orders
                .lock()
                .unwrap()
                .iter()
                .find(|o| o.provider_order_id == provider_order_id)
                .map(|o| PaymentOrderRecord {
                    provider_order_id: o.provider_order_id.clone(),
                    receipt_id: o.receipt_id.clone(),
                    amount_minor: o.amount_minor_units,
                    currency: o.currency.clone(),
                    notes: "{}".to_string(),
                    created_at_ms: 0,
                }))
        }

        async fn insert_paid_order(&self, order: &NewOrder) -> Result<LedgerInsert, LedgerError> {
            if self.fail_inserts {
                return Err(LedgerError::Database(sqlx::Error::PoolClosed));
            }
            let mut orders = self.orders.lock().unwrap();
            if let Some(pos) = orders
                .iter()
                .position(|o| o.provider_payment_id == order.provider_payment_id)
            {
                return Ok(LedgerInsert::Existing(format!("ord_{}", pos)));
            }
            orders.push(order.clone());
            Ok(LedgerInsert::Created(format!("ord_{}", orders.len() - 1)))
        }
    }

    fn contact() -> ContactInfo {
        ContactInfo {
            email: Some("buyer@example.in".to_string()),
            phone: Some("9876543210".to_string()),
            name: Some("Asha".to_string()),
        }
    }

    fn cart() -> Vec<CartItem> {
        vec![CartItem {
            id: ExternalId::from(42),
            name: "Rustic Coffee Table".to_string(),
            price: Some(serde_json::json!(999)),
            quantity: 2,
            image: None,
            variant: None,
        }]
    }

    fn context(client_total: Decimal) -> OrderContext {
        OrderContext {
            user_id: None,
            cart_items: cart(),
            client_total,
            shipping_address: serde_json::json!({"city": "Jaipur", "zip": "302001"}),
            contact_info: contact(),
        }
    }

    fn signed(order_id: &str, payment_id: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            provider_order_id: order_id.to_string(),
            provider_payment_id: payment_id.to_string(),
            provider_signature: signature::sign(SECRET, order_id, payment_id),
        }
    }

    #[tokio::test]
    async fn creates_order_with_notes_and_receipt() {
        let provider = MockProvider::new();
        let contact = contact();
        let cart = cart();

        let order = create_payment_order(
            &provider,
            101000,
            "INR",
            PaymentMetadata {
                contact: &contact,
                cart_items: &cart,
            },
        )
        .await
        .unwrap();

        assert_eq!(order.provider_order_id, "order_mock_1");
        assert_eq!(order.amount_minor_units, 101000);
        assert!(order.receipt_id.starts_with("receipt_order_"));
        assert!(order.receipt_id.len() <= 40);
        assert_eq!(order.notes["customer_email"], "buyer@example.in");
        assert_eq!(order.notes["cart_summary"], r#"[{"id":42,"qty":2}]"#);
    }

    #[tokio::test]
    async fn receipts_are_unique_per_attempt() {
        let provider = MockProvider::new();
        let contact = contact();
        let cart = cart();
        let metadata = PaymentMetadata {
            contact: &contact,
            cart_items: &cart,
        };

        create_payment_order(&provider, 500, "INR", metadata).await.unwrap();
        create_payment_order(&provider, 500, "INR", metadata).await.unwrap();

        let requests = provider.requests();
        assert_ne!(requests[0].receipt, requests[1].receipt);
    }

    #[tokio::test]
    async fn provider_failure_and_missing_id_surface() {
        let contact = contact();
        let cart = cart();
        let metadata = PaymentMetadata {
            contact: &contact,
            cart_items: &cart,
        };

        let provider = MockProvider::new();
        provider.fail_with("gateway down");
        assert!(matches!(
            create_payment_order(&provider, 500, "INR", metadata).await,
            Err(ProviderError::OrderCreationFailed(_))
        ));

        let provider = MockProvider::new();
        provider.omit_order_id();
        assert!(matches!(
            create_payment_order(&provider, 500, "INR", metadata).await,
            Err(ProviderError::MissingOrderId)
        ));
    }

    #[tokio::test]
    async fn amount_below_minimum_never_reaches_provider() {
        let provider = MockProvider::new();
        let contact = contact();
        let result = create_payment_order(
            &provider,
            0,
            "INR",
            PaymentMetadata {
                contact: &contact,
                cart_items: &[],
            },
        )
        .await;

        assert!(result.is_err());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn valid_signature_persists_once() {
        let ledger = Ledger::default();
        let confirmation = signed("order_1", "pay_1");

        let first = verify_and_persist(SECRET, &ledger, &confirmation, context(dec!(1010))).await;
        let second = verify_and_persist(SECRET, &ledger, &confirmation, context(dec!(1010))).await;

        let expected = VerificationResult::Success {
            order_id: "ord_0".to_string(),
            payment_id: "pay_1".to_string(),
        };
        assert_eq!(first, expected);
        assert_eq!(second, expected);
        assert_eq!(ledger.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_signature_persists_nothing() {
        let ledger = Ledger::default();
        let mut confirmation = signed("order_1", "pay_1");
        confirmation.provider_payment_id = "pay_2".to_string();

        let result = verify_and_persist(SECRET, &ledger, &confirmation, context(dec!(1010))).await;

        assert_eq!(result, VerificationResult::Failure);
        assert!(ledger.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_failure_is_reported_as_paid() {
        let ledger = Ledger {
            fail_inserts: true,
            ..Ledger::default()
        };

        let confirmation = signed("order_1", "pay_9");
        let result = verify_and_persist(SECRET, &ledger, &confirmation, context(dec!(1010))).await;

        assert_eq!(
            result,
            VerificationResult::SuccessPaymentPersistFailed {
                payment_id: "pay_9".to_string()
            }
        );
    }

    #[tokio::test]
    async fn recorded_amount_overrides_client_total() {
        let ledger = Ledger::default();
        ledger
            .record_payment_order(&PaymentOrder {
                provider_order_id: "order_1".to_string(),
                amount_minor_units: 101000,
                currency: "INR".to_string(),
                receipt_id: "receipt_order_1".to_string(),
                notes: BTreeMap::new(),
            })
            .await
            .unwrap();

        verify_and_persist(SECRET, &ledger, &signed("order_1", "pay_1"), context(dec!(1))).await;

        assert_eq!(ledger.orders.lock().unwrap()[0].total_amount, dec!(1010.00));
    }
}
