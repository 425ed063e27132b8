//! Payments API Handlers
//! /api/payments エンドポイント

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::discount;
use crate::error::{
    error_response, from_json_rejection, from_pricing_error, from_provider_error, ApiError,
};
use crate::models::{CartItem, ContactInfo, ExternalId, PaymentConfirmation, CURRENCY_INR};
use crate::payments::{
    create_payment_order, verify_and_persist, OrderContext, PaymentMetadata, VerificationError,
    VerificationResult,
};
use crate::pricing::{compute_order_total, PricingError};
use crate::AppState;

// ========================================
// Request / Response Types
// ========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub cart_items: Option<Vec<CartItem>>,
    #[serde(default)]
    pub contact_info: Option<ContactInfo>,
    #[serde(default)]
    pub discount_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    /// 最小通貨単位（paise）
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(default, alias = "razorpay_order_id")]
    pub provider_order_id: Option<String>,
    #[serde(default, alias = "razorpay_payment_id")]
    pub provider_payment_id: Option<String>,
    #[serde(default, alias = "razorpay_signature")]
    pub provider_signature: Option<String>,
    #[serde(default)]
    pub user_id: Option<ExternalId>,
    #[serde(default)]
    pub cart_items: Option<Vec<CartItem>>,
    #[serde(default)]
    pub total_amount_in_rupees: Option<Decimal>,
    #[serde(default)]
    pub shipping_address: Option<serde_json::Value>,
    #[serde(default)]
    pub contact_info: Option<ContactInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
}

impl VerifyPaymentResponse {
    fn failure(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::BAD_REQUEST,
            Json(Self {
                status: "failure",
                message: Some(message.into()),
                order_id: None,
                payment_id: None,
            }),
        )
    }
}

// ========================================
// Handlers
// ========================================

/// POST /api/payments/create-order - 決済注文作成
///
/// 金額はカタログ価格から再計算する。クライアント送信の price は使わない。
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let Json(req) = payload.map_err(from_json_rejection)?;
    let environment = state.config.environment;

    let cart_items = req.cart_items.unwrap_or_default();
    if cart_items.is_empty() {
        return Err(from_pricing_error(&PricingError::EmptyCart, environment));
    }

    let contact = req
        .contact_info
        .filter(ContactInfo::is_complete)
        .ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "Contact email and phone are required.".to_string(),
            )
        })?;

    let discount = discount::resolve(req.discount_code.as_deref());
    let total = compute_order_total(
        &cart_items,
        state.oracle.as_ref(),
        state.config.shipping_fee,
        discount,
    )
    .await
    .map_err(|e| from_pricing_error(&e, environment))?;

    let order = create_payment_order(
        state.provider.as_ref(),
        total.grand_total_minor_units,
        CURRENCY_INR,
        PaymentMetadata {
            contact: &contact,
            cart_items: &cart_items,
        },
    )
    .await
    .map_err(|e| from_provider_error(&e, environment))?;

    // 控えの保存はベストエフォート（失敗しても決済は続行できる）
    if let Err(e) = state.ledger.record_payment_order(&order).await {
        warn!(
            "Failed to record payment order {}: {}",
            order.provider_order_id, e
        );
    }

    info!(
        "Checkout started: order_id={}, amount={} {}",
        order.provider_order_id, order.amount_minor_units, order.currency
    );

    Ok(Json(CreateOrderResponse {
        order_id: order.provider_order_id,
        amount: order.amount_minor_units,
        currency: order.currency,
        key_id: state.config.razorpay_key_id.clone(),
        receipt: order.receipt_id,
        notes: order.notes,
        customer_name: contact.display_name(),
        customer_email: contact.email.unwrap_or_default(),
        customer_phone: contact.phone.unwrap_or_default(),
    }))
}

/// POST /api/payments/verify-payment - 署名検証と注文保存
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> (StatusCode, Json<VerifyPaymentResponse>) {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!("Rejected verify-payment body: {}", rejection.body_text());
            return VerifyPaymentResponse::failure("Invalid request body.");
        }
    };

    let confirmation = match PaymentConfirmation::from_parts(
        req.provider_order_id.as_deref(),
        req.provider_payment_id.as_deref(),
        req.provider_signature.as_deref(),
    ) {
        Ok(c) => c,
        Err(e) => {
            warn!("verify-payment: {}", e);
            return VerifyPaymentResponse::failure(e.to_string());
        }
    };

    let context = match (
        req.cart_items,
        req.total_amount_in_rupees,
        req.shipping_address.filter(|v| !v.is_null()),
        req.contact_info,
    ) {
        (Some(cart_items), Some(client_total), Some(shipping_address), Some(contact_info)) => {
            OrderContext {
                user_id: req.user_id.map(|id| id.normalized()).filter(|id| !id.is_empty()),
                cart_items,
                client_total,
                shipping_address,
                contact_info,
            }
        }
        _ => {
            let e = VerificationError::MissingOrderDetails;
            warn!(
                "verify-payment for {}: {}",
                confirmation.provider_order_id, e
            );
            return VerifyPaymentResponse::failure(e.to_string());
        }
    };

    let result = verify_and_persist(
        &state.config.razorpay_key_secret,
        state.ledger.as_ref(),
        &confirmation,
        context,
    )
    .await;

    match result {
        VerificationResult::Success {
            order_id,
            payment_id,
        } => (
            StatusCode::OK,
            Json(VerifyPaymentResponse {
                status: "success",
                message: Some("Payment verified and order saved.".to_string()),
                order_id: Some(order_id),
                payment_id: Some(payment_id),
            }),
        ),
        VerificationResult::Failure => {
            VerifyPaymentResponse::failure("Payment verification failed. Invalid signature.")
        }
        VerificationResult::SuccessPaymentPersistFailed { payment_id } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(VerifyPaymentResponse {
                status: "payment_success_db_error",
                message: Some(
                    "Payment successful, but we could not save your order details. Please contact support with your payment ID."
                        .to_string(),
                ),
                order_id: None,
                payment_id: Some(payment_id),
            }),
        ),
    }
}
