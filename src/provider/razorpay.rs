//! Razorpay Orders API client

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use super::{PaymentProvider, ProviderError, ProviderOrder, ProviderOrderRequest};

#[derive(Clone)]
pub struct RazorpayClient {
    api_base: String,
    key_id: String,
    key_secret: String,
    client: reqwest::Client,
}

impl RazorpayClient {
    pub fn new(api_base: &str, key_id: &str, key_secret: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
            client,
        })
    }
}

#[async_trait]
impl PaymentProvider for RazorpayClient {
    async fn create_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, ProviderError> {
        let url = format!("{}/orders", self.api_base);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, receipt = %request.receipt, "Razorpay request failed");
                ProviderError::OrderCreationFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Razorpay rejected order creation");
            return Err(ProviderError::OrderCreationFailed(format!(
                "provider responded {}: {}",
                status, body
            )));
        }

        let order: ProviderOrder = response.json().await.map_err(|e| {
            ProviderError::OrderCreationFailed(format!("failed to parse provider response: {}", e))
        })?;

        if order.id.as_deref().map_or(true, str::is_empty) {
            return Err(ProviderError::MissingOrderId);
        }

        info!(
            provider_order_id = order.id.as_deref().unwrap_or_default(),
            amount = order.amount,
            "Razorpay order created"
        );
        Ok(order)
    }
}
