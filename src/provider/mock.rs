//! In-memory payment provider for tests and local runs.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{PaymentProvider, ProviderError, ProviderOrder, ProviderOrderRequest};

/// Records every request and answers with sequential `order_mock_N` ids.
#[derive(Clone, Default)]
pub struct MockProvider {
    requests: Arc<Mutex<Vec<ProviderOrderRequest>>>,
    fail_with: Arc<Mutex<Option<String>>>,
    omit_id: Arc<Mutex<bool>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
    }

    /// Make subsequent calls return an order without an id.
    pub fn omit_order_id(&self) {
        *self.omit_id.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<ProviderOrderRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, ProviderError> {
        let count = {
            let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            requests.push(request.clone());
            requests.len()
        };

        if let Some(message) = self.fail_with.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(ProviderError::OrderCreationFailed(message));
        }

        let omit_id = *self.omit_id.lock().unwrap_or_else(|e| e.into_inner());
        Ok(ProviderOrder {
            id: (!omit_id).then(|| format!("order_mock_{}", count)),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".to_string()),
            notes: request.notes.clone(),
        })
    }
}
