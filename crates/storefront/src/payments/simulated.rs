//! Local provider for development and manual orders.

use async_trait::async_trait;
use uuid::Uuid;

use super::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentProvider};

/// Hands out session ids without contacting anyone.
///
/// Sessions count as paid on creation, so checkout settles the order
/// through the same reconciliation path a webhook would use.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    base_url: String,
}

impl SimulatedProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PaymentProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn settles_immediately(&self) -> bool {
        true
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let id = format!("sim_cs_{}", Uuid::new_v4().simple());
        let url = format!(
            "{}/checkout/success?session_id={id}",
            self.base_url.trim_end_matches('/')
        );
        tracing::info!(session_id = %id, reference = %request.idempotency_key, "Simulated checkout session");
        Ok(CheckoutSession { id, url })
    }
}
