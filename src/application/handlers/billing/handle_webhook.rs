//! HandleWebhookHandler - authenticity gate in front of the reconciler.
//!
//! The HTTP layer acknowledges delivery first and runs this handler in the
//! background, so every failure here ends in a log line rather than a
//! response to the processor.

use std::sync::Arc;

use crate::domain::billing::{BillingError, ProcessorEvent, WebhookVerifier};

use super::reconcile_event::{EventReconciler, ReconcileOutcome};

/// Raw delivery exactly as received.
#[derive(Debug, Clone)]
pub struct HandleWebhookCommand {
    /// Untouched request body; the signature covers these bytes.
    pub payload: Vec<u8>,
    pub signature: Option<String>,
}

pub struct HandleWebhookHandler {
    verifier: WebhookVerifier,
    reconciler: Arc<EventReconciler>,
}

impl HandleWebhookHandler {
    pub fn new(verifier: WebhookVerifier, reconciler: Arc<EventReconciler>) -> Self {
        Self {
            verifier,
            reconciler,
        }
    }

    pub async fn handle(&self, cmd: HandleWebhookCommand) -> Result<ReconcileOutcome, BillingError> {
        // 1. Authenticate the raw bytes before anything is parsed
        self.verifier
            .check(&cmd.payload, cmd.signature.as_deref())?;

        // 2. Parse the envelope
        let event = ProcessorEvent::parse(&cmd.payload)
            .map_err(|e| BillingError::InvalidEvent(format!("malformed webhook body: {}", e)))?;

        tracing::debug!(
            event = %event.event,
            account_id = event.account_id.as_deref().unwrap_or("-"),
            "Webhook accepted"
        );

        // 3. Reconcile
        self.reconciler.apply(&event).await
    }

    /// Runs [`handle`](Self::handle) and logs the result. Used after the
    /// delivery has already been acknowledged.
    pub async fn process_acknowledged(&self, cmd: HandleWebhookCommand) {
        match self.handle(cmd).await {
            Ok(outcome) => {
                tracing::info!(?outcome, "Webhook reconciled");
            }
            Err(BillingError::InvalidSignature) => {
                tracing::warn!("Webhook signature verification failed after acknowledgment");
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    code = err.code(),
                    "Webhook reconciliation failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCustomerRepository, InMemoryPaymentRepository, InMemoryPlanRepository,
        InMemorySubscriptionRepository,
    };
    use crate::adapters::razorpay::MockPaymentProcessor;
    use crate::application::handlers::billing::UpsertResolver;
    use crate::domain::billing::webhook_verifier::sign;
    use crate::domain::billing::PaymentStatus;
    use secrecy::SecretString;

    const SECRET: &str = "whsec_test";

    fn handler(verifier: WebhookVerifier) -> (HandleWebhookHandler, Arc<InMemoryPaymentRepository>) {
        let customers = Arc::new(InMemoryCustomerRepository::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let resolver = Arc::new(UpsertResolver::new(
            Arc::new(MockPaymentProcessor::new()),
            customers.clone(),
            Arc::new(InMemoryPlanRepository::new()),
        ));
        let reconciler = Arc::new(EventReconciler::new(
            resolver,
            customers,
            Arc::new(InMemorySubscriptionRepository::new()),
            payments.clone(),
        ));
        (HandleWebhookHandler::new(verifier, reconciler), payments)
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::new(SECRET.to_string()))
    }

    fn captured_body() -> Vec<u8> {
        br#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_9","amount":100,"status":"captured"}}},"created_at":1700000000}"#.to_vec()
    }

    #[tokio::test]
    async fn signed_delivery_is_reconciled() {
        let (handler, payments) = handler(verifier());
        let body = captured_body();
        let signature = sign(&body, SECRET.as_bytes());

        let outcome = handler
            .handle(HandleWebhookCommand {
                payload: body,
                signature: Some(signature),
            })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::PaymentRecorded {
                razorpay_payment_id: "pay_9".into(),
                status: PaymentStatus::Captured,
            }
        );
        assert_eq!(payments.count().await, 1);
    }

    #[tokio::test]
    async fn tampered_body_never_reaches_the_store() {
        let (handler, payments) = handler(verifier());
        let signature = sign(&captured_body(), SECRET.as_bytes());
        let tampered = String::from_utf8(captured_body())
            .unwrap()
            .replace("\"amount\":100", "\"amount\":1");

        let err = handler
            .handle(HandleWebhookCommand {
                payload: tampered.into_bytes(),
                signature: Some(signature),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::InvalidSignature));
        assert_eq!(payments.count().await, 0);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let (handler, _) = handler(verifier());
        let err = handler
            .handle(HandleWebhookCommand {
                payload: captured_body(),
                signature: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidSignature));
    }

    #[tokio::test]
    async fn malformed_body_is_an_invalid_event() {
        let (handler, _) = handler(WebhookVerifier::insecure_bypass(SecretString::new(String::new())));
        let err = handler
            .handle(HandleWebhookCommand {
                payload: b"not json".to_vec(),
                signature: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidEvent(_)));
    }
}
