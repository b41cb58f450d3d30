use log::{debug, info, warn};
use serde::Deserialize;

use crate::domain::errors::DomainError;
use crate::domain::payment::{PaymentStatus, StatusChange};
use crate::domain::ports::PaymentRepository;
use crate::infrastructure::signature::WebhookVerifier;

/// Gateway notification body. Only the fields needed for reconciliation are read.
#[derive(Debug, Deserialize)]
pub struct WebhookNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Signed, but not something this service acts on.
    Ignored,
    Processed(StatusChange),
}

pub struct WebhookService<P> {
    payments: P,
    verifier: WebhookVerifier,
}

impl<P: PaymentRepository> WebhookService<P> {
    pub fn new(payments: P, verifier: WebhookVerifier) -> Self {
        Self { payments, verifier }
    }

    /// Verifies and applies one webhook delivery.
    ///
    /// A bad signature and a storage failure are errors; the latter makes the
    /// gateway redeliver. Every other outcome is acknowledged, including a
    /// payment that is not recorded locally yet, which is skipped and left
    /// to reconciliation.
    pub async fn handle_webhook(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, DomainError> {
        self.verifier.verify(raw_payload, signature)?;

        let notification: WebhookNotification = match serde_json::from_slice(raw_payload) {
            Ok(n) => n,
            Err(e) => {
                warn!("Ignoring signed webhook with unreadable body: {e}");
                return Ok(WebhookOutcome::Ignored);
            }
        };
        if notification.kind != "notification" || !notification.event.starts_with("payment.") {
            debug!("Ignoring webhook event {} ({})", notification.event, notification.kind);
            return Ok(WebhookOutcome::Ignored);
        }
        let status: PaymentStatus = match notification.object.status.parse() {
            Ok(s) => s,
            Err(e) => {
                warn!("Ignoring webhook for payment {}: {e}", notification.object.id);
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let gateway_id = notification.object.id;
        let change = self.payments.apply_status(&gateway_id, status).await?;
        match change {
            StatusChange::PaymentNotFound => {
                debug!("No local record for payment {gateway_id} yet; left for reconciliation");
            }
            StatusChange::Unchanged(s) => {
                debug!("Payment {gateway_id} already {s}; duplicate delivery")
            }
            StatusChange::Rejected { from, to } => {
                warn!("Ignoring {to} for payment {gateway_id}: already final at {from}")
            }
            StatusChange::Applied { from, to, order_paid } => info!(
                "Payment {gateway_id} moved {from} -> {to} (order marked paid: {order_paid})"
            ),
        }
        Ok(WebhookOutcome::Processed(change))
    }
}
