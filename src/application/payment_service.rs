use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::OrderStatus;
use crate::domain::payment::{
    CreatePaymentRequest, GatewayPaymentHandle, GatewayPaymentRequest, NewPayment, Payment,
    PaymentMetadata, PaymentStatus, StatusChange,
};
use crate::domain::ports::{OrderRepository, PaymentGateway, PaymentRepository};

/// Drives an order through the external payment gateway.
pub struct PaymentService<O, P, G> {
    orders: O,
    payments: P,
    gateway: G,
}

impl<O, P, G> PaymentService<O, P, G>
where
    O: OrderRepository,
    P: PaymentRepository,
    G: PaymentGateway,
{
    pub fn new(orders: O, payments: P, gateway: G) -> Self {
        Self { orders, payments, gateway }
    }

    /// Validates the request against the order, starts a gateway payment and
    /// records it locally.
    ///
    /// Every check runs before the gateway is contacted, including that the
    /// order has no payment still awaiting the buyer. Once the gateway has
    /// accepted the payment the handle is always returned, even if the local
    /// record cannot be written; that case is logged on the `reconciliation`
    /// target for the repair job.
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
        user_id: Uuid,
    ) -> Result<GatewayPaymentHandle, DomainError> {
        validate_request(&request)?;

        let order = self
            .orders
            .find_by_id(request.order_id)
            .await?
            .ok_or(DomainError::NotFound("Order"))?;
        if order.user_id != user_id {
            return Err(DomainError::Forbidden);
        }
        if order.status != OrderStatus::Pending {
            return Err(DomainError::Conflict(format!(
                "order {} is {}, expected pending",
                order.id, order.status
            )));
        }
        if request.amount != order.total {
            return Err(DomainError::AmountMismatch {
                requested: request.amount.to_string(),
                expected: order.total.to_string(),
            });
        }
        if let Some(active) = self.payments.find_active_for_order(order.id).await? {
            return Err(DomainError::Conflict(format!(
                "order {} already has payment {} in status {}",
                order.id, active.gateway_id, active.status
            )));
        }

        let gateway_request = GatewayPaymentRequest {
            amount: request.amount,
            currency: request.currency,
            description: request.description,
            return_url: request.return_url,
            metadata: PaymentMetadata { order_id: order.id, user_id },
        };
        let metadata = serde_json::to_value(&gateway_request.metadata)
            .map_err(|e| DomainError::Internal(e.to_string()))?;
        let idempotency_key = Uuid::new_v4().to_string();

        debug!(
            "Creating gateway payment for order {} (key {idempotency_key})",
            order.id
        );
        let created = self
            .gateway
            .create_payment(&gateway_request, &idempotency_key)
            .await?;

        let record = NewPayment {
            gateway_id: created.id.clone(),
            order_id: order.id,
            status: created.status,
            amount: created.amount.clone(),
            currency: created.currency.clone(),
            description: gateway_request.description,
            metadata,
        };
        match self.payments.create(record).await {
            Ok(payment) => info!(
                "Payment {} ({}) recorded for order {} with status {}",
                payment.id, payment.gateway_id, payment.order_id, payment.status
            ),
            Err(e) => error!(
                target: "reconciliation",
                "ORPHANED PAYMENT: gateway payment {} for order {} (amount {} {}) was created but \
                 could not be recorded locally: {e}",
                created.id, order.id, created.amount, created.currency
            ),
        }

        Ok(created.into())
    }

    /// Brings the local record in line with the gateway's authoritative state,
    /// recreating it from the gateway's metadata when it is missing.
    pub async fn reconcile(&self, gateway_id: &str) -> Result<Payment, DomainError> {
        let remote = self.gateway.get_payment(gateway_id).await?;

        if self.payments.find_by_gateway_id(gateway_id).await?.is_none() {
            let order_id = remote.order_id().ok_or_else(|| {
                DomainError::InvalidInput(format!(
                    "gateway payment {gateway_id} carries no order_id"
                ))
            })?;
            let order = self
                .orders
                .find_by_id(order_id)
                .await?
                .ok_or(DomainError::NotFound("Order"))?;
            if remote.amount != order.total {
                warn!(
                    "Gateway payment {gateway_id} amount {} differs from order {} total {}",
                    remote.amount, order.id, order.total
                );
            }
            let record = NewPayment {
                gateway_id: remote.id.clone(),
                order_id: order.id,
                // The remote status is applied below so that `succeeded` cascades.
                status: PaymentStatus::Pending,
                amount: remote.amount.clone(),
                currency: remote.currency.clone(),
                description: remote.description.clone().unwrap_or_default(),
                metadata: remote.metadata.clone(),
            };
            match self.payments.create(record).await {
                Ok(_) => info!(
                    "Restored missing payment record {gateway_id} for order {}",
                    order.id
                ),
                // Lost the race against the original write; the row exists now.
                Err(DomainError::Conflict(_)) => {
                    debug!("Payment {gateway_id} appeared concurrently")
                }
                Err(e) => return Err(e),
            }
        }

        match self.payments.apply_status(gateway_id, remote.status).await? {
            StatusChange::Applied { from, to, order_paid } => info!(
                "Reconciled payment {gateway_id}: {from} -> {to} (order paid: {order_paid})"
            ),
            StatusChange::Rejected { from, to } => warn!(
                "Gateway reports {to} for payment {gateway_id} but local record is final at {from}"
            ),
            StatusChange::Unchanged(_) | StatusChange::PaymentNotFound => {}
        }

        self.payments
            .find_by_gateway_id(gateway_id)
            .await?
            .ok_or(DomainError::NotFound("Payment"))
    }
}

fn validate_request(request: &CreatePaymentRequest) -> Result<(), DomainError> {
    if request.amount.is_negative() {
        return Err(DomainError::InvalidInput("amount must not be negative".into()));
    }
    let currency_ok = request.currency.len() == 3
        && request.currency.bytes().all(|b| b.is_ascii_uppercase());
    if !currency_ok {
        return Err(DomainError::InvalidInput(format!(
            "currency '{}' is not an ISO 4217 code",
            request.currency
        )));
    }
    if request.return_url.trim().is_empty() {
        return Err(DomainError::InvalidInput("return_url is required".into()));
    }
    Ok(())
}
