use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use super::errors::DomainError;
use super::order::{Order, OrderPage, OrderStatus};
use super::payment::{
    GatewayPayment, GatewayPaymentRequest, NewPayment, Payment, PaymentStatus, StatusChange,
};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync + 'static {
    /// Drain the user's cart into a new pending order in one transaction.
    async fn create_from_cart(&self, user_id: Uuid) -> Result<Order, DomainError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError>;
    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<OrderPage, DomainError>;
    /// Moves the order to `to` only if it is still in `from`. Returns whether a row changed.
    async fn transition_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, DomainError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentRepository: Send + Sync + 'static {
    async fn create(&self, payment: NewPayment) -> Result<Payment, DomainError>;
    async fn find_by_gateway_id(&self, gateway_id: &str) -> Result<Option<Payment>, DomainError>;
    /// Latest payment for the order that is still `pending` or `waiting_for_capture`.
    async fn find_active_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, DomainError>;
    /// Merge a gateway-reported status, cascading `succeeded` to the order as `paid`.
    async fn apply_status(
        &self,
        gateway_id: &str,
        status: PaymentStatus,
    ) -> Result<StatusChange, DomainError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn create_payment(
        &self,
        request: &GatewayPaymentRequest,
        idempotency_key: &str,
    ) -> Result<GatewayPayment, DomainError>;
    async fn get_payment(&self, gateway_id: &str) -> Result<GatewayPayment, DomainError>;
}
