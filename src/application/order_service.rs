use log::info;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderPage, OrderStatus, Paging};
use crate::domain::ports::OrderRepository;

pub struct OrderService<R> {
    repo: R,
}

impl<R: OrderRepository> OrderService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Turns the user's cart into a pending order. An empty cart is refused
    /// and leaves no order behind.
    pub async fn create_order(&self, user_id: Uuid) -> Result<Order, DomainError> {
        let order = self.repo.create_from_cart(user_id).await?;
        info!(
            "Created order {} for user {} ({} items, total {})",
            order.id,
            user_id,
            order.items.len(),
            order.total
        );
        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid, user_id: Uuid) -> Result<Order, DomainError> {
        let order = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(DomainError::NotFound("Order"))?;
        if order.user_id != user_id {
            return Err(DomainError::Forbidden);
        }
        Ok(order)
    }

    pub async fn list_orders(
        &self,
        user_id: Uuid,
        paging: Paging,
    ) -> Result<OrderPage, DomainError> {
        self.repo
            .list_for_user(user_id, paging.page(), paging.limit())
            .await
    }

    pub async fn cancel_order(&self, id: Uuid, user_id: Uuid) -> Result<Order, DomainError> {
        let mut order = self.get_order(id, user_id).await?;
        // Customers may only withdraw an order that has not been paid yet. The
        // repository refuses anything the status machine does not allow.
        if order.status != OrderStatus::Pending {
            return Err(DomainError::Conflict(format!(
                "order {id} is {} and cannot be cancelled",
                order.status
            )));
        }
        // Guarded update: a webhook may have marked the order paid meanwhile.
        let changed = self
            .repo
            .transition_status(id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await?;
        if !changed {
            return Err(DomainError::Conflict(format!(
                "order {id} changed status concurrently"
            )));
        }
        info!("Order {id} cancelled by user {user_id}");
        order.status = OrderStatus::Cancelled;
        Ok(order)
    }
}
