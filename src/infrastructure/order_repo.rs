use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::db::{run_blocking, DbPool};
use crate::domain::errors::DomainError;
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderPage, OrderStatus};
use crate::domain::ports::OrderRepository;
use crate::schema::{cart_items, order_items, order_outbox, orders, products};

use super::models::{NewOrderItemRow, NewOrderRow, NewOutboxEventRow, OrderItemRow, OrderRow};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for DieselOrderRepository {
    async fn create_from_cart(&self, user_id: Uuid) -> Result<Order, DomainError> {
        run_blocking(&self.pool, move |conn| drain_cart(conn, user_id)).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        run_blocking(&self.pool, move |conn| {
            let order = orders::table
                .filter(orders::id.eq(id))
                .select(OrderRow::as_select())
                .first(conn)
                .optional()?;

            let Some(order) = order else {
                return Ok(None);
            };

            let items = OrderItemRow::belonging_to(&order)
                .select(OrderItemRow::as_select())
                .order((order_items::created_at.asc(), order_items::name.asc()))
                .load(conn)?;

            order.into_order(items).map(Some)
        })
        .await
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<OrderPage, DomainError> {
        let offset = (page - 1) * limit;
        run_blocking(&self.pool, move |conn| {
            conn.transaction::<_, DomainError, _>(|conn| {
                let total: i64 = orders::table
                    .filter(orders::user_id.eq(user_id))
                    .count()
                    .get_result(conn)?;

                let rows: Vec<OrderRow> = orders::table
                    .filter(orders::user_id.eq(user_id))
                    .select(OrderRow::as_select())
                    .order(orders::created_at.desc())
                    .limit(limit)
                    .offset(offset)
                    .load(conn)?;

                let items = OrderItemRow::belonging_to(&rows)
                    .select(OrderItemRow::as_select())
                    .order((order_items::created_at.asc(), order_items::name.asc()))
                    .load::<OrderItemRow>(conn)?
                    .grouped_by(&rows);

                let items = rows
                    .into_iter()
                    .zip(items)
                    .map(|(order, items)| order.into_order(items))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(OrderPage { items, total })
            })
        })
        .await
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, DomainError> {
        if !from.can_transition_to(to) {
            return Err(DomainError::Conflict(format!(
                "order status cannot move from {from} to {to}"
            )));
        }
        run_blocking(&self.pool, move |conn| {
            let updated = diesel::update(
                orders::table
                    .filter(orders::id.eq(id))
                    .filter(orders::status.eq(from.as_str())),
            )
            .set((orders::status.eq(to.as_str()), orders::updated_at.eq(Utc::now())))
            .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }
}

/// Moves every cart row of `user_id` into a new order.
///
/// The cart rows are locked first, so a concurrent drain for the same user
/// blocks here and then finds the cart empty. Prices, names and images are
/// copied from the catalog inside the same transaction.
fn drain_cart(conn: &mut PgConnection, user_id: Uuid) -> Result<Order, DomainError> {
    conn.transaction::<_, DomainError, _>(|conn| {
        // 0. Lock the cart; refuse to create an order from nothing.
        let cart_ids: Vec<Uuid> = cart_items::table
            .filter(cart_items::user_id.eq(user_id))
            .select(cart_items::id)
            .for_update()
            .load(conn)?;
        if cart_ids.is_empty() {
            return Err(DomainError::EmptyCart);
        }

        let lines: Vec<(Uuid, String, Option<String>, BigDecimal, i32)> = cart_items::table
            .inner_join(products::table)
            .filter(cart_items::id.eq_any(&cart_ids))
            .select((
                cart_items::product_id,
                products::name,
                products::card_image,
                products::price,
                cart_items::quantity,
            ))
            .order(cart_items::created_at.asc())
            .load(conn)?;

        // 1. Order shell
        let order_id = Uuid::new_v4();
        diesel::insert_into(orders::table)
            .values(&NewOrderRow {
                id: order_id,
                user_id,
                status: OrderStatus::Pending.as_str().to_string(),
                total: BigDecimal::zero(),
            })
            .execute(conn)?;

        // 2. Snapshot the lines
        let new_items: Vec<NewOrderItemRow> = lines
            .into_iter()
            .map(|(product_id, name, card_image, unit_price, quantity)| NewOrderItemRow {
                id: Uuid::new_v4(),
                order_id,
                product_id,
                name,
                card_image,
                unit_price,
                quantity,
            })
            .collect();
        let items: Vec<OrderItemRow> = diesel::insert_into(order_items::table)
            .values(&new_items)
            .returning(OrderItemRow::as_returning())
            .get_results(conn)?;

        // 3. Total from the copied rows only
        let total: Money = items
            .iter()
            .map(|i| Money::from(i.unit_price.clone()).times(i.quantity))
            .sum();
        let order: OrderRow = diesel::update(orders::table.find(order_id))
            .set((
                orders::total.eq(total.clone().into_decimal()),
                orders::updated_at.eq(Utc::now()),
            ))
            .returning(OrderRow::as_returning())
            .get_result(conn)?;

        // 4. Empty the cart
        diesel::delete(cart_items::table.filter(cart_items::id.eq_any(&cart_ids))).execute(conn)?;

        // 5. Outbox event, committed with the order
        let item_payloads: Vec<serde_json::Value> = items
            .iter()
            .map(|i| {
                json!({
                    "product_id": i.product_id,
                    "name": i.name,
                    "quantity": i.quantity,
                    "unit_price": i.unit_price.to_string()
                })
            })
            .collect();
        diesel::insert_into(order_outbox::table)
            .values(&NewOutboxEventRow::order_event(
                order_id,
                "OrderCreated",
                json!({
                    "order_id": order_id,
                    "user_id": user_id,
                    "status": OrderStatus::Pending.as_str(),
                    "total": total.to_string(),
                    "items": item_payloads
                }),
            ))
            .execute(conn)?;

        order.into_order(items)
    })
}
