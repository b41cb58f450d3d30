use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::warn;
use serde_json::json;
use uuid::Uuid;

use crate::db::{run_blocking, DbPool};
use crate::domain::errors::DomainError;
use crate::domain::order::OrderStatus;
use crate::domain::payment::{NewPayment, Payment, PaymentStatus, StatusChange};
use crate::domain::ports::PaymentRepository;
use crate::schema::{order_outbox, orders, payments};

use super::models::{NewOutboxEventRow, NewPaymentRow, PaymentRow};

#[derive(Clone)]
pub struct DieselPaymentRepository {
    pool: DbPool,
}

impl DieselPaymentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for DieselPaymentRepository {
    async fn create(&self, payment: NewPayment) -> Result<Payment, DomainError> {
        run_blocking(&self.pool, move |conn| {
            let gateway_id = payment.gateway_id.clone();
            let row = diesel::insert_into(payments::table)
                .values(&NewPaymentRow {
                    id: Uuid::new_v4(),
                    gateway_id: payment.gateway_id,
                    order_id: payment.order_id,
                    status: payment.status.as_str().to_string(),
                    amount: payment.amount.into_decimal(),
                    currency: payment.currency,
                    description: payment.description,
                    metadata: payment.metadata,
                })
                .returning(PaymentRow::as_returning())
                .get_result(conn)
                .map_err(|e| match e {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        DomainError::Conflict(format!("payment {gateway_id} is already recorded"))
                    }
                    other => other.into(),
                })?;
            Payment::try_from(row)
        })
        .await
    }

    async fn find_by_gateway_id(&self, gateway_id: &str) -> Result<Option<Payment>, DomainError> {
        let gateway_id = gateway_id.to_string();
        run_blocking(&self.pool, move |conn| {
            payments::table
                .filter(payments::gateway_id.eq(&gateway_id))
                .select(PaymentRow::as_select())
                .first(conn)
                .optional()?
                .map(Payment::try_from)
                .transpose()
        })
        .await
    }

    async fn find_active_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, DomainError> {
        run_blocking(&self.pool, move |conn| {
            payments::table
                .filter(payments::order_id.eq(order_id))
                .filter(payments::status.eq_any([
                    PaymentStatus::Pending.as_str(),
                    PaymentStatus::WaitingForCapture.as_str(),
                ]))
                .order(payments::created_at.desc())
                .select(PaymentRow::as_select())
                .first(conn)
                .optional()?
                .map(Payment::try_from)
                .transpose()
        })
        .await
    }

    async fn apply_status(
        &self,
        gateway_id: &str,
        status: PaymentStatus,
    ) -> Result<StatusChange, DomainError> {
        let gateway_id = gateway_id.to_string();
        run_blocking(&self.pool, move |conn| {
            conn.transaction::<_, DomainError, _>(|conn| merge_status(conn, &gateway_id, status))
        })
        .await
    }
}

/// Applies `status` to the payment under a row lock, so concurrent deliveries
/// of the same event serialise and only the first one changes anything.
fn merge_status(
    conn: &mut PgConnection,
    gateway_id: &str,
    status: PaymentStatus,
) -> Result<StatusChange, DomainError> {
    let row = payments::table
        .filter(payments::gateway_id.eq(gateway_id))
        .select(PaymentRow::as_select())
        .for_update()
        .first(conn)
        .optional()?;
    let Some(row) = row else {
        return Ok(StatusChange::PaymentNotFound);
    };

    let current: PaymentStatus = row.status.parse()?;
    if current == status {
        return Ok(StatusChange::Unchanged(current));
    }
    if current.is_terminal() || !current.can_transition_to(status) {
        return Ok(StatusChange::Rejected { from: current, to: status });
    }

    let now = Utc::now();
    diesel::update(payments::table.find(row.id))
        .set((payments::status.eq(status.as_str()), payments::updated_at.eq(now)))
        .execute(conn)?;

    let mut order_paid = false;
    if status == PaymentStatus::Succeeded {
        let updated = diesel::update(
            orders::table
                .filter(orders::id.eq(row.order_id))
                .filter(orders::status.eq(OrderStatus::Pending.as_str())),
        )
        .set((orders::status.eq(OrderStatus::Paid.as_str()), orders::updated_at.eq(now)))
        .execute(conn)?;
        order_paid = updated == 1;

        if order_paid {
            diesel::insert_into(order_outbox::table)
                .values(&NewOutboxEventRow::order_event(
                    row.order_id,
                    "OrderPaid",
                    json!({
                        "order_id": row.order_id,
                        "payment_id": row.id,
                        "gateway_id": row.gateway_id,
                        "amount": row.amount.to_string(),
                        "currency": row.currency,
                    }),
                ))
                .execute(conn)?;
        } else {
            warn!(
                target: "reconciliation",
                "Payment {gateway_id} succeeded but order {} was no longer pending",
                row.order_id
            );
        }
    }

    Ok(StatusChange::Applied { from: current, to: status, order_paid })
}
