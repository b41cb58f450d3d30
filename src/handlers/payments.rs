use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::money::Money;
use crate::domain::payment::{CreatePaymentRequest, GatewayPaymentHandle, Payment};
use crate::errors::AppError;

use super::{Operator, Payments, UserId};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentBody {
    pub order_id: Uuid,
    /// Decimal string that must equal the order total exactly, e.g. "24.00"
    #[schema(value_type = String, example = "24.00")]
    pub amount: Money,
    #[schema(example = "RUB")]
    pub currency: String,
    pub description: String,
    /// Where the gateway sends the buyer after confirmation
    pub return_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentHandleResponse {
    pub gateway_id: String,
    pub status: String,
    pub confirmation_url: Option<String>,
    #[schema(value_type = String, example = "24.00")]
    pub amount: Money,
    pub currency: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub gateway_id: String,
    pub order_id: Uuid,
    pub status: String,
    #[schema(value_type = String, example = "24.00")]
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GatewayPaymentHandle> for PaymentHandleResponse {
    fn from(h: GatewayPaymentHandle) -> Self {
        Self {
            gateway_id: h.gateway_id,
            status: h.status.to_string(),
            confirmation_url: h.confirmation_url,
            amount: h.amount,
            currency: h.currency,
        }
    }
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            gateway_id: p.gateway_id,
            order_id: p.order_id,
            status: p.status.to_string(),
            amount: p.amount,
            currency: p.currency,
            description: p.description,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// POST /payments
///
/// Starts a gateway payment for one of the caller's pending orders. The
/// response carries the URL the buyer must be redirected to.
#[utoipa::path(
    post,
    path = "/payments",
    request_body = CreatePaymentBody,
    params(
        ("X-User-Id" = Uuid, Header, description = "Authenticated user"),
    ),
    responses(
        (status = 201, description = "Payment started", body = PaymentHandleResponse),
        (status = 400, description = "Invalid request or amount differs from the order total"),
        (status = 403, description = "Order belongs to another user"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not pending"),
        (status = 500, description = "Gateway rejected or did not answer, or internal error"),
    ),
    tag = "payments"
)]
pub async fn create_payment(
    service: web::Data<Payments>,
    user: UserId,
    body: web::Json<CreatePaymentBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let request = CreatePaymentRequest {
        order_id: body.order_id,
        amount: body.amount,
        currency: body.currency,
        description: body.description,
        return_url: body.return_url,
    };
    let handle = service.create_payment(request, user.0).await?;
    Ok(HttpResponse::Created().json(PaymentHandleResponse::from(handle)))
}

/// POST /payments/{gateway_id}/reconcile
///
/// Re-reads the payment from the gateway and applies its status locally,
/// recreating the local record if it was never written. Operators only.
#[utoipa::path(
    post,
    path = "/payments/{gateway_id}/reconcile",
    params(
        ("gateway_id" = String, Path, description = "Gateway payment id"),
        ("Authorization" = String, Header, description = "Bearer operator token"),
    ),
    responses(
        (status = 200, description = "Local payment after reconciliation", body = PaymentResponse),
        (status = 400, description = "Gateway payment carries no order reference"),
        (status = 403, description = "Operator token missing or wrong"),
        (status = 404, description = "Referenced order not found"),
        (status = 500, description = "Gateway rejected or did not answer, or internal error"),
    ),
    tag = "payments"
)]
pub async fn reconcile_payment(
    _operator: Operator,
    service: web::Data<Payments>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let payment = service.reconcile(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}
