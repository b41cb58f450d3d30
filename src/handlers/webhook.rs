use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;
use serde_json::json;

use crate::config::WebhookConfig;
use crate::errors::AppError;

use super::Webhooks;

/// POST /payments/webhook
///
/// Receives gateway notifications. The raw body is verified against the
/// signature header before it is parsed. Anything correctly signed is
/// acknowledged with 200 so the gateway stops redelivering; a storage failure
/// answers 500 so it tries again.
#[utoipa::path(
    post,
    path = "/payments/webhook",
    request_body(
        content = String,
        description = "Gateway notification JSON",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Notification acknowledged"),
        (status = 403, description = "Signature missing or invalid"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "payments"
)]
pub async fn handle_webhook(
    service: web::Data<Webhooks>,
    config: web::Data<WebhookConfig>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(config.signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    let outcome = service.handle_webhook(&body, signature).await?;
    debug!("Webhook outcome: {outcome:?}");

    Ok(HttpResponse::Ok().json(json!({})))
}
