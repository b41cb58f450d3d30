pub mod orders;
pub mod payments;
pub mod webhook;

use std::future::{ready, Ready};

use actix_web::http::header::AUTHORIZATION;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use log::warn;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::application::order_service::OrderService;
use crate::application::payment_service::PaymentService;
use crate::application::webhook_service::WebhookService;
use crate::config::Secret;
use crate::errors::AppError;
use crate::infrastructure::gateway::HttpPaymentGateway;
use crate::infrastructure::order_repo::DieselOrderRepository;
use crate::infrastructure::payment_repo::DieselPaymentRepository;

pub type Orders = OrderService<DieselOrderRepository>;
pub type Payments =
    PaymentService<DieselOrderRepository, DieselPaymentRepository, HttpPaymentGateway>;
pub type Webhooks = WebhookService<DieselPaymentRepository>;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// The authenticated caller, as forwarded by the upstream auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

impl FromRequest for UserId {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user = req
            .headers()
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::BadRequest(format!("{USER_ID_HEADER} header is required")))
            .and_then(|v| {
                v.to_str()
                    .ok()
                    .and_then(|s| Uuid::parse_str(s.trim()).ok())
                    .ok_or_else(|| {
                        AppError::BadRequest(format!("{USER_ID_HEADER} is not a valid user id"))
                    })
            });
        ready(user.map(UserId))
    }
}

/// The configured operator credential, shared with the `Operator` extractor.
#[derive(Debug, Clone, Default)]
pub struct OperatorToken(pub Option<Secret<String>>);

impl OperatorToken {
    fn matches(&self, presented: &str) -> bool {
        match &self.0 {
            // Digests have a fixed length, so comparing them leaks nothing useful.
            Some(token) => {
                Sha256::digest(token.reveal().as_bytes()) == Sha256::digest(presented.as_bytes())
            }
            None => false,
        }
    }
}

/// Proof that the caller holds the operator token (`Authorization: Bearer …`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator;

impl FromRequest for Operator {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let Some(expected) = req.app_data::<web::Data<OperatorToken>>() else {
            return ready(Err(AppError::Forbidden("Operator routes are disabled".into())));
        };
        let presented = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        match presented {
            Some(token) if expected.matches(token) => ready(Ok(Operator)),
            _ => {
                warn!("Refused operator call to {} from {:?}", req.path(), req.peer_addr());
                ready(Err(AppError::Forbidden("Operator credentials required".into())))
            }
        }
    }
}
