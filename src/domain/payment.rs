use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::DomainError;
use super::money::Money;

/// Payment lifecycle as reported by the gateway.
///
/// `pending` may move to any other state, `waiting_for_capture` may still be
/// captured or cancelled, and `succeeded`/`canceled` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    WaitingForCapture,
    Succeeded,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::WaitingForCapture => "waiting_for_capture",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded | PaymentStatus::Canceled)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match self {
            Pending => next != Pending,
            WaitingForCapture => matches!(next, Succeeded | Canceled),
            Succeeded | Canceled => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "waiting_for_capture" => Ok(PaymentStatus::WaitingForCapture),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "canceled" => Ok(PaymentStatus::Canceled),
            other => Err(DomainError::Internal(format!("unknown payment status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub gateway_id: String,
    pub order_id: Uuid,
    pub status: PaymentStatus,
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub gateway_id: String,
    pub order_id: Uuid,
    pub status: PaymentStatus,
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub metadata: Value,
}

/// What the client asks for when starting a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub return_url: String,
}

/// Links a gateway payment back to the local order and its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub order_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPaymentRequest {
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub return_url: String,
    pub metadata: PaymentMetadata,
}

/// The gateway's view of a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPayment {
    pub id: String,
    pub status: PaymentStatus,
    pub amount: Money,
    pub currency: String,
    pub description: Option<String>,
    pub confirmation_url: Option<String>,
    pub metadata: Value,
}

impl GatewayPayment {
    /// The local order this payment belongs to, if the gateway echoed it back.
    pub fn order_id(&self) -> Option<Uuid> {
        self.metadata
            .get("order_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Returned to the client so it can be redirected to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPaymentHandle {
    pub gateway_id: String,
    pub status: PaymentStatus,
    pub confirmation_url: Option<String>,
    pub amount: Money,
    pub currency: String,
}

impl From<GatewayPayment> for GatewayPaymentHandle {
    fn from(p: GatewayPayment) -> Self {
        Self {
            gateway_id: p.id,
            status: p.status,
            confirmation_url: p.confirmation_url,
            amount: p.amount,
            currency: p.currency,
        }
    }
}

/// Result of merging a reported status into the local payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// No local payment carries this gateway id (yet).
    PaymentNotFound,
    /// The record already holds the reported status.
    Unchanged(PaymentStatus),
    /// The state machine forbids the move; nothing was written.
    Rejected { from: PaymentStatus, to: PaymentStatus },
    Applied {
        from: PaymentStatus,
        to: PaymentStatus,
        order_paid: bool,
    },
}
