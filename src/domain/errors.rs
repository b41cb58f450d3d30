use thiserror::Error;

/// Coarse classification of a failure, matched exhaustively at the HTTP edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RequestParams,
    Forbidden,
    Conflict,
    RowsNotFound,
    GatewayError,
    InternalServer,
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Payment amount {requested} does not match order total {expected}")]
    AmountMismatch { requested: String, expected: String },
    #[error("Forbidden")]
    Forbidden,
    #[error("Invalid webhook signature")]
    InvalidSignature,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidInput(_)
            | DomainError::EmptyCart
            | DomainError::AmountMismatch { .. } => ErrorKind::RequestParams,
            DomainError::Forbidden | DomainError::InvalidSignature => ErrorKind::Forbidden,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::NotFound(_) => ErrorKind::RowsNotFound,
            DomainError::Gateway(_) => ErrorKind::GatewayError,
            DomainError::Internal(_) => ErrorKind::InternalServer,
        }
    }
}
