//! Domain error model.

use thiserror::Error;

use crate::id::PaymentId;
use crate::money::Amount;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a caller error detected before any mutation; a rejected
/// operation leaves the ledger exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Payment amount was zero or negative.
    #[error("payment must be greater than 0")]
    InvalidAmount,

    /// A non-owner attempted an owner-only operation.
    #[error("only the owner can perform this operation")]
    Unauthorized,

    /// The payment id does not refer to an existing record.
    #[error("invalid payment id: {0}")]
    InvalidPaymentId(PaymentId),

    /// The payment has already been refunded.
    #[error("payment {0} already refunded")]
    AlreadyRefunded(PaymentId),

    /// The ledger does not hold enough funds to cover the transfer.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    /// The payment message exceeds the configured bound (in bytes).
    #[error("message too long: {len} bytes (max {max})")]
    MessageTooLong { len: usize, max: usize },

    /// Accepting the payment would overflow the held balance.
    #[error("balance overflow")]
    BalanceOverflow,

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
