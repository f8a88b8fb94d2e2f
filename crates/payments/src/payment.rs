use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use paydesk_core::{AccountId, Amount, Entity, PaymentId};

/// Refund state of a single payment.
///
/// `Active -> Refunded` is the only transition, and it is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Active,
    Refunded,
}

/// One received payment. Everything but `status` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    sender: AccountId,
    /// Positive amount in base units.
    amount: Amount,
    message: String,
    timestamp: DateTime<Utc>,
    status: PaymentStatus,
}

impl Payment {
    pub(crate) fn received(
        id: PaymentId,
        sender: AccountId,
        amount: Amount,
        message: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            sender,
            amount,
            message,
            timestamp,
            status: PaymentStatus::Active,
        }
    }

    pub(crate) fn mark_refunded(&mut self) {
        self.status = PaymentStatus::Refunded;
    }

    pub fn payment_id(&self) -> PaymentId {
        self.id
    }

    pub fn sender(&self) -> AccountId {
        self.sender
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn is_refunded(&self) -> bool {
        self.status == PaymentStatus::Refunded
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
