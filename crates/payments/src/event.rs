use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use paydesk_core::{AccountId, Amount, PaymentId};
use paydesk_events::Event;

/// Event: a payment was accepted and appended at `payment_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceived {
    pub payment_id: PaymentId,
    pub sender: AccountId,
    pub amount: Amount,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: payment `payment_id` was returned to its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundIssued {
    pub payment_id: PaymentId,
    pub sender: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: the owner swept the held balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsWithdrawn {
    pub owner: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    PaymentReceived(PaymentReceived),
    RefundIssued(RefundIssued),
    FundsWithdrawn(FundsWithdrawn),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::PaymentReceived(_) => "payments.ledger.payment_received",
            LedgerEvent::RefundIssued(_) => "payments.ledger.refund_issued",
            LedgerEvent::FundsWithdrawn(_) => "payments.ledger.funds_withdrawn",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::PaymentReceived(e) => e.occurred_at,
            LedgerEvent::RefundIssued(e) => e.occurred_at,
            LedgerEvent::FundsWithdrawn(e) => e.occurred_at,
        }
    }
}
