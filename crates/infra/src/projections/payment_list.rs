//! Payment list projection.
//!
//! The list/status view a front end renders: one row per payment with its
//! refund status, plus the running held balance. Rebuildable from the journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use paydesk_core::{AccountId, Amount, PaymentId};
use paydesk_events::{EventEnvelope, Projection};
use paydesk_payments::{LedgerEvent, PaymentStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRow {
    pub id: PaymentId,
    pub sender: AccountId,
    pub amount: Amount,
    pub message: String,
    pub received_at: DateTime<Utc>,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentListProjection {
    rows: Vec<PaymentRow>,
    held: Amount,
}

impl PaymentListProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[PaymentRow] {
        &self.rows
    }

    pub fn row(&self, id: PaymentId) -> Option<&PaymentRow> {
        id.as_usize().and_then(|idx| self.rows.get(idx))
    }

    pub fn total_payments(&self) -> usize {
        self.rows.len()
    }

    pub fn refunded_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.status == PaymentStatus::Refunded)
            .count()
    }

    pub fn held(&self) -> Amount {
        self.held
    }
}

impl Projection for PaymentListProjection {
    type Ev = LedgerEvent;

    fn apply(&mut self, envelope: &EventEnvelope<LedgerEvent>) {
        match envelope.payload() {
            LedgerEvent::PaymentReceived(e) => {
                // Rows are positional; anything but the next id is a duplicate.
                if e.payment_id.as_usize() != Some(self.rows.len()) {
                    return;
                }
                self.rows.push(PaymentRow {
                    id: e.payment_id,
                    sender: e.sender,
                    amount: e.amount,
                    message: e.message.clone(),
                    received_at: e.occurred_at,
                    status: PaymentStatus::Active,
                });
                self.held = self.held + e.amount;
            }
            LedgerEvent::RefundIssued(e) => {
                let Some(row) = e.payment_id.as_usize().and_then(|idx| self.rows.get_mut(idx)) else {
                    return;
                };
                if row.status == PaymentStatus::Refunded {
                    return;
                }
                row.status = PaymentStatus::Refunded;
                self.held = self.held - e.amount;
            }
            LedgerEvent::FundsWithdrawn(e) => {
                self.held = self.held - e.amount;
            }
        }
    }
}
