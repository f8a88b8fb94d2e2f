//! Payment ledger (owner-gated, append-only, event-sourced).
//!
//! Pure domain logic only: no IO, no locking, no funds movement. The
//! infrastructure layer performs transfers between `handle` and `apply`.

pub mod event;
pub mod ledger;
pub mod payment;

pub use event::{FundsWithdrawn, LedgerEvent, PaymentReceived, RefundIssued};
pub use ledger::{
    DEFAULT_MAX_MESSAGE_LEN, Ledger, LedgerCommand, Pay, Refund, Withdraw,
};
pub use payment::{Payment, PaymentStatus};
