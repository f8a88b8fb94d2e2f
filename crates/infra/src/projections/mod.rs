//! Read models built from the ledger journal / bus.

pub mod payment_list;

pub use payment_list::{PaymentListProjection, PaymentRow};
