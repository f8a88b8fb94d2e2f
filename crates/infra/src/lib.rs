//! Infrastructure layer: serialized ledger execution, custody, read models, config.

pub mod config;
pub mod custody;
pub mod error;
pub mod projections;
pub mod service;

pub use config::LedgerConfig;
pub use custody::{Custody, CustodyError, InMemoryCustody};
pub use error::ServiceError;
pub use projections::{PaymentListProjection, PaymentRow};
pub use service::{AGGREGATE_TYPE, LedgerEnvelope, LedgerService};
