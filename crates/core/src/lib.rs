//! `paydesk-core`: domain foundation for the payment ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identities, money, payment positions, the aggregate traits and the error model.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, LedgerId, PaymentId};
pub use money::Amount;
pub use value_object::ValueObject;
