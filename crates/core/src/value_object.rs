//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. `Amount` is one:
/// two amounts of 100 base units are the same amount, whoever holds them.
///
/// ```ignore
/// use paydesk_core::{Amount, ValueObject};
///
/// fn assert_value_object<T: ValueObject>() {}
/// assert_value_object::<Amount>();
/// assert_eq!(Amount::new(100), Amount::new(100));
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
