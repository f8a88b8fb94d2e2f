//! Value-transfer capability.
//!
//! The ledger never touches funds itself. `LedgerService` calls a `Custody`
//! between deciding and applying a command; an `Err` here aborts the command
//! before any record is appended or any refund flag flipped.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use paydesk_core::{AccountId, Amount};

/// Synchronous, all-or-nothing movement of funds in and out of ledger custody.
pub trait Custody: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Move `amount` from `from` into ledger custody (backs `pay`).
    fn deposit(&self, from: AccountId, amount: Amount) -> Result<(), Self::Error>;

    /// Move `amount` out of ledger custody to `to` (backs `refund` and `withdraw`).
    fn release(&self, to: AccountId, amount: Amount) -> Result<(), Self::Error>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("account {account} has {available}, needs {requested}")]
    InsufficientFunds {
        account: AccountId,
        requested: Amount,
        available: Amount,
    },

    #[error("custody holds {held}, cannot release {requested}")]
    Overdraw { requested: Amount, held: Amount },

    #[error("crediting {account} would overflow its balance")]
    Overflow { account: AccountId },

    #[error("custody lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
struct Wallets {
    accounts: HashMap<AccountId, Amount>,
    held: Amount,
}

impl Wallets {
    fn credit(&mut self, account: AccountId, amount: Amount) -> Result<(), CustodyError> {
        let entry = self.accounts.entry(account).or_default();
        *entry = entry
            .checked_add(amount)
            .ok_or(CustodyError::Overflow { account })?;
        Ok(())
    }
}

/// In-memory wallets plus a custody pool, for tests and the demo binary.
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    inner: Mutex<Wallets>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an external account (test faucet).
    pub fn fund(&self, account: AccountId, amount: Amount) -> Result<(), CustodyError> {
        let mut w = self.inner.lock().map_err(|_| CustodyError::Poisoned)?;
        w.credit(account, amount)
    }

    pub fn balance_of(&self, account: AccountId) -> Amount {
        self.inner
            .lock()
            .ok()
            .and_then(|w| w.accounts.get(&account).copied())
            .unwrap_or_default()
    }

    /// Funds currently in ledger custody.
    pub fn held(&self) -> Amount {
        self.inner.lock().map(|w| w.held).unwrap_or_default()
    }
}

impl Custody for InMemoryCustody {
    type Error = CustodyError;

    fn deposit(&self, from: AccountId, amount: Amount) -> Result<(), Self::Error> {
        let mut w = self.inner.lock().map_err(|_| CustodyError::Poisoned)?;
        let available = w.accounts.get(&from).copied().unwrap_or_default();
        if available < amount {
            return Err(CustodyError::InsufficientFunds {
                account: from,
                requested: amount,
                available,
            });
        }
        let held = w
            .held
            .checked_add(amount)
            .ok_or(CustodyError::Overflow { account: from })?;
        w.accounts.insert(from, available - amount);
        w.held = held;
        Ok(())
    }

    fn release(&self, to: AccountId, amount: Amount) -> Result<(), Self::Error> {
        let mut w = self.inner.lock().map_err(|_| CustodyError::Poisoned)?;
        if w.held < amount {
            return Err(CustodyError::Overdraw {
                requested: amount,
                held: w.held,
            });
        }
        w.credit(to, amount)?;
        w.held = w.held - amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_moves_funds_into_custody() {
        let custody = InMemoryCustody::new();
        let alice = AccountId::new();
        custody.fund(alice, Amount::new(10)).unwrap();

        custody.deposit(alice, Amount::new(4)).unwrap();

        assert_eq!(custody.balance_of(alice), Amount::new(6));
        assert_eq!(custody.held(), Amount::new(4));
    }

    #[test]
    fn deposit_beyond_wallet_fails_without_side_effects() {
        let custody = InMemoryCustody::new();
        let alice = AccountId::new();
        custody.fund(alice, Amount::new(3)).unwrap();

        let err = custody.deposit(alice, Amount::new(5)).unwrap_err();

        assert_eq!(
            err,
            CustodyError::InsufficientFunds {
                account: alice,
                requested: Amount::new(5),
                available: Amount::new(3),
            }
        );
        assert_eq!(custody.balance_of(alice), Amount::new(3));
        assert_eq!(custody.held(), Amount::ZERO);
    }

    #[test]
    fn release_cannot_overdraw_custody() {
        let custody = InMemoryCustody::new();
        let bob = AccountId::new();

        let err = custody.release(bob, Amount::new(1)).unwrap_err();

        assert!(matches!(err, CustodyError::Overdraw { .. }));
        assert_eq!(custody.balance_of(bob), Amount::ZERO);
    }

    #[test]
    fn release_that_would_overflow_recipient_moves_nothing() {
        let custody = InMemoryCustody::new();
        let payer = AccountId::new();
        let owner = AccountId::new();
        custody.fund(payer, Amount::new(10)).unwrap();
        custody.deposit(payer, Amount::new(10)).unwrap();
        custody.fund(owner, Amount::new(i128::MAX)).unwrap();

        let err = custody.release(owner, Amount::new(10)).unwrap_err();

        assert_eq!(err, CustodyError::Overflow { account: owner });
        assert_eq!(custody.held(), Amount::new(10));
        assert_eq!(custody.balance_of(owner), Amount::new(i128::MAX));
    }

    #[test]
    fn faucet_refuses_to_overflow_a_wallet() {
        let custody = InMemoryCustody::new();
        let alice = AccountId::new();
        custody.fund(alice, Amount::new(i128::MAX)).unwrap();

        let err = custody.fund(alice, Amount::new(1)).unwrap_err();

        assert_eq!(err, CustodyError::Overflow { account: alice });
        assert_eq!(custody.balance_of(alice), Amount::new(i128::MAX));
    }
}
