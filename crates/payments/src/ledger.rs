use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use paydesk_core::{
    AccountId, Aggregate, AggregateRoot, Amount, DomainError, DomainResult, LedgerId, PaymentId,
};
use paydesk_events::Command;

use crate::event::{FundsWithdrawn, LedgerEvent, PaymentReceived, RefundIssued};
use crate::payment::{Payment, PaymentStatus};

/// Default upper bound on a payment message, in bytes.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 1024;

/// Aggregate root: Ledger (payments received on behalf of a single owner).
///
/// `payments` is append-only and indexed by `PaymentId`; `balance` is the
/// currency currently held and is maintained incrementally by `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    owner: AccountId,
    payments: Vec<Payment>,
    balance: Amount,
    withdrawn: Amount,
    max_message_len: usize,
    version: u64,
}

impl Ledger {
    /// Open an empty ledger owned by `owner`. The owner never changes.
    pub fn open(id: LedgerId, owner: AccountId) -> Self {
        Self {
            id,
            owner,
            payments: Vec::new(),
            balance: Amount::ZERO,
            withdrawn: Amount::ZERO,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            version: 0,
        }
    }

    pub fn with_message_limit(mut self, max_message_len: usize) -> Self {
        self.max_message_len = max_message_len;
        self
    }

    /// Rebuild a ledger by applying a journal in order.
    pub fn replay<'a>(
        id: LedgerId,
        owner: AccountId,
        events: impl IntoIterator<Item = &'a LedgerEvent>,
    ) -> Self {
        let mut ledger = Self::open(id, owner);
        for event in events {
            ledger.apply(event);
        }
        ledger
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    pub fn total_payments(&self) -> u64 {
        self.payments.len() as u64
    }

    /// All payments in id order.
    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn payment(&self, id: PaymentId) -> DomainResult<&Payment> {
        id.as_usize()
            .and_then(|idx| self.payments.get(idx))
            .ok_or(DomainError::InvalidPaymentId(id))
    }

    /// Currency currently held by the ledger.
    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Total swept to the owner over the ledger's lifetime.
    pub fn withdrawn(&self) -> Amount {
        self.withdrawn
    }

    /// Sum of active (un-refunded) payment amounts. Computed by summation;
    /// used to audit `balance`, never to drive it. After a sweep this can
    /// exceed what an `Amount` holds.
    pub fn outstanding(&self) -> DomainResult<Amount> {
        self.active_amounts()
            .try_fold(Amount::ZERO, Amount::checked_add)
            .ok_or_else(|| DomainError::invariant("outstanding payments overflow"))
    }

    /// Balance conservation: held = received - refunded - withdrawn.
    pub fn check_conservation(&self) -> DomainResult<()> {
        // Starting from -withdrawn and adding positive amounts climbs towards
        // the held balance, so a consistent ledger never overflows here.
        let expected = Amount::ZERO
            .checked_sub(self.withdrawn)
            .and_then(|start| self.active_amounts().try_fold(start, Amount::checked_add))
            .ok_or_else(|| DomainError::invariant("conservation sum overflows"))?;

        if self.balance != expected {
            return Err(DomainError::invariant(format!(
                "held balance {} does not match outstanding minus withdrawn {}",
                self.balance, expected
            )));
        }
        Ok(())
    }

    fn active_amounts(&self) -> impl Iterator<Item = Amount> + '_ {
        self.payments
            .iter()
            .filter(|p| p.status() == PaymentStatus::Active)
            .map(Payment::amount)
    }

    fn next_payment_id(&self) -> PaymentId {
        PaymentId::new(self.payments.len() as u64)
    }

    fn ensure_ledger(&self, ledger_id: LedgerId) -> DomainResult<()> {
        if ledger_id != self.id {
            return Err(DomainError::invariant("ledger mismatch"));
        }
        Ok(())
    }

    fn ensure_owner(&self, caller: AccountId) -> DomainResult<()> {
        if caller != self.owner {
            return Err(DomainError::Unauthorized);
        }
        Ok(())
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: Pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pay {
    pub ledger_id: LedgerId,
    pub caller: AccountId,
    pub message: String,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Refund (owner only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub ledger_id: LedgerId,
    pub caller: AccountId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Withdraw (owner only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdraw {
    pub ledger_id: LedgerId,
    pub caller: AccountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Pay(Pay),
    Refund(Refund),
    Withdraw(Withdraw),
}

impl Command for LedgerCommand {
    fn target_ledger_id(&self) -> LedgerId {
        match self {
            LedgerCommand::Pay(c) => c.ledger_id,
            LedgerCommand::Refund(c) => c.ledger_id,
            LedgerCommand::Withdraw(c) => c.ledger_id,
        }
    }
}

impl Aggregate for Ledger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::PaymentReceived(e) => {
                self.payments.push(Payment::received(
                    e.payment_id,
                    e.sender,
                    e.amount,
                    e.message.clone(),
                    e.occurred_at,
                ));
                self.balance = self.balance + e.amount;
            }
            LedgerEvent::RefundIssued(e) => {
                if let Some(payment) = e
                    .payment_id
                    .as_usize()
                    .and_then(|idx| self.payments.get_mut(idx))
                {
                    payment.mark_refunded();
                }
                self.balance = self.balance - e.amount;
            }
            LedgerEvent::FundsWithdrawn(e) => {
                self.balance = self.balance - e.amount;
                self.withdrawn = self.withdrawn + e.amount;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.ensure_ledger(command.target_ledger_id())?;

        match command {
            LedgerCommand::Pay(cmd) => self.handle_pay(cmd),
            LedgerCommand::Refund(cmd) => self.handle_refund(cmd),
            LedgerCommand::Withdraw(cmd) => self.handle_withdraw(cmd),
        }
    }
}

impl Ledger {
    fn handle_pay(&self, cmd: &Pay) -> Result<Vec<LedgerEvent>, DomainError> {
        if !cmd.amount.is_positive() {
            return Err(DomainError::InvalidAmount);
        }
        if cmd.message.len() > self.max_message_len {
            return Err(DomainError::MessageTooLong {
                len: cmd.message.len(),
                max: self.max_message_len,
            });
        }
        if self.balance.checked_add(cmd.amount).is_none() {
            return Err(DomainError::BalanceOverflow);
        }

        Ok(vec![LedgerEvent::PaymentReceived(PaymentReceived {
            payment_id: self.next_payment_id(),
            sender: cmd.caller,
            amount: cmd.amount,
            message: cmd.message.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refund(&self, cmd: &Refund) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_owner(cmd.caller)?;

        let payment = self.payment(cmd.payment_id)?;
        if payment.is_refunded() {
            return Err(DomainError::AlreadyRefunded(cmd.payment_id));
        }
        // Funds already swept by `withdraw` cannot be returned.
        if payment.amount() > self.balance {
            return Err(DomainError::InsufficientBalance {
                requested: payment.amount(),
                available: self.balance,
            });
        }

        Ok(vec![LedgerEvent::RefundIssued(RefundIssued {
            payment_id: cmd.payment_id,
            sender: payment.sender(),
            amount: payment.amount(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_withdraw(&self, cmd: &Withdraw) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_owner(cmd.caller)?;

        // Sweeping an empty ledger is a permitted no-op.
        if self.balance.is_zero() {
            return Ok(Vec::new());
        }
        if self.withdrawn.checked_add(self.balance).is_none() {
            return Err(DomainError::BalanceOverflow);
        }

        Ok(vec![LedgerEvent::FundsWithdrawn(FundsWithdrawn {
            owner: self.owner,
            amount: self.balance,
            occurred_at: cmd.occurred_at,
        })])
    }
}
