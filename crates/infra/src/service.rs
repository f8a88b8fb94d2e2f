//! Serialized ledger execution.
//!
//! `LedgerService` is the only way to mutate a ledger. Each mutation runs the
//! whole pipeline under the write lock:
//!
//! ```text
//! command
//!   -> Ledger::handle   (rules; rejection leaves everything untouched)
//!   -> Custody          (move funds; failure leaves everything untouched)
//!   -> Ledger::apply    (append record / flip flag / adjust balance)
//!   -> journal + bus    (envelope with the next sequence number)
//! ```
//!
//! Readers take the read lock and therefore never observe a half-applied call.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid::Uuid;

use paydesk_core::{AccountId, Aggregate, AggregateRoot, Amount, LedgerId, PaymentId};
use paydesk_events::{Event, EventBus, EventEnvelope, Projection, ProjectionRunner, Subscription};
use paydesk_payments::{Ledger, LedgerCommand, LedgerEvent, Pay, Payment, Refund, Withdraw};

use crate::config::LedgerConfig;
use crate::custody::Custody;
use crate::error::ServiceError;

/// Aggregate type recorded on every envelope.
pub const AGGREGATE_TYPE: &str = "payments.ledger";

pub type LedgerEnvelope = EventEnvelope<LedgerEvent>;

#[derive(Debug)]
struct State {
    ledger: Ledger,
    journal: Vec<LedgerEnvelope>,
}

/// A ledger plus its custody account and notification bus.
#[derive(Debug)]
pub struct LedgerService<C, B> {
    ledger_id: LedgerId,
    owner: AccountId,
    state: RwLock<State>,
    custody: C,
    bus: B,
}

impl<C, B> LedgerService<C, B>
where
    C: Custody,
    B: EventBus<LedgerEnvelope>,
{
    /// Open a new, empty ledger owned by `owner`.
    pub fn create(owner: AccountId, config: &LedgerConfig, custody: C, bus: B) -> Self {
        let ledger_id = LedgerId::new();
        let ledger = Ledger::open(ledger_id, owner).with_message_limit(config.max_message_len);

        tracing::info!(%ledger_id, %owner, "ledger opened");

        Self {
            ledger_id,
            owner,
            state: RwLock::new(State {
                ledger,
                journal: Vec::new(),
            }),
            custody,
            bus,
        }
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    /// Subscribe to envelopes published after this call.
    pub fn subscribe(&self) -> Subscription<LedgerEnvelope> {
        self.bus.subscribe()
    }

    /// Record a payment of `amount` from `caller`. Returns the new payment's id.
    pub fn pay(
        &self,
        caller: AccountId,
        message: impl Into<String>,
        amount: Amount,
    ) -> Result<PaymentId, ServiceError> {
        let command = LedgerCommand::Pay(Pay {
            ledger_id: self.ledger_id,
            caller,
            message: message.into(),
            amount,
            occurred_at: Utc::now(),
        });

        let events = self.dispatch(command)?;
        match events.first() {
            Some(LedgerEvent::PaymentReceived(e)) => Ok(e.payment_id),
            _ => Err(paydesk_core::DomainError::invariant("pay emitted no PaymentReceived").into()),
        }
    }

    /// Return payment `payment_id` to its sender. Owner only.
    pub fn refund(&self, caller: AccountId, payment_id: PaymentId) -> Result<(), ServiceError> {
        self.dispatch(LedgerCommand::Refund(Refund {
            ledger_id: self.ledger_id,
            caller,
            payment_id,
            occurred_at: Utc::now(),
        }))
        .map(|_| ())
    }

    /// Sweep the held balance to the owner. Owner only. Returns the swept amount
    /// (zero when there was nothing to sweep).
    pub fn withdraw(&self, caller: AccountId) -> Result<Amount, ServiceError> {
        let events = self.dispatch(LedgerCommand::Withdraw(Withdraw {
            ledger_id: self.ledger_id,
            caller,
            occurred_at: Utc::now(),
        }))?;

        Ok(events
            .iter()
            .map(|e| match e {
                LedgerEvent::FundsWithdrawn(w) => w.amount,
                _ => Amount::ZERO,
            })
            .sum())
    }

    pub fn total_payments(&self) -> Result<u64, ServiceError> {
        Ok(self.read()?.ledger.total_payments())
    }

    pub fn payment(&self, payment_id: PaymentId) -> Result<Payment, ServiceError> {
        Ok(self.read()?.ledger.payment(payment_id)?.clone())
    }

    /// Snapshot of every payment, in id order.
    pub fn payments(&self) -> Result<Vec<Payment>, ServiceError> {
        Ok(self.read()?.ledger.payments().to_vec())
    }

    pub fn balance(&self) -> Result<Amount, ServiceError> {
        Ok(self.read()?.ledger.balance())
    }

    /// Snapshot of the event journal.
    pub fn journal(&self) -> Result<Vec<LedgerEnvelope>, ServiceError> {
        Ok(self.read()?.journal.clone())
    }

    /// Bring a read model up to the ledger's current version from the journal.
    /// Returns how many envelopes were applied.
    pub fn catch_up<P>(&self, runner: &mut ProjectionRunner<P>) -> Result<usize, ServiceError>
    where
        P: Projection<Ev = LedgerEvent>,
    {
        let state = self.read()?;
        let applied = runner.catch_up(&state.journal)?;
        tracing::debug!(
            ledger_id = %runner.ledger_id(),
            applied,
            version = runner.version(),
            "read model caught up"
        );
        Ok(applied)
    }

    /// Snapshot of the ledger aggregate itself.
    pub fn snapshot(&self) -> Result<Ledger, ServiceError> {
        Ok(self.read()?.ledger.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, ServiceError> {
        self.state.read().map_err(|_| ServiceError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, ServiceError> {
        self.state.write().map_err(|_| ServiceError::Poisoned)
    }

    fn dispatch(&self, command: LedgerCommand) -> Result<Vec<LedgerEvent>, ServiceError> {
        let mut state = self.write()?;

        let events = state.ledger.handle(&command).map_err(|e| {
            tracing::warn!(ledger_id = %self.ledger_id, error = %e, "command rejected");
            ServiceError::from(e)
        })?;

        debug_assert!(events.len() <= 1, "ledger commands emit at most one event");
        for event in &events {
            self.settle(event)?;
        }

        for event in &events {
            state.ledger.apply(event);
            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                self.ledger_id,
                AGGREGATE_TYPE,
                state.ledger.version(),
                event.clone(),
            );
            state.journal.push(envelope.clone());

            log_committed(self.ledger_id, event);

            // Published under the lock so subscribers see sequence order.
            if let Err(e) = self.bus.publish(envelope) {
                tracing::warn!(
                    ledger_id = %self.ledger_id,
                    event_type = event.event_type(),
                    error = ?e,
                    "event publication failed; journal is authoritative"
                );
            }
        }

        Ok(events)
    }

    fn settle(&self, event: &LedgerEvent) -> Result<(), ServiceError> {
        let result = match event {
            LedgerEvent::PaymentReceived(e) => self.custody.deposit(e.sender, e.amount),
            LedgerEvent::RefundIssued(e) => self.custody.release(e.sender, e.amount),
            LedgerEvent::FundsWithdrawn(e) => self.custody.release(e.owner, e.amount),
        };

        result.map_err(|e| {
            tracing::warn!(
                ledger_id = %self.ledger_id,
                event_type = event.event_type(),
                error = %e,
                "custody transfer failed; command aborted"
            );
            ServiceError::Custody(e.to_string())
        })
    }
}

fn log_committed(ledger_id: LedgerId, event: &LedgerEvent) {
    match event {
        LedgerEvent::PaymentReceived(e) => tracing::info!(
            %ledger_id,
            payment_id = %e.payment_id,
            sender = %e.sender,
            amount = %e.amount,
            "payment received"
        ),
        LedgerEvent::RefundIssued(e) => tracing::info!(
            %ledger_id,
            payment_id = %e.payment_id,
            sender = %e.sender,
            amount = %e.amount,
            "refund issued"
        ),
        LedgerEvent::FundsWithdrawn(e) => tracing::info!(
            %ledger_id,
            owner = %e.owner,
            amount = %e.amount,
            "funds withdrawn"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use paydesk_core::DomainError;
    use paydesk_events::{InMemoryBusError, InMemoryEventBus};

    use crate::custody::{CustodyError, InMemoryCustody};

    type Service = LedgerService<InMemoryCustody, Arc<InMemoryEventBus<LedgerEnvelope>>>;

    const FUNDS: Amount = Amount::new(1_000_000);

    fn setup() -> (Service, AccountId, AccountId) {
        let owner = AccountId::new();
        let payer = AccountId::new();
        let custody = InMemoryCustody::new();
        custody.fund(payer, FUNDS).unwrap();
        let service = LedgerService::create(
            owner,
            &LedgerConfig::default(),
            custody,
            Arc::new(InMemoryEventBus::<LedgerEnvelope>::new()),
        );
        (service, owner, payer)
    }

    #[test]
    fn pay_moves_funds_and_journals_envelope() {
        let (service, _, payer) = setup();
        let sub = service.subscribe();

        let id = service.pay(payer, "coffee", Amount::new(300)).unwrap();

        assert_eq!(id, PaymentId::new(0));
        assert_eq!(service.balance().unwrap(), Amount::new(300));
        assert_eq!(service.custody().held(), Amount::new(300));
        assert_eq!(service.custody().balance_of(payer), Amount::new(999_700));

        let journal = service.journal().unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].sequence_number(), 1);
        assert_eq!(journal[0].aggregate_type(), AGGREGATE_TYPE);
        assert_eq!(sub.drain(), journal);
    }

    #[test]
    fn rejected_pay_publishes_nothing() {
        let (service, _, payer) = setup();
        let sub = service.subscribe();

        let err = service.pay(payer, "zero", Amount::ZERO).unwrap_err();

        assert!(matches!(err.as_domain(), Some(DomainError::InvalidAmount)));
        assert_eq!(service.total_payments().unwrap(), 0);
        assert!(service.journal().unwrap().is_empty());
        assert!(sub.drain().is_empty());
        assert_eq!(service.custody().held(), Amount::ZERO);
    }

    #[test]
    fn failed_deposit_appends_no_record() {
        let (service, _, _) = setup();
        let broke = AccountId::new();

        let err = service.pay(broke, "iou", Amount::new(5)).unwrap_err();

        assert!(matches!(err, ServiceError::Custody(_)));
        assert_eq!(service.total_payments().unwrap(), 0);
        assert_eq!(service.balance().unwrap(), Amount::ZERO);
    }

    #[test]
    fn withdraw_returns_swept_amount() {
        let (service, owner, payer) = setup();
        service.pay(payer, "a", Amount::new(10)).unwrap();
        service.pay(payer, "b", Amount::new(15)).unwrap();

        assert_eq!(service.withdraw(owner).unwrap(), Amount::new(25));
        assert_eq!(service.balance().unwrap(), Amount::ZERO);
        assert_eq!(service.custody().balance_of(owner), Amount::new(25));

        // Nothing left: a permitted no-op.
        assert_eq!(service.withdraw(owner).unwrap(), Amount::ZERO);
        assert_eq!(service.journal().unwrap().len(), 3);
    }

    #[test]
    fn journal_replays_to_current_state() {
        let (service, owner, payer) = setup();
        service.pay(payer, "a", Amount::new(10)).unwrap();
        service.pay(payer, "b", Amount::new(20)).unwrap();
        service.refund(owner, PaymentId::new(0)).unwrap();

        let journal = service.journal().unwrap();
        let rebuilt = Ledger::replay(
            service.ledger_id(),
            owner,
            journal.iter().map(|env| env.payload()),
        );
        let live = service.snapshot().unwrap();

        assert_eq!(rebuilt.payments(), live.payments());
        assert_eq!(rebuilt.balance(), live.balance());
        assert_eq!(rebuilt.version(), live.version());
    }

    #[test]
    fn sweep_past_lifetime_limit_is_rejected_before_any_transfer() {
        let owner = AccountId::new();
        let whale = AccountId::new();
        let minnow = AccountId::new();
        let custody = InMemoryCustody::new();
        custody.fund(whale, Amount::new(i128::MAX)).unwrap();
        custody.fund(minnow, Amount::new(1)).unwrap();
        let service = LedgerService::create(
            owner,
            &LedgerConfig::default(),
            custody,
            InMemoryEventBus::<LedgerEnvelope>::new(),
        );
        service.pay(whale, "all in", Amount::new(i128::MAX)).unwrap();
        service.withdraw(owner).unwrap();
        service.pay(minnow, "tip", Amount::new(1)).unwrap();

        let err = service.withdraw(owner).unwrap_err();

        assert_eq!(err.as_domain(), Some(&DomainError::BalanceOverflow));
        assert_eq!(service.balance().unwrap(), Amount::new(1));
        assert_eq!(service.custody().held(), Amount::new(1));
        assert_eq!(service.custody().balance_of(owner), Amount::new(i128::MAX));
        assert_eq!(service.journal().unwrap().len(), 3);
        service.snapshot().unwrap().check_conservation().unwrap();
    }

    /// Custody that accepts deposits but refuses every release.
    #[derive(Debug, Default)]
    struct FrozenCustody(InMemoryCustody);

    impl Custody for FrozenCustody {
        type Error = CustodyError;

        fn deposit(&self, from: AccountId, amount: Amount) -> Result<(), Self::Error> {
            self.0.deposit(from, amount)
        }

        fn release(&self, _to: AccountId, _amount: Amount) -> Result<(), Self::Error> {
            Err(CustodyError::Poisoned)
        }
    }

    #[test]
    fn failed_release_leaves_refund_flag_and_balance_untouched() {
        let owner = AccountId::new();
        let payer = AccountId::new();
        let custody = FrozenCustody::default();
        custody.0.fund(payer, FUNDS).unwrap();
        let service = LedgerService::create(
            owner,
            &LedgerConfig::default(),
            custody,
            InMemoryEventBus::<LedgerEnvelope>::new(),
        );
        service.pay(payer, "p", Amount::new(50)).unwrap();

        let err = service.refund(owner, PaymentId::new(0)).unwrap_err();
        assert!(matches!(err, ServiceError::Custody(_)));
        assert!(!service.payment(PaymentId::new(0)).unwrap().is_refunded());
        assert_eq!(service.balance().unwrap(), Amount::new(50));

        let err = service.withdraw(owner).unwrap_err();
        assert!(matches!(err, ServiceError::Custody(_)));
        assert_eq!(service.balance().unwrap(), Amount::new(50));
        assert_eq!(service.journal().unwrap().len(), 1);
    }

    /// Bus whose publish always fails.
    #[derive(Debug, Default)]
    struct BrokenBus(InMemoryEventBus<LedgerEnvelope>);

    impl EventBus<LedgerEnvelope> for BrokenBus {
        type Error = InMemoryBusError;

        fn publish(&self, _message: LedgerEnvelope) -> Result<(), Self::Error> {
            Err(InMemoryBusError::Poisoned)
        }

        fn subscribe(&self) -> Subscription<LedgerEnvelope> {
            self.0.subscribe()
        }
    }

    #[test]
    fn publication_failure_does_not_undo_committed_payment() {
        let payer = AccountId::new();
        let custody = InMemoryCustody::new();
        custody.fund(payer, FUNDS).unwrap();
        let service = LedgerService::create(
            AccountId::new(),
            &LedgerConfig::default(),
            custody,
            BrokenBus::default(),
        );

        let id = service.pay(payer, "p", Amount::new(7)).unwrap();

        assert_eq!(service.payment(id).unwrap().amount(), Amount::new(7));
        assert_eq!(service.journal().unwrap().len(), 1);
    }

    #[test]
    fn message_limit_comes_from_config() {
        let payer = AccountId::new();
        let custody = InMemoryCustody::new();
        custody.fund(payer, FUNDS).unwrap();
        let config = LedgerConfig {
            max_message_len: 3,
            ..LedgerConfig::default()
        };
        let service = LedgerService::create(AccountId::new(), &config, custody, InMemoryEventBus::<LedgerEnvelope>::new());

        let err = service.pay(payer, "four", Amount::new(1)).unwrap_err();
        assert_eq!(
            err.as_domain(),
            Some(&DomainError::MessageTooLong { len: 4, max: 3 })
        );
    }

    #[test]
    fn concurrent_pays_are_serialized() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let owner = AccountId::new();
        let payers: Vec<AccountId> = (0..THREADS).map(|_| AccountId::new()).collect();
        let custody = InMemoryCustody::new();
        for p in &payers {
            custody.fund(*p, FUNDS).unwrap();
        }
        let service = Arc::new(LedgerService::create(
            owner,
            &LedgerConfig::default(),
            custody,
            InMemoryEventBus::<LedgerEnvelope>::new(),
        ));

        let handles: Vec<_> = payers
            .iter()
            .map(|&payer| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        service.pay(payer, "x", Amount::new(2)).unwrap();
                        // Readers must never see a torn state.
                        let ledger = service.snapshot().unwrap();
                        assert_eq!(ledger.balance(), ledger.outstanding().unwrap());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let total = (THREADS * PER_THREAD) as u64;
        assert_eq!(service.total_payments().unwrap(), total);
        assert_eq!(service.balance().unwrap(), Amount::new(2 * total as i128));
        assert_eq!(service.custody().held(), service.balance().unwrap());

        let journal = service.journal().unwrap();
        let sequences: Vec<u64> = journal.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequences, (1..=total).collect::<Vec<_>>());
        for (idx, payment) in service.payments().unwrap().iter().enumerate() {
            assert_eq!(payment.payment_id(), PaymentId::new(idx as u64));
        }
    }
}
