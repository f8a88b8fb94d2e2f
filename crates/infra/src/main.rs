//! `paydesk`: runs a scripted session against an in-memory ledger and
//! prints the resulting journal as JSON lines.

use std::sync::Arc;

use anyhow::Context;

use paydesk_core::{AccountId, Amount, PaymentId};
use paydesk_events::{InMemoryEventBus, ProjectionRunner};
use paydesk_infra::{InMemoryCustody, LedgerConfig, LedgerEnvelope, LedgerService, PaymentListProjection};

const ONE: Amount = Amount::new(1_000_000_000_000_000_000);

fn main() -> anyhow::Result<()> {
    let config = LedgerConfig::from_env();
    paydesk_observability::init_with(config.log_format);

    let owner = AccountId::new();
    let alice = AccountId::new();
    let bob = AccountId::new();

    let custody = InMemoryCustody::new();
    custody.fund(alice, ONE + ONE)?;
    custody.fund(bob, ONE)?;

    let bus = Arc::new(InMemoryEventBus::<LedgerEnvelope>::new());
    let service = LedgerService::create(owner, &config, custody, bus);
    let mut view = ProjectionRunner::new(service.ledger_id(), PaymentListProjection::new());

    service.pay(alice, "Test payment", ONE)?;
    if let Err(e) = service.pay(alice, "Zero payment", Amount::ZERO) {
        tracing::info!(error = %e, "zero payment rejected as expected");
    }
    service.refund(owner, PaymentId::new(0))?;
    if let Err(e) = service.refund(owner, PaymentId::new(0)) {
        tracing::info!(error = %e, "double refund rejected as expected");
    }
    service.pay(alice, "Payment 1", ONE)?;
    service.pay(bob, "Payment 2", ONE)?;
    let swept = service.withdraw(owner)?;

    service
        .catch_up(&mut view)
        .context("payment list projection rejected the journal")?;
    let list = view.projection();

    tracing::info!(
        total_payments = service.total_payments()?,
        refunded = list.refunded_count(),
        swept = %swept,
        balance = %service.balance()?,
        owner_funds = %service.custody().balance_of(owner),
        "session complete"
    );

    for envelope in service.journal()? {
        println!("{}", serde_json::to_string(&envelope)?);
    }

    Ok(())
}
