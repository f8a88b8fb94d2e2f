use paydesk_core::LedgerId;

/// A command targets a specific ledger.
///
/// Commands represent **intent** ("refund payment 3"); events are the facts
/// produced when a command is accepted. Commands are transient and may be
/// rejected; only events are journaled.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_ledger_id(&self) -> LedgerId;
}
