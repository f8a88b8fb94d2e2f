use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are **disposable**: they can be dropped and rebuilt from the
/// ledger journal at any time. Projections must tolerate being fed the same
/// history again from scratch; duplicate delivery of a single envelope is
/// filtered out by `ProjectionRunner` using sequence numbers.
///
/// `apply` does not return errors. An event that is irrelevant to the view is
/// ignored; an event that contradicts the view (e.g. a refund for an unknown
/// payment) indicates the view was fed a foreign or truncated stream, which
/// the runner guards against.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
