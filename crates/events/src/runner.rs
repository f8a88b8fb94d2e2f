//! Keeps a read model in step with one ledger's journal.
//!
//! A ledger's sequence numbers are its versions: contiguous and starting at 1.
//! The runner remembers the version its view reflects, skips redelivered
//! envelopes and refuses any envelope that would leave a hole in the view.

use thiserror::Error;

use paydesk_core::LedgerId;

use crate::{EventEnvelope, Projection};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("envelope from ledger {found}, projection pinned to {expected}")]
    LedgerMismatch { expected: LedgerId, found: LedgerId },

    #[error("missing ledger versions: expected {expected}, found {found}")]
    Gap { expected: u64, found: u64 },
}

#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    ledger_id: LedgerId,
    version: u64,
    projection: P,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    /// An empty view of `ledger_id` at version 0.
    pub fn new(ledger_id: LedgerId, projection: P) -> Self {
        Self {
            ledger_id,
            version: 0,
            projection,
        }
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    /// Ledger version the view currently reflects.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_caught_up(&self, ledger_version: u64) -> bool {
        self.version == ledger_version
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Apply one envelope. Returns `false` for an envelope the view already
    /// reflects.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<bool, ProjectionError> {
        if envelope.ledger_id() != self.ledger_id {
            return Err(ProjectionError::LedgerMismatch {
                expected: self.ledger_id,
                found: envelope.ledger_id(),
            });
        }

        let found = envelope.sequence_number();
        if found <= self.version {
            return Ok(false);
        }
        if found != self.version + 1 {
            return Err(ProjectionError::Gap {
                expected: self.version + 1,
                found,
            });
        }

        self.projection.apply(envelope);
        self.version = found;
        Ok(true)
    }

    /// Apply every envelope the view has not seen yet, in order. Returns how
    /// many were applied.
    pub fn catch_up<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<usize, ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut applied = 0;
        for env in envelopes {
            if self.apply(env)? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}
