use thiserror::Error;

use paydesk_core::DomainError;
use paydesk_events::ProjectionError;

/// Failure of a ledger service operation. In every case the ledger is left
/// exactly as it was before the call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The command was rejected by the ledger's rules.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The funds transfer failed; nothing was recorded.
    #[error("custody transfer failed: {0}")]
    Custody(String),

    /// A read model could not follow the journal.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// A previous holder of the ledger lock panicked.
    #[error("ledger lock poisoned")]
    Poisoned,
}

impl ServiceError {
    /// The domain rejection, if that is what this is.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }
}
