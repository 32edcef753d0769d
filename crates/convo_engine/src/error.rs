use std::time::Duration;

use thiserror::Error;

use crate::extract::ExtractionError;
use crate::ledger::LedgerError;
use crate::surface::UiError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ui interaction failed: {0}")]
    TransientUi(#[from] UiError),
    #[error("no answer captured within {0:?}")]
    DetectionTimeout(Duration),
    #[error(transparent)]
    ExtractionContractViolation(#[from] ExtractionError),
    #[error("session for {site} is not authenticated")]
    SessionUnauthenticated { site: String },
    #[error(transparent)]
    LedgerIo(#[from] LedgerError),
}

impl EngineError {
    /// The current task cannot continue; later tasks may.
    pub fn aborts_task(&self) -> bool {
        matches!(self, EngineError::SessionUnauthenticated { .. })
    }
}
