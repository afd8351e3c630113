use crate::error::{OapitError, Result};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Coarse pipeline phases at which cancellation is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    DocumentValidation,
    PayloadValidation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Loading => write!(f, "document loading"),
            Phase::DocumentValidation => write!(f, "document validation"),
            Phase::PayloadValidation => write!(f, "payload validation"),
        }
    }
}

/// Fail with `Cancelled` if the token has fired before entering `phase`.
pub fn checkpoint(cancel: &CancellationToken, phase: Phase) -> Result<()> {
    if cancel.is_cancelled() {
        tracing::debug!(%phase, "cancellation observed");
        return Err(OapitError::Cancelled(phase));
    }
    tracing::debug!(%phase, "entering phase");
    Ok(())
}
