use thiserror::Error;

use crate::telegram::ChatError;

/// Failure taxonomy of the relay core.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Backing store could not be read or written.
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    /// Untrusted input that could not be interpreted.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Chat platform call (invite mint, message delivery) failed.
    #[error("external service failure: {0}")]
    ExternalService(#[from] ChatError),

    /// Chat text that is not a trader id lookup.
    #[error("not a trader id: {0:?}")]
    InvalidTraderIdFormat(String),

    /// Trader has no records to anchor an invite grant on.
    #[error("no records for trader {0:?}")]
    UnknownTrader(String),

    /// Destination key not present in the configuration.
    #[error("unknown invite destination: {0}")]
    UnknownDestination(String),
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::StoreUnavailable(e.to_string())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
