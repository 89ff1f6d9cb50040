use faas_common::{CallStatus, FaasError, ValidationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // --- assembly ---
    #[error("no model or request provided for call")]
    NoSource,
    #[error("call source already set by {0}")]
    SourceAlreadySet(&'static str),
    #[error("invalid route: {0}")]
    InvalidRoute(#[from] ValidationError),
    #[error("cloud event extensions must be marshaled with known type: {0}")]
    InvalidExtensions(String),
    #[error("invalid cloud event: {0}")]
    InvalidEvent(#[from] serde_json::Error),
    #[error("failed to read call payload: {0}")]
    Payload(#[source] std::io::Error),
    #[error(transparent)]
    Overrider(FaasError),

    // --- admission ---
    #[error("Timed out - server too busy")]
    ServerBusy,

    // --- lifecycle ---
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Reservation(FaasError),
    #[error("BeforeCall: {0}")]
    BeforeCall(#[source] FaasError),
    #[error("AfterCall: {0}")]
    AfterCall(#[source] FaasError),
    #[error("call {call_id} is {status:?}, cannot {op}")]
    InvalidState {
        call_id: String,
        status: CallStatus,
        op: &'static str,
    },

    /// Failure reported by the execution backend for the call itself.
    #[error(transparent)]
    Execution(#[from] FaasError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the two context errors, which callers usually map to
    /// client-side timeouts rather than server faults.
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}
