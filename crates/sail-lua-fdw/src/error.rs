use datafusion::common::DataFusionError;
use thiserror::Error;

use crate::codec::CodecError;
use crate::session::Severity;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised while bridging the engine and a table script.
///
/// Every variant is reported to the engine as a single failure that carries the
/// script's own diagnostic text.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// An unrecognized table option, reported together with the options that are
    /// valid for the catalog context.
    #[error("invalid option \"{option}\": {hint}")]
    Config { option: String, hint: String },
    /// The script file or the inline script failed to load.
    #[error("script load error: {0}")]
    ScriptLoad(String),
    /// A script hook raised an error.
    #[error("script runtime error in {hook}: {message}")]
    ScriptRuntime { hook: &'static str, message: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The script asked for a report at a severity that aborts the operation.
    #[error("{severity}: {message}")]
    ScriptLogRequest { severity: Severity, message: String },
    #[error("canceling statement due to user request")]
    Canceled,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        BridgeError::InvalidState(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BridgeError::Internal(message.into())
    }
}

impl From<BridgeError> for DataFusionError {
    fn from(err: BridgeError) -> Self {
        DataFusionError::External(Box::new(err))
    }
}
