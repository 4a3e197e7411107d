//! Engine errors and execution statuses.

use rsieve_binary::CodecError;

/// Top-level engine errors.
#[derive(Debug, thiserror::Error)]
pub enum SieveError {
    #[error("script '{0}' not found")]
    NotFound(String),
    #[error("script '{0}' is not valid")]
    NotValid(String),
    #[error("corrupt binary: {0}")]
    BinCorrupt(String),
    #[error("resource limit exceeded: {0}")]
    Resource(String),
    #[error("temporary failure: {0}")]
    TempFailure(String),
    #[error("implicit keep failed: {0}")]
    KeepFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rsieve_binary::BinaryError> for SieveError {
    fn from(err: rsieve_binary::BinaryError) -> Self {
        match err {
            rsieve_binary::BinaryError::Io(err) => Self::TempFailure(err.to_string()),
            other => Self::BinCorrupt(other.to_string()),
        }
    }
}

impl From<rsieve_ast::ScriptError> for SieveError {
    fn from(err: rsieve_ast::ScriptError) -> Self {
        match err {
            rsieve_ast::ScriptError::NotFound(name) => Self::NotFound(name),
            rsieve_ast::ScriptError::TooLarge { name, .. } => Self::NotValid(name),
            other => Self::TempFailure(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SieveError>;

/// Outcome of running a script or executing a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecStatus {
    /// Everything executed.
    Ok,
    /// A runtime or delivery error; the message is still preserved via
    /// implicit keep unless `KeepFailed` is reported instead.
    Failure,
    /// Retryable downstream failure; nothing irreversible happened.
    TempFailure,
    /// The binary failed validity checks at run time.
    BinCorrupt,
    /// A configured execution limit was hit.
    ResourceLimit,
    /// The implicit keep itself failed; the message could not be preserved.
    KeepFailed,
}

impl ExecStatus {
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Errors that abort a running script.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("corrupt bytecode: {0}")]
    Corrupt(#[from] CodecError),
    #[error("binary references unknown extension '{0}'")]
    UnknownExtension(String),
    #[error("redirect limit exceeded (max {0})")]
    RedirectLimit(u32),
    #[error("action limit exceeded (max {0})")]
    ActionLimit(u32),
    #[error("cpu time limit exceeded")]
    CpuLimit,
    #[error("conflicting actions: {0}")]
    Conflict(String),
    #[error("{0}")]
    Script(String),
}

impl RuntimeError {
    /// Status reported to the caller when this error aborts a run.
    #[must_use]
    pub const fn status(&self) -> ExecStatus {
        match self {
            Self::Corrupt(_) | Self::UnknownExtension(_) => ExecStatus::BinCorrupt,
            Self::RedirectLimit(_) | Self::ActionLimit(_) | Self::CpuLimit => {
                ExecStatus::ResourceLimit
            }
            Self::Conflict(_) | Self::Script(_) => ExecStatus::Failure,
        }
    }
}
