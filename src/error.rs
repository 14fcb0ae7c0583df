use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorCode {
    InvalidArgument,
    UnknownFunction,
    NotFound,
    Decode,
    CorruptState,
    Query,
    Encode,
    Conflict,
    Unavailable,
    InvalidConfig,
    Io,
}

impl LedgerErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerErrorCode::InvalidArgument => "invalid_argument",
            LedgerErrorCode::UnknownFunction => "unknown_function",
            LedgerErrorCode::NotFound => "not_found",
            LedgerErrorCode::Decode => "decode",
            LedgerErrorCode::CorruptState => "corrupt_state",
            LedgerErrorCode::Query => "query",
            LedgerErrorCode::Encode => "encode",
            LedgerErrorCode::Conflict => "conflict",
            LedgerErrorCode::Unavailable => "unavailable",
            LedgerErrorCode::InvalidConfig => "invalid_config",
            LedgerErrorCode::Io => "io",
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
    #[error("no state at key '{key}'")]
    NotFound { key: String },
    #[error("cannot decode value at key '{key}': {message}")]
    Decode { key: String, message: String },
    #[error("corrupt state at key '{key}': {message}")]
    CorruptState { key: String, message: String },
    #[error("query error: {0}")]
    Query(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("conflict on key '{key}' after {attempts} attempts")]
    Conflict { key: String, attempts: usize },
    #[error("state store unavailable: {message}")]
    Unavailable { message: String },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn code(&self) -> LedgerErrorCode {
        match self {
            LedgerError::InvalidArgument(_) => LedgerErrorCode::InvalidArgument,
            LedgerError::UnknownFunction { .. } => LedgerErrorCode::UnknownFunction,
            LedgerError::NotFound { .. } => LedgerErrorCode::NotFound,
            LedgerError::Decode { .. } => LedgerErrorCode::Decode,
            LedgerError::CorruptState { .. } => LedgerErrorCode::CorruptState,
            LedgerError::Query(_) => LedgerErrorCode::Query,
            LedgerError::Encode(_) => LedgerErrorCode::Encode,
            LedgerError::Conflict { .. } => LedgerErrorCode::Conflict,
            LedgerError::Unavailable { .. } => LedgerErrorCode::Unavailable,
            LedgerError::InvalidConfig { .. } => LedgerErrorCode::InvalidConfig,
            LedgerError::Io(_) => LedgerErrorCode::Io,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        LedgerError::NotFound { key: key.into() }
    }

    pub(crate) fn decode(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        LedgerError::Decode {
            key: key.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn corrupt(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        LedgerError::CorruptState {
            key: key.into(),
            message: err.to_string(),
        }
    }
}
