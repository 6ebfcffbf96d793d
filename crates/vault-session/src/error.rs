//! error types for the wallet session

use thiserror::Error;

use crate::view::InputField;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no wallet provider available")]
    NoProvider,

    #[error("contract not bound")]
    NotBound,

    #[error("account request rejected: {0}")]
    Rejected(String),

    #[error("missing input: {0}")]
    MissingInput(InputField),

    #[error("invalid input for {field}: {reason}")]
    InvalidInput { field: InputField, reason: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unknown contract function: {0}")]
    UnknownFunction(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("transaction submission failed: {0}")]
    SubmissionFailed(String),

    #[error("transaction {0} reverted")]
    TransactionReverted(String),
}

impl SessionError {
    /// json-rpc "method not found"
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, SessionError::Rpc { code: -32601, .. })
    }

    /// user rejected the request (EIP-1193 code 4001)
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, SessionError::Rpc { code: 4001, .. } | SessionError::Rejected(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::DecodingError(e.to_string())
    }
}

impl From<hex::FromHexError> for SessionError {
    fn from(e: hex::FromHexError) -> Self {
        SessionError::DecodingError(e.to_string())
    }
}

#[cfg(feature = "rpc")]
impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}
