//! Error types for the Tidings broker

use thiserror::Error;

/// JSON-RPC error code for an invalid action or object
pub const INVALID_ACTION_CODE: i32 = -1;
/// JSON-RPC error code for an unknown or invalid resource
pub const INVALID_RESOURCE_CODE: i32 = -2;
/// JSON-RPC error code for a resource that already exists
pub const DUPLICATE_RESOURCE_CODE: i32 = -3;
/// JSON-RPC error code for a malformed message field
pub const INVALID_MESSAGE_FIELD_CODE: i32 = -4;
/// JSON-RPC error code for a denied access
pub const ACCESS_DENIED_CODE: i32 = -5;
/// JSON-RPC error code for an internal server error
pub const INTERNAL_SERVER_ERROR_CODE: i32 = -6;

/// Core broker errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    // Protocol errors
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid resource: {0}")]
    InvalidResource(String),

    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("invalid message field: {0}")]
    InvalidMessageField(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    // Lookup errors
    #[error("not found: {0}")]
    NotFound(String),

    // Server errors
    #[error("internal server error: {0}")]
    Internal(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl BrokerError {
    /// Numeric JSON-RPC error code sent back to clients
    pub fn code(&self) -> i32 {
        match self {
            BrokerError::InvalidAction(_) => INVALID_ACTION_CODE,
            BrokerError::InvalidResource(_) | BrokerError::NotFound(_) => INVALID_RESOURCE_CODE,
            BrokerError::DuplicateResource(_) => DUPLICATE_RESOURCE_CODE,
            BrokerError::InvalidMessageField(_) => INVALID_MESSAGE_FIELD_CODE,
            BrokerError::AccessDenied(_) => ACCESS_DENIED_CODE,
            BrokerError::Internal(_) | BrokerError::Transport(_) => INTERNAL_SERVER_ERROR_CODE,
        }
    }

    /// Rebuild an error from a code and description received on the wire
    pub fn from_code(code: i32, description: impl Into<String>) -> Self {
        let description = description.into();
        match code {
            INVALID_ACTION_CODE => BrokerError::InvalidAction(description),
            INVALID_RESOURCE_CODE => BrokerError::InvalidResource(description),
            DUPLICATE_RESOURCE_CODE => BrokerError::DuplicateResource(description),
            INVALID_MESSAGE_FIELD_CODE => BrokerError::InvalidMessageField(description),
            ACCESS_DENIED_CODE => BrokerError::AccessDenied(description),
            _ => BrokerError::Internal(description),
        }
    }

    /// Prefix the description with the operation that failed
    pub fn context(self, ctx: &str) -> Self {
        match self {
            BrokerError::InvalidAction(m) => BrokerError::InvalidAction(format!("{ctx}: {m}")),
            BrokerError::InvalidResource(m) => BrokerError::InvalidResource(format!("{ctx}: {m}")),
            BrokerError::DuplicateResource(m) => {
                BrokerError::DuplicateResource(format!("{ctx}: {m}"))
            }
            BrokerError::InvalidMessageField(m) => {
                BrokerError::InvalidMessageField(format!("{ctx}: {m}"))
            }
            BrokerError::AccessDenied(m) => BrokerError::AccessDenied(format!("{ctx}: {m}")),
            BrokerError::NotFound(m) => BrokerError::NotFound(format!("{ctx}: {m}")),
            BrokerError::Internal(m) => BrokerError::Internal(format!("{ctx}: {m}")),
            BrokerError::Transport(m) => BrokerError::Transport(format!("{ctx}: {m}")),
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            BrokerError::Internal(format!("failed to marshal JSON: {err}"))
        } else {
            BrokerError::InvalidMessageField(format!("failed to unmarshal JSON: {err}"))
        }
    }
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;
