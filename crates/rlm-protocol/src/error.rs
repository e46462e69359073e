//! Wire error taxonomy.
//!
//! [`ErrorCode`] is the fixed set of JSON-RPC codes the sandbox emits.
//! [`RpcError`] is the `error` member of a response envelope.
//! [`ProtocolError`] is what the codec returns when a line cannot become
//! an envelope; it converts into an [`RpcError`] carrying the right code.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error codes used on the wire.
///
/// Codes are stable API: hosts match on the integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Line is not well-formed JSON.
    ParseError,
    /// JSON is well-formed but not a request object.
    InvalidRequest,
    /// Method is not one of the routed methods.
    MethodNotFound,
    /// Params have the wrong shape or type.
    InvalidParams,
    /// Any other failure while dispatching.
    InternalError,
}

impl ErrorCode {
    /// Returns the integer code sent on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    /// Maps a wire integer back to a known code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(Self::ParseError),
            -32600 => Some(Self::InvalidRequest),
            -32601 => Some(Self::MethodNotFound),
            -32602 => Some(Self::InvalidParams),
            -32603 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Short label used as the message prefix.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// The `error` member of a failure response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    /// Integer error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates an error with `"<label>: <detail>"` as the message.
    #[must_use]
    pub fn new(code: ErrorCode, detail: impl AsRef<str>) -> Self {
        Self {
            code: code.code(),
            message: format!("{}: {}", code.label(), detail.as_ref()),
            data: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// -32700.
    #[must_use]
    pub fn parse_error(detail: impl AsRef<str>) -> Self {
        Self::new(ErrorCode::ParseError, detail)
    }

    /// -32600.
    #[must_use]
    pub fn invalid_request(detail: impl AsRef<str>) -> Self {
        Self::new(ErrorCode::InvalidRequest, detail)
    }

    /// -32601, naming the unknown method.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, method)
    }

    /// -32602.
    #[must_use]
    pub fn invalid_params(detail: impl AsRef<str>) -> Self {
        Self::new(ErrorCode::InvalidParams, detail)
    }

    /// -32603.
    #[must_use]
    pub fn internal(detail: impl AsRef<str>) -> Self {
        Self::new(ErrorCode::InternalError, detail)
    }

    /// Returns the known code, if the integer is one of ours.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

/// Failure to turn a line into an envelope, or an envelope into a line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line is not JSON.
    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    /// The line is JSON but not a valid request.
    ///
    /// `id` is the request id when one could be recovered, else null.
    #[error("Invalid Request: {reason}")]
    InvalidRequest { id: Value, reason: String },

    /// The line is JSON but not a valid response.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// Serializing an envelope failed.
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl ProtocolError {
    pub(crate) fn invalid_request(id: Value, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            id,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// The id a failure response must echo.
    #[must_use]
    pub fn id(&self) -> Value {
        match self {
            Self::InvalidRequest { id, .. } => id.clone(),
            _ => Value::Null,
        }
    }

    /// Converts into the wire error for this failure.
    #[must_use]
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Parse(e) => RpcError::parse_error(e.to_string()),
            Self::InvalidRequest { reason, .. } => RpcError::invalid_request(reason),
            Self::InvalidResponse { reason } => RpcError::internal(reason),
            Self::Serialize(e) => RpcError::internal(e.to_string()),
        }
    }
}
