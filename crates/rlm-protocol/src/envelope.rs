//! Request and response envelopes.
//!
//! One envelope is one line. `serde_json` escapes control characters inside
//! strings, so an encoded envelope never contains a raw newline.

use crate::error::{ProtocolError, RpcError};
use serde::Serialize;
use serde_json::{Map, Value};

/// Protocol version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// A decoded request.
///
/// `id` is kept as raw JSON so it can be echoed back unmodified.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id (string, number or null).
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Parameters; `{}` when the request carried none.
    pub params: Value,
}

impl Request {
    /// Creates a request.
    #[must_use]
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Serializes to a single line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Serialize`] if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let wire = WireRequest {
            jsonrpc: JSONRPC_VERSION,
            id: &self.id,
            method: &self.method,
            params: &self.params,
        };
        serde_json::to_string(&wire).map_err(ProtocolError::Serialize)
    }
}

/// A response: the echoed id plus exactly one of result or error.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Echoed request id.
    pub id: Value,
    /// `Ok(result)` or `Err(error)`.
    pub outcome: Result<Value, RpcError>,
}

impl Response {
    /// Creates a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Creates a failure response.
    #[must_use]
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    /// Returns `true` if this response carries an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Serializes to a single line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Serialize`] if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let (result, error) = match &self.outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        let wire = WireResponse {
            jsonrpc: JSONRPC_VERSION,
            id: &self.id,
            result,
            error,
        };
        serde_json::to_string(&wire).map_err(ProtocolError::Serialize)
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'static str,
    id: &'a Value,
    method: &'a str,
    params: &'a Value,
}

#[derive(Serialize)]
struct WireResponse<'a> {
    jsonrpc: &'static str,
    id: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a RpcError>,
}

/// Decodes one inbound request line.
///
/// # Errors
///
/// - [`ProtocolError::Parse`] if the line is not JSON.
/// - [`ProtocolError::InvalidRequest`] if it is not an object or has no
///   string `method`. The error keeps the request id when one was present.
pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    let value: Value = serde_json::from_str(line).map_err(ProtocolError::Parse)?;

    let Value::Object(mut map) = value else {
        return Err(ProtocolError::invalid_request(
            Value::Null,
            "expected object",
        ));
    };

    let id = map.remove("id").unwrap_or(Value::Null);

    let method = match map.remove("method") {
        Some(Value::String(method)) => method,
        Some(_) => return Err(ProtocolError::invalid_request(id, "method must be a string")),
        None => return Err(ProtocolError::invalid_request(id, "missing method")),
    };

    let params = map
        .remove("params")
        .unwrap_or_else(|| Value::Object(Map::new()));

    Ok(Request { id, method, params })
}

/// Decodes one inbound response line (a host reply to a bridge request).
///
/// # Errors
///
/// - [`ProtocolError::Parse`] if the line is not JSON.
/// - [`ProtocolError::InvalidResponse`] if it is not an object, carries
///   neither `result` nor `error`, or the `error` member is malformed.
pub fn decode_response(line: &str) -> Result<Response, ProtocolError> {
    let value: Value = serde_json::from_str(line).map_err(ProtocolError::Parse)?;

    let Value::Object(mut map) = value else {
        return Err(ProtocolError::invalid_response("expected object"));
    };

    let id = map.remove("id").unwrap_or(Value::Null);

    if let Some(error) = map.remove("error") {
        let error: RpcError = serde_json::from_value(error)
            .map_err(|e| ProtocolError::invalid_response(format!("malformed error: {e}")))?;
        return Ok(Response::failure(id, error));
    }

    match map.remove("result") {
        Some(result) => Ok(Response::success(id, result)),
        None => Err(ProtocolError::invalid_response("missing result or error")),
    }
}
