//! Request routing.
//!
//! Every inbound line ends in exactly one [`Response`]:
//!
//! ```text
//! line ──decode──► Request ──route──► handler ──► Ok(result)  ──► success
//!   │                 │                  │
//!   └─ Parse/Invalid  └─ MethodNotFound  └─ InvalidParams/Internal ──► failure
//! ```
//!
//! | Method | Params | Result |
//! |--------|--------|--------|
//! | `execute` | `{code}` | `{stdout, stderr, duration, error?}` |
//! | `initialize` | `{context}` | `{status: "ok"}` |
//! | `get_variable` | `{name}` | `{value, found}` |
//! | `destroy` | `{}` | `{status: "ok"}` |

use rlm_lua::{ExecutionContext, SandboxError};
use rlm_protocol::{decode_request, Request, Response, RpcError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Evaluate code in the persistent context.
pub const METHOD_EXECUTE: &str = "execute";
/// Set the context string and install utilities.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Read one binding.
pub const METHOD_GET_VARIABLE: &str = "get_variable";
/// Clear all bindings.
pub const METHOD_DESTROY: &str = "destroy";

/// Handler failures, before conversion to the wire taxonomy.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Unknown method name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Params missing, of the wrong shape, or of the wrong type.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The execution context failed outside evaluated code.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// A handler result could not be serialized.
    #[error("failed to serialize result: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl DispatchError {
    /// Converts into the wire error.
    #[must_use]
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::MethodNotFound(method) => RpcError::method_not_found(method),
            Self::InvalidParams(detail) => RpcError::invalid_params(detail),
            Self::Sandbox(e) => RpcError::internal(e.to_string()),
            Self::Serialize(e) => RpcError::internal(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteParams {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct InitializeParams {
    #[serde(default)]
    context: String,
}

#[derive(Debug, Deserialize)]
struct GetVariableParams {
    name: String,
}

/// Parses `params` into `T`. Only a JSON object is accepted.
fn parse_params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, DispatchError> {
    if !params.is_object() {
        return Err(DispatchError::InvalidParams(format!(
            "{method}: params must be an object"
        )));
    }
    serde_json::from_value(params)
        .map_err(|e| DispatchError::InvalidParams(format!("{method}: {e}")))
}

fn status_ok() -> Value {
    json!({ "status": "ok" })
}

/// Routes requests to one execution context.
#[derive(Debug)]
pub struct Dispatcher {
    context: ExecutionContext,
}

impl Dispatcher {
    /// Creates a dispatcher over `context`.
    #[must_use]
    pub fn new(context: ExecutionContext) -> Self {
        Self { context }
    }

    /// The underlying execution context.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Decodes and handles one inbound line.
    pub fn dispatch_line(&mut self, line: &str) -> Response {
        match decode_request(line) {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                tracing::warn!(error = %e, "rejecting undecodable line");
                Response::failure(e.id(), e.to_rpc_error())
            }
        }
    }

    /// Handles one decoded request.
    pub fn dispatch(&mut self, request: Request) -> Response {
        let Request { id, method, params } = request;
        tracing::debug!(%id, %method, "dispatching request");

        match self.route(&method, params) {
            Ok(result) => Response::success(id, result),
            Err(DispatchError::MethodNotFound(_)) => {
                tracing::warn!(%id, %method, "unknown method");
                Response::failure(id, RpcError::method_not_found(&method))
            }
            Err(e) => {
                tracing::debug!(%id, %method, error = %e, "request failed");
                Response::failure(id, e.to_rpc_error())
            }
        }
    }

    fn route(&mut self, method: &str, params: Value) -> Result<Value, DispatchError> {
        match method {
            METHOD_EXECUTE => self.execute(parse_params(method, params)?),
            METHOD_INITIALIZE => self.initialize(parse_params(method, params)?),
            METHOD_GET_VARIABLE => self.get_variable(parse_params(method, params)?),
            METHOD_DESTROY => self.destroy(),
            other => Err(DispatchError::MethodNotFound(other.to_string())),
        }
    }

    fn execute(&mut self, params: ExecuteParams) -> Result<Value, DispatchError> {
        let result = self.context.execute(&params.code);
        let mut value = serde_json::to_value(&result).map_err(DispatchError::Serialize)?;

        if !result.stderr.is_empty() {
            if let Value::Object(ref mut map) = value {
                map.insert("error".to_string(), Value::String(result.stderr));
            }
        }
        Ok(value)
    }

    fn initialize(&mut self, params: InitializeParams) -> Result<Value, DispatchError> {
        self.context.initialize(&params.context)?;
        Ok(status_ok())
    }

    fn get_variable(&mut self, params: GetVariableParams) -> Result<Value, DispatchError> {
        let lookup = self.context.get_variable(&params.name)?;
        serde_json::to_value(lookup).map_err(DispatchError::Serialize)
    }

    fn destroy(&mut self) -> Result<Value, DispatchError> {
        self.context.destroy()?;
        Ok(status_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_lua::DetachedBridge;
    use rlm_protocol::ErrorCode;
    use std::rc::Rc;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ExecutionContext::new(Rc::new(DetachedBridge)).expect("context"))
    }

    fn call(d: &mut Dispatcher, method: &str, params: Value) -> Response {
        d.dispatch(Request::new("t", method, params))
    }

    fn error_code(response: &Response) -> Option<ErrorCode> {
        response
            .outcome
            .as_ref()
            .err()
            .and_then(RpcError::error_code)
    }

    // === Routing ===

    #[test]
    fn execute_returns_captured_output() {
        let mut d = dispatcher();
        let response = call(&mut d, METHOD_EXECUTE, json!({"code": "print(2+2)"}));
        let result = response.outcome.expect("success");
        assert_eq!(result["stdout"], "4\n");
        assert_eq!(result["stderr"], "");
        assert!(result["duration"].as_f64().expect("duration") >= 0.0);
        assert!(result.get("error").is_none());
    }

    #[test]
    fn execute_failure_mirrors_stderr_into_error() {
        let mut d = dispatcher();
        let response = call(&mut d, METHOD_EXECUTE, json!({"code": "error('boom')"}));
        let result = response.outcome.expect("still a success envelope");
        let stderr = result["stderr"].as_str().expect("stderr");
        assert!(stderr.contains("boom"));
        assert_eq!(result["error"], result["stderr"]);
    }

    #[test]
    fn execute_missing_code_is_empty() {
        let mut d = dispatcher();
        let result = call(&mut d, METHOD_EXECUTE, json!({})).outcome.expect("success");
        assert_eq!(result["stdout"], "");
    }

    #[test]
    fn initialize_and_get_variable() {
        let mut d = dispatcher();
        let init = call(&mut d, METHOD_INITIALIZE, json!({"context": "A\nB\nC"}));
        assert_eq!(init.outcome.expect("success"), json!({"status": "ok"}));

        call(&mut d, METHOD_EXECUTE, json!({"code": "n = count_lines()"}));
        let lookup = call(&mut d, METHOD_GET_VARIABLE, json!({"name": "n"}));
        assert_eq!(lookup.outcome.expect("success"), json!({"value": 3, "found": true}));

        let missing = call(&mut d, METHOD_GET_VARIABLE, json!({"name": "nope"}));
        assert_eq!(
            missing.outcome.expect("success"),
            json!({"value": null, "found": false})
        );
    }

    #[test]
    fn destroy_clears_bindings() {
        let mut d = dispatcher();
        call(&mut d, METHOD_EXECUTE, json!({"code": "x = 1"}));
        let destroyed = call(&mut d, METHOD_DESTROY, json!({}));
        assert_eq!(destroyed.outcome.expect("success"), json!({"status": "ok"}));

        let lookup = call(&mut d, METHOD_GET_VARIABLE, json!({"name": "x"}));
        assert_eq!(lookup.outcome.expect("success")["found"], false);
    }

    // === Failures ===

    #[test]
    fn unknown_method() {
        let mut d = dispatcher();
        let response = call(&mut d, "shutdown", json!({}));
        assert_eq!(error_code(&response), Some(ErrorCode::MethodNotFound));
        assert_eq!(response.id, json!("t"));
    }

    #[test]
    fn wrong_param_type() {
        let mut d = dispatcher();
        let response = call(&mut d, METHOD_EXECUTE, json!({"code": 5}));
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidParams));
    }

    #[test]
    fn non_object_params() {
        let mut d = dispatcher();
        let response = call(&mut d, METHOD_EXECUTE, json!(["print(1)"]));
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidParams));
    }

    #[test]
    fn get_variable_requires_name() {
        let mut d = dispatcher();
        let response = call(&mut d, METHOD_GET_VARIABLE, json!({}));
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidParams));

        let response = call(&mut d, METHOD_GET_VARIABLE, json!({"name": 1}));
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidParams));
    }

    #[test]
    fn undecodable_lines() {
        let mut d = dispatcher();

        let response = d.dispatch_line("not json");
        assert_eq!(error_code(&response), Some(ErrorCode::ParseError));
        assert_eq!(response.id, Value::Null);

        let response = d.dispatch_line(r#"{"id":"x"}"#);
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidRequest));
        assert_eq!(response.id, json!("x"));
    }

    #[test]
    fn numeric_id_is_echoed() {
        let mut d = dispatcher();
        let response = d.dispatch_line(r#"{"jsonrpc":"2.0","id":7,"method":"destroy"}"#);
        assert_eq!(response.id, json!(7));
        assert!(!response.is_error());
    }
}
