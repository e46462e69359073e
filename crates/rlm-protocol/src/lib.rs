//! Wire protocol for the RLM sandbox.
//!
//! The sandbox talks JSON-RPC 2.0 over two byte streams, one envelope per
//! line. This crate is stateless: it only turns lines into envelopes and
//! back, and defines the wire error taxonomy.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  rlm-protocol : Request, Response, RpcError  ◄── HERE       │
//! │  rlm-lua      : ExecutionContext, utilities, Bridge seam    │
//! │  rlm-runtime  : transport, bridge client, dispatcher, loop  │
//! │  rlm-cli      : rlm-sandbox binary                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Envelopes
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | Request | `{"jsonrpc":"2.0","id":..,"method":..,"params":{..}}` |
//! | Success | `{"jsonrpc":"2.0","id":..,"result":..}` |
//! | Failure | `{"jsonrpc":"2.0","id":..,"error":{"code":..,"message":..}}` |
//!
//! Host→sandbox requests and sandbox→host bridge requests share the same
//! request shape; only the method names differ (`bridge:` prefix).
//!
//! # Example
//!
//! ```
//! use rlm_protocol::{decode_request, Response};
//! use serde_json::json;
//!
//! let req = decode_request(r#"{"jsonrpc":"2.0","id":"1","method":"destroy"}"#)
//!     .expect("valid request");
//! assert_eq!(req.method, "destroy");
//!
//! let line = Response::success(req.id, json!({"status": "ok"}))
//!     .encode()
//!     .expect("encodes");
//! assert_eq!(line, r#"{"jsonrpc":"2.0","id":"1","result":{"status":"ok"}}"#);
//! ```

mod envelope;
mod error;

pub use envelope::{decode_request, decode_response, Request, Response, JSONRPC_VERSION};
pub use error::{ErrorCode, ProtocolError, RpcError};
