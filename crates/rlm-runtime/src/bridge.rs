//! Transport-backed [`Bridge`] implementation.
//!
//! A call writes one request envelope, then blocks on the shared inbound
//! stream for exactly one reply:
//!
//! ```text
//! sandbox                          host
//!   │ {"id":"bridge:1","method":"bridge:llm",...}
//!   │ ─────────────────────────────────►
//!   │                                  │ (completion)
//!   │ {"id":"bridge:1","result":"..."} │
//!   │ ◄─────────────────────────────────
//! ```

use crate::transport::LineTransport;
use rlm_lua::{Bridge, BridgeError};
use rlm_protocol::{decode_response, Request};
use serde_json::Value;
use std::cell::Cell;
use std::rc::Rc;

/// Default correlation id prefix.
pub const DEFAULT_ID_PREFIX: &str = "bridge";

/// Issues `bridge:*` requests over the shared transport.
#[derive(Debug)]
pub struct BridgeClient {
    transport: Rc<LineTransport>,
    counter: Cell<u64>,
    prefix: String,
}

impl BridgeClient {
    /// Creates a client with the default id prefix.
    #[must_use]
    pub fn new(transport: Rc<LineTransport>) -> Self {
        Self::with_prefix(transport, DEFAULT_ID_PREFIX)
    }

    /// Creates a client whose ids read `<prefix>:<n>`.
    #[must_use]
    pub fn with_prefix(transport: Rc<LineTransport>, prefix: impl Into<String>) -> Self {
        Self {
            transport,
            counter: Cell::new(0),
            prefix: prefix.into(),
        }
    }

    /// Number of calls issued so far.
    #[must_use]
    pub fn calls_issued(&self) -> u64 {
        self.counter.get()
    }

    fn next_id(&self) -> String {
        let n = self.counter.get() + 1;
        self.counter.set(n);
        format!("{}:{n}", self.prefix)
    }
}

impl Bridge for BridgeClient {
    fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let id = self.next_id();
        tracing::debug!(%id, method, "bridge request");

        let line = Request::new(id.as_str(), method, params)
            .encode()
            .map_err(|e| BridgeError::Malformed(e.to_string()))?;
        self.transport
            .write_line(&line)
            .map_err(|e| BridgeError::Io(e.into()))?;

        let reply = self
            .transport
            .read_line()
            .map_err(|e| BridgeError::Io(e.into()))?
            .ok_or_else(|| BridgeError::Closed { id: id.clone() })?;

        let response =
            decode_response(&reply).map_err(|e| BridgeError::Malformed(e.to_string()))?;

        if response.id.as_str() != Some(id.as_str()) {
            tracing::warn!(expected = %id, actual = %response.id, "bridge reply id mismatch");
            return Err(BridgeError::IdMismatch {
                expected: id,
                actual: response.id,
            });
        }

        match response.outcome {
            Ok(result) => {
                tracing::debug!(%id, "bridge reply");
                Ok(result)
            }
            Err(error) => {
                tracing::debug!(%id, code = error.code, "bridge error reply");
                Err(BridgeError::Remote {
                    code: error.code,
                    message: error.message,
                })
            }
        }
    }
}
