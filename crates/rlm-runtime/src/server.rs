//! Server loop: one request per inbound line, one response per request.
//!
//! The loop fully handles a line (including any bridge round trips made
//! while evaluating it) before reading the next. It ends cleanly at end of
//! input and with an error only when the transport itself fails.

use crate::bridge::BridgeClient;
use crate::config::SandboxConfig;
use crate::dispatcher::Dispatcher;
use crate::transport::{LineTransport, TransportError};
use rlm_lua::{Bridge, ContextOptions, ExecutionContext, SandboxError};
use rlm_protocol::{Response, RpcError};
use std::rc::Rc;

/// Last-resort line used when a response cannot be serialized.
const FALLBACK_RESPONSE: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Responses written.
    pub responses: u64,
    /// Of which were error responses.
    pub errors: u64,
}

/// Line-oriented request server.
#[derive(Debug)]
pub struct Server {
    transport: Rc<LineTransport>,
    dispatcher: Dispatcher,
}

impl Server {
    /// Creates a server over `transport`, dispatching to `context`.
    ///
    /// The context's bridge should be a [`BridgeClient`] on the same
    /// transport.
    #[must_use]
    pub fn new(transport: Rc<LineTransport>, context: ExecutionContext) -> Self {
        Self {
            transport,
            dispatcher: Dispatcher::new(context),
        }
    }

    /// Wires a bridge client and an execution context onto `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError`] if the execution context cannot be built.
    pub fn with_config(
        transport: Rc<LineTransport>,
        config: &SandboxConfig,
    ) -> Result<Self, SandboxError> {
        let bridge: Rc<dyn Bridge> = Rc::new(BridgeClient::with_prefix(
            Rc::clone(&transport),
            config.bridge.id_prefix.as_str(),
        ));
        let options = ContextOptions {
            context_variable: config.context.variable.clone(),
        };
        let context = ExecutionContext::with_options(bridge, options)?;
        Ok(Self::new(transport, context))
    }

    /// The request dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serves until end of input.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if reading or writing a line fails.
    pub fn run(&mut self) -> Result<ServeStats, TransportError> {
        let mut stats = ServeStats::default();
        tracing::info!("sandbox server started");

        loop {
            let line = match self.transport.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "inbound stream failed");
                    return Err(e);
                }
            };

            let response = self.dispatcher.dispatch_line(&line);
            if response.is_error() {
                stats.errors += 1;
            }

            if let Err(e) = self.transport.write_line(&encode(&response)) {
                tracing::error!(error = %e, "outbound stream failed");
                return Err(e);
            }
            stats.responses += 1;
        }

        tracing::info!(
            responses = stats.responses,
            errors = stats.errors,
            "inbound stream closed, server stopping"
        );
        Ok(stats)
    }
}

/// Encodes `response`, degrading to an internal error envelope.
fn encode(response: &Response) -> String {
    response.encode().unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode response");
        Response::failure(response.id.clone(), RpcError::internal(e.to_string()))
            .encode()
            .unwrap_or_else(|_| FALLBACK_RESPONSE.to_string())
    })
}
