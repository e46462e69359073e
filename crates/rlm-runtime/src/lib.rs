//! RLM sandbox runtime.
//!
//! Wires the Lua execution context to a newline-delimited request stream.
//!
//! # Architecture
//!
//! ```text
//!            stdin                                   stdout
//!              │                                       ▲
//!              ▼                                       │
//! ┌──────────────────────────────────────────────────────────┐
//! │                     LineTransport                        │
//! └──────────────────────────────────────────────────────────┘
//!       │  read request          ▲ write response   ▲  │
//!       ▼                        │                  │  │ read reply
//! ┌──────────┐   dispatch   ┌────────────┐  call  ┌──────────────┐
//! │  Server  │ ───────────► │ Dispatcher │ ─ ─ ─► │ BridgeClient │
//! └──────────┘              └────────────┘        └──────────────┘
//!                                 │                      ▲
//!                                 ▼                      │
//!                      rlm_lua::ExecutionContext ── llm_query(...)
//! ```
//!
//! The server and the bridge client share one transport, so a bridge
//! reply is read from the same stream as requests, in the middle of an
//! `execute`.
//!
//! # Example
//!
//! ```
//! use rlm_runtime::config::SandboxConfig;
//! use rlm_runtime::{LineTransport, Server};
//! use std::io::Cursor;
//! use std::rc::Rc;
//!
//! let input = concat!(
//!     r#"{"jsonrpc":"2.0","id":"1","method":"execute","params":{"code":"print(2+2)"}}"#,
//!     "\n",
//! );
//! let transport = Rc::new(LineTransport::new(Cursor::new(input), std::io::sink()));
//! let mut server = Server::with_config(transport, &SandboxConfig::default()).unwrap();
//! let stats = server.run().unwrap();
//! assert_eq!(stats.responses, 1);
//! ```

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod server;
pub mod transport;

pub use bridge::BridgeClient;
pub use dispatcher::{DispatchError, Dispatcher};
pub use server::{ServeStats, Server};
pub use transport::{LineTransport, TransportError};
