//! Lua execution context for the RLM sandbox.
//!
//! Evaluates Lua fragments against one persistent binding table, captures
//! their output, and exposes context-analysis utilities and host callbacks
//! to the evaluated code.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              ExecutionContext                │
//! │  execute / get_variable / initialize / destroy│
//! └──────────────────────────────────────────────┘
//!        │               │                 │
//!        ▼               ▼                 ▼
//! ┌────────────┐  ┌─────────────┐  ┌──────────────┐
//! │  capture   │  │  bindings   │  │    bridge    │
//! │ OutputSink │  │ print, io,  │  │ llm_query,   │
//! │ CaptureGuard│ │ utilities   │  │ rlm_query,.. │
//! └────────────┘  └─────────────┘  └──────────────┘
//!                        │                 │
//!                        ▼                 ▼
//!                 ┌─────────────┐   dyn Bridge (host)
//!                 │   utils     │
//!                 │ pure text fns│
//!                 └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use rlm_lua::{DetachedBridge, ExecutionContext};
//! use std::rc::Rc;
//!
//! let mut ctx = ExecutionContext::new(Rc::new(DetachedBridge)).unwrap();
//! ctx.initialize("alpha\nbeta").unwrap();
//!
//! let result = ctx.execute("x = get_line(2)\nprint(x, count_lines())");
//! assert_eq!(result.stdout, "beta\t2\n");
//!
//! let lookup = ctx.get_variable("x").unwrap();
//! assert_eq!(lookup.value, serde_json::json!("beta"));
//! ```

mod bindings;
pub mod bridge;
pub mod capture;
mod context;
mod convert;
pub mod error;
pub mod utils;

pub use bindings::UTILITY_NAMES;
pub use bridge::{normalize_batch, Bridge, BridgeError, DetachedBridge, CALLBACK_NAMES};
pub use capture::{CaptureGuard, CapturedOutput, OutputSink, Stream};
pub use context::{
    ContextOptions, EvalOutcome, ExecutionContext, ExecutionResult, VariableLookup,
    DEFAULT_CONTEXT_VARIABLE,
};
pub use error::{SandboxError, UtilityError};
