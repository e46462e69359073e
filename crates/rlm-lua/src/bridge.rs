//! Host callbacks available to evaluated code.
//!
//! | Lua function | Wire method | Params | Returns |
//! |--------------|-------------|--------|---------|
//! | `llm_query(prompt)` | `bridge:llm` | `{prompt}` | string |
//! | `rlm_query(task, context?)` | `bridge:rlm` | `{task, context?}` | string |
//! | `batch_llm_query(prompts)` | `bridge:batch_llm` | `{prompts}` | list of strings, same length |
//!
//! The round trip itself lives behind the [`Bridge`] trait so this crate
//! stays transport-agnostic. A failed round trip is raised as a Lua error
//! inside the calling fragment. Arguments that are not valid UTF-8 are
//! sent lossily converted.

use mlua::{Lua, Result as LuaResult, String as LuaString, Table};
use serde_json::{json, Value};
use std::rc::Rc;
use thiserror::Error;

/// Single-prompt completion.
pub const BRIDGE_LLM: &str = "bridge:llm";

/// Recursive sub-task.
pub const BRIDGE_RLM: &str = "bridge:rlm";

/// Batched completion.
pub const BRIDGE_BATCH_LLM: &str = "bridge:batch_llm";

/// Names of the callback bindings installed into the execution context.
pub const CALLBACK_NAMES: &[&str] = &["llm_query", "rlm_query", "batch_llm_query"];

/// Failures of a bridge round trip.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Host answered with an error envelope.
    #[error("bridge error: {message} (code {code})")]
    Remote { code: i64, message: String },

    /// Inbound stream ended before the reply arrived.
    #[error("bridge closed while awaiting reply to {id}")]
    Closed { id: String },

    /// Reply correlates to a different request.
    #[error("bridge reply id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: Value },

    /// Reply line is not a response envelope.
    #[error("malformed bridge reply: {0}")]
    Malformed(String),

    /// Reading or writing the transport failed.
    #[error("bridge i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// No host is attached.
    #[error("no bridge attached")]
    Detached,
}

/// Synchronous callback channel to the host.
///
/// `call` blocks until the host's reply for this request has been read.
/// At most one call is outstanding at a time.
pub trait Bridge {
    /// Sends `method` with `params` and returns the host's result.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if the round trip fails or the host replies
    /// with an error.
    fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError>;
}

/// Bridge used when no host is attached; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedBridge;

impl Bridge for DetachedBridge {
    fn call(&self, method: &str, _params: Value) -> Result<Value, BridgeError> {
        tracing::warn!(method, "bridge call without an attached host");
        Err(BridgeError::Detached)
    }
}

/// Installs the callback bindings into `env`.
pub(crate) fn install_callbacks(lua: &Lua, env: &Table, bridge: Rc<dyn Bridge>) -> LuaResult<()> {
    let b = Rc::clone(&bridge);
    let llm_query = lua.create_function(move |_, prompt: LuaString| {
        let prompt = prompt.to_string_lossy();
        tracing::debug!(prompt_len = prompt.len(), "llm_query");
        let result = b
            .call(BRIDGE_LLM, json!({ "prompt": prompt }))
            .map_err(mlua::Error::external)?;
        let text = result_to_string(result);
        tracing::debug!(response_len = text.len(), "llm_query done");
        Ok(text)
    })?;
    env.raw_set("llm_query", llm_query)?;

    let b = Rc::clone(&bridge);
    let rlm_query = lua.create_function(move |_, (task, context): (LuaString, Option<LuaString>)| {
        let task = task.to_string_lossy();
        let context = context.map(|c| c.to_string_lossy());
        tracing::debug!(
            task_len = task.len(),
            context_present = context.is_some(),
            "rlm_query"
        );
        let mut params = json!({ "task": task });
        if let Some(context) = context {
            params["context"] = Value::String(context);
        }
        let result = b.call(BRIDGE_RLM, params).map_err(mlua::Error::external)?;
        Ok(result_to_string(result))
    })?;
    env.raw_set("rlm_query", rlm_query)?;

    let b = bridge;
    let batch_llm_query = lua.create_function(move |lua, prompts: Vec<LuaString>| {
        let prompts: Vec<String> = prompts.iter().map(LuaString::to_string_lossy).collect();
        let expected = prompts.len();
        tracing::debug!(count = expected, "batch_llm_query");
        let result = b
            .call(BRIDGE_BATCH_LLM, json!({ "prompts": prompts }))
            .map_err(mlua::Error::external)?;
        lua.create_sequence_from(normalize_batch(result, expected))
    })?;
    env.raw_set("batch_llm_query", batch_llm_query)?;

    Ok(())
}

/// Strings pass through; any other JSON becomes its JSON text.
fn result_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Coerces a batch reply into exactly `expected` strings.
///
/// A list of the right length maps element-wise. Any other shape is
/// replicated as one string per prompt so the length always matches.
#[must_use]
pub fn normalize_batch(result: Value, expected: usize) -> Vec<String> {
    match result {
        Value::Array(items) if items.len() == expected => {
            items.into_iter().map(result_to_string).collect()
        }
        other => {
            tracing::warn!(expected, "batch reply has unexpected shape, replicating raw response");
            vec![result_to_string(other); expected]
        }
    }
}
