//! Persistent Lua execution context.
//!
//! Each [`ExecutionContext`] owns its own Lua VM and one binding table. The
//! binding table is the environment of every evaluated chunk, so global
//! assignments persist across `execute` calls. Lookups that miss the
//! bindings fall through to the builtins (captured `print`, redirected
//! `io`, `log`) and then to the Lua standard library.
//!
//! ```text
//! chunk _ENV ──► bindings ──__index──► builtins ──__index──► Lua globals
//!                (user vars, context,
//!                 callbacks, utilities)
//! ```
//!
//! Evaluation failures never escape `execute`: they are rendered into the
//! captured diagnostic text.

use crate::bindings::{self, ContextText};
use crate::bridge::{self, Bridge};
use crate::capture::OutputSink;
use crate::convert;
use crate::error::{SandboxError, UtilityError};
use crate::BridgeError;
use mlua::{Lua, Table, Value};
use serde::Serialize;
use std::rc::Rc;
use std::time::Instant;

/// Chunk name shown in Lua error messages and tracebacks.
const CHUNK_NAME: &str = "=sandbox";

/// Default binding name of the context string.
pub const DEFAULT_CONTEXT_VARIABLE: &str = "context";

/// Construction options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Binding name under which `initialize` exposes the context string.
    pub context_variable: String,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            context_variable: DEFAULT_CONTEXT_VARIABLE.to_string(),
        }
    }
}

/// Output of one `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Captured regular output.
    pub stdout: String,
    /// Captured diagnostic output, including any failure description.
    pub stderr: String,
    /// Wall-clock evaluation time in milliseconds.
    pub duration: f64,
}

/// Whether the evaluated code ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Completed without an uncaught error.
    Ok,
    /// Raised; carries the rendered description.
    Failed(String),
}

/// Result of `get_variable`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableLookup {
    /// JSON value, its string form if it has no JSON form, or null.
    pub value: serde_json::Value,
    /// `false` when the binding is absent.
    pub found: bool,
}

impl VariableLookup {
    fn missing() -> Self {
        Self {
            value: serde_json::Value::Null,
            found: false,
        }
    }
}

/// A persistent evaluation scope.
///
/// `mlua::Lua` is `!Send`; a context stays on the thread that built it.
pub struct ExecutionContext {
    lua: Lua,
    bindings: Table,
    sink: OutputSink,
    text: ContextText,
    bridge: Rc<dyn Bridge>,
    options: ContextOptions,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("context_len", &self.text.snapshot().len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Creates a context wired to `bridge`, with default options.
    ///
    /// Callback bindings are present immediately; utilities and the
    /// context string appear on [`initialize`](Self::initialize).
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError`] if VM setup fails.
    pub fn new(bridge: Rc<dyn Bridge>) -> Result<Self, SandboxError> {
        Self::with_options(bridge, ContextOptions::default())
    }

    /// Creates a context with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::InvalidName`] for an empty context variable,
    /// or [`SandboxError::Lua`] if VM setup fails.
    pub fn with_options(
        bridge: Rc<dyn Bridge>,
        options: ContextOptions,
    ) -> Result<Self, SandboxError> {
        if options.context_variable.trim().is_empty() {
            return Err(SandboxError::InvalidName(options.context_variable));
        }

        let lua = Lua::new();
        let sink = OutputSink::new();
        let builtins = bindings::create_builtins(&lua, &sink)?;

        let bindings = lua.create_table()?;
        let meta = lua.create_table()?;
        meta.set("__index", builtins)?;
        bindings.set_metatable(Some(meta));

        bridge::install_callbacks(&lua, &bindings, Rc::clone(&bridge))?;

        Ok(Self {
            lua,
            bindings,
            sink,
            text: ContextText::default(),
            bridge,
            options,
        })
    }

    /// Evaluates `code` against the persistent bindings.
    ///
    /// Never fails: an uncaught error is appended to `stderr`.
    pub fn execute(&mut self, code: &str) -> ExecutionResult {
        tracing::debug!(
            code = %code.chars().take(50).collect::<String>().replace('\n', " "),
            "executing"
        );

        let guard = self.sink.capture();
        let start = Instant::now();
        let outcome = self.evaluate(code);
        let duration = start.elapsed().as_secs_f64() * 1000.0;
        let mut captured = guard.finish();

        if let EvalOutcome::Failed(description) = outcome {
            captured.stderr.push_str(&description);
        }

        tracing::debug!(
            duration_ms = duration,
            stdout_len = captured.stdout.len(),
            stderr_len = captured.stderr.len(),
            "execution completed"
        );

        ExecutionResult {
            stdout: captured.stdout,
            stderr: captured.stderr,
            duration,
        }
    }

    fn evaluate(&self, code: &str) -> EvalOutcome {
        let chunk = self
            .lua
            .load(code)
            .set_name(CHUNK_NAME)
            .set_environment(self.bindings.clone());

        match chunk.exec() {
            Ok(()) => EvalOutcome::Ok,
            Err(e) => EvalOutcome::Failed(describe_failure(&e)),
        }
    }

    /// Looks up a binding.
    ///
    /// Only bindings are visible, not builtins.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Lua`] if the table lookup fails.
    pub fn get_variable(&self, name: &str) -> Result<VariableLookup, SandboxError> {
        let value: Value = self.bindings.raw_get(name)?;
        if value.is_nil() {
            return Ok(VariableLookup::missing());
        }

        let value = match convert::lua_to_json(&self.lua, value.clone()) {
            Some(json) => json,
            None => serde_json::Value::String(convert::display(&self.lua, value)),
        };

        Ok(VariableLookup { value, found: true })
    }

    /// Sets the context string and (re)installs callbacks and utilities.
    ///
    /// Unrelated user bindings survive.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Lua`] if a binding cannot be installed.
    pub fn initialize(&mut self, context: &str) -> Result<(), SandboxError> {
        tracing::debug!(context_len = context.len(), "initializing context");

        self.text.replace(context);
        self.bindings
            .raw_set(self.options.context_variable.as_str(), context)?;
        bridge::install_callbacks(&self.lua, &self.bindings, Rc::clone(&self.bridge))?;
        bindings::install_utilities(&self.lua, &self.bindings, &self.text)?;

        Ok(())
    }

    /// Clears every binding, callbacks and utilities included.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Lua`] if the table cannot be cleared.
    pub fn destroy(&mut self) -> Result<(), SandboxError> {
        let keys = self
            .bindings
            .pairs::<Value, Value>()
            .map(|pair| pair.map(|(key, _)| key))
            .collect::<mlua::Result<Vec<Value>>>()?;
        let count = keys.len();
        for key in keys {
            self.bindings.raw_set(key, Value::Nil)?;
        }
        self.text.replace("");

        tracing::debug!(cleared = count, "context destroyed");
        Ok(())
    }

    /// Current context string.
    #[must_use]
    pub fn context_text(&self) -> Rc<str> {
        self.text.snapshot()
    }

    /// Options this context was built with.
    #[must_use]
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }
}

/// Renders an evaluation failure as `<Kind>: <message>\n`.
///
/// The message carries Lua's traceback when one was attached.
fn describe_failure(err: &mlua::Error) -> String {
    let (kind, message) = classify(err);
    let mut out = format!("{kind}: {message}");
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn classify(err: &mlua::Error) -> (&'static str, String) {
    match err {
        mlua::Error::SyntaxError { message, .. } => ("SyntaxError", message.clone()),
        mlua::Error::RuntimeError(message) => ("RuntimeError", message.clone()),
        mlua::Error::MemoryError(message) => ("MemoryError", message.clone()),
        mlua::Error::CallbackError { traceback, cause } => {
            let (kind, message) = classify(cause);
            (kind, format!("{message}\n{traceback}"))
        }
        mlua::Error::ExternalError(inner) => {
            if inner.downcast_ref::<BridgeError>().is_some() {
                ("BridgeError", inner.to_string())
            } else if inner.downcast_ref::<UtilityError>().is_some() {
                ("UtilityError", inner.to_string())
            } else {
                ("ExternalError", inner.to_string())
            }
        }
        other => ("Error", other.to_string()),
    }
}
