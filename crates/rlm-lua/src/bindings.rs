//! Lua-facing bindings: output builtins and context utilities.
//!
//! # Builtins (always reachable, never bindings)
//!
//! | Function | Behavior |
//! |----------|----------|
//! | `print(...)` | `tostring` each argument, tab-separated, newline, to captured stdout |
//! | `io.write(...)` / `io.stdout:write(...)` | to captured stdout |
//! | `io.stderr:write(...)` | to captured stderr |
//! | `io.output()` | the captured stdout handle; redirecting it raises |
//! | `io.read`, `io.input`, `io.lines()`, `io.stdin` | raise; the inbound stream belongs to the protocol |
//! | `io.close()` | no-op on the captured stdout |
//! | `log(level, msg)` | forwards to `tracing` |
//!
//! # Utilities (installed by `initialize`)
//!
//! | Function | Returns |
//! |----------|---------|
//! | `chunk_text(text?, size, overlap?)` | list of strings |
//! | `search_context(pattern, window?, max_results?)` | list of `{match, context, start, end}` |
//! | `count_matches(pattern)` | integer |
//! | `extract_json(text?)` | Lua value or nil |
//! | `extract_sections(header_pattern)` | list of `{header, content, start}` |
//! | `find_line(pattern)` | list of `{line_number, line}` |
//! | `count_lines(pattern?)` | integer |
//! | `get_line(n)` | string |
//! | `quote_match(pattern, max_length?)` | string |
//!
//! A nil `text` argument reads the context string. Strings that are not
//! valid UTF-8 are converted lossily.

use crate::capture::{OutputSink, Stream};
use crate::convert::json_to_lua;
use crate::utils;
use mlua::{
    Function, Lua, LuaSerdeExt, MultiValue, Result as LuaResult, String as LuaString, Table, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Names of the utility bindings installed by `initialize`.
pub const UTILITY_NAMES: &[&str] = &[
    "chunk_text",
    "search_context",
    "count_matches",
    "extract_json",
    "extract_sections",
    "find_line",
    "count_lines",
    "get_line",
    "quote_match",
];

/// Shared handle to the current context string.
///
/// Utilities take a snapshot at call start; `initialize` swaps the whole
/// string, never edits it.
#[derive(Debug, Clone)]
pub(crate) struct ContextText(Rc<RefCell<Rc<str>>>);

impl Default for ContextText {
    fn default() -> Self {
        Self(Rc::new(RefCell::new(Rc::from(""))))
    }
}

impl ContextText {
    pub(crate) fn snapshot(&self) -> Rc<str> {
        Rc::clone(&self.0.borrow())
    }

    pub(crate) fn replace(&self, text: &str) {
        *self.0.borrow_mut() = Rc::from(text);
    }
}

fn utility_error(err: crate::UtilityError) -> mlua::Error {
    mlua::Error::external(err)
}

fn lossy(s: LuaString) -> String {
    s.to_string_lossy()
}

fn lossy_opt(s: Option<LuaString>) -> Option<String> {
    s.map(lossy)
}

fn non_negative(value: Option<i64>, default: usize) -> usize {
    value.map_or(default, |v| usize::try_from(v).unwrap_or(0))
}

/// Builds the builtins table: output redirection plus `log`.
///
/// Lookups that miss the builtins fall through to the Lua globals.
pub(crate) fn create_builtins(lua: &Lua, sink: &OutputSink) -> LuaResult<Table> {
    let globals = lua.globals();
    let builtins = lua.create_table()?;

    let tostring: Function = globals.get("tostring")?;
    let out = sink.clone();
    let print = lua.create_function(move |_, args: MultiValue| {
        let mut line = String::new();
        for (i, arg) in args.into_iter().enumerate() {
            if i > 0 {
                line.push('\t');
            }
            line.push_str(&tostring.call::<LuaString>(arg)?.to_string_lossy());
        }
        line.push('\n');
        out.write(Stream::Stdout, &line);
        Ok(())
    })?;
    builtins.set("print", print)?;

    let stdout = create_stream(lua, sink, Stream::Stdout)?;
    let stderr = create_stream(lua, sink, Stream::Stderr)?;

    let io = lua.create_table()?;
    let out = sink.clone();
    let stdout_handle = stdout.clone();
    let write = lua.create_function(move |lua, args: MultiValue| {
        write_values(lua, &out, Stream::Stdout, args)?;
        Ok(stdout_handle.clone())
    })?;
    io.set("write", write)?;

    let output_handle = stdout.clone();
    let output = lua.create_function(move |_, file: Value| {
        if file.is_nil() {
            Ok(output_handle.clone())
        } else {
            Err(mlua::Error::RuntimeError(
                "io.output cannot be redirected in the sandbox".into(),
            ))
        }
    })?;
    io.set("output", output)?;

    io.set("stdout", stdout)?;
    io.set("stderr", stderr)?;
    io.set("stdin", create_stdin(lua)?)?;
    io.set("read", stdin_unavailable(lua, "io.read")?)?;
    io.set("input", stdin_unavailable(lua, "io.input")?)?;

    let original = globals.get::<Table>("io").ok();
    let original_lines = original
        .as_ref()
        .and_then(|io| io.get::<Function>("lines").ok());
    let lines = lua.create_function(move |_, args: MultiValue| {
        let has_file = args.front().is_some_and(|file| !file.is_nil());
        match &original_lines {
            Some(lines) if has_file => lines.call::<MultiValue>(args),
            _ => Err(mlua::Error::RuntimeError(
                "io.lines() without a file name reads stdin, which is unavailable in the sandbox"
                    .into(),
            )),
        }
    })?;
    io.set("lines", lines)?;

    let original_close = original
        .as_ref()
        .and_then(|io| io.get::<Function>("close").ok());
    let close = lua.create_function(move |_, args: MultiValue| {
        let real_file = matches!(args.front(), Some(Value::UserData(_)));
        match &original_close {
            Some(close) if real_file => close.call::<MultiValue>(args),
            _ => Ok(MultiValue::from_iter([Value::Boolean(true)])),
        }
    })?;
    io.set("close", close)?;

    if let Some(original) = original {
        let meta = lua.create_table()?;
        meta.set("__index", original)?;
        io.set_metatable(Some(meta));
    }
    builtins.set("io", io)?;

    let log = lua.create_function(|_, (level, msg): (LuaString, LuaString)| {
        let level = level.to_string_lossy();
        let msg = msg.to_string_lossy();
        match level.to_lowercase().as_str() {
            "trace" => tracing::trace!("[lua] {}", msg),
            "debug" => tracing::debug!("[lua] {}", msg),
            "warn" => tracing::warn!("[lua] {}", msg),
            "error" => tracing::error!("[lua] {}", msg),
            _ => tracing::info!("[lua] {}", msg),
        }
        Ok(())
    })?;
    builtins.set("log", log)?;

    let meta = lua.create_table()?;
    meta.set("__index", globals)?;
    builtins.set_metatable(Some(meta));

    Ok(builtins)
}

/// A file-like table whose `write` method targets one stream.
fn create_stream(lua: &Lua, sink: &OutputSink, stream: Stream) -> LuaResult<Table> {
    let handle = lua.create_table()?;

    let out = sink.clone();
    let write = lua.create_function(move |lua, (this, args): (Table, MultiValue)| {
        write_values(lua, &out, stream, args)?;
        Ok(this)
    })?;
    handle.set("write", write)?;
    handle.set("flush", lua.create_function(|_, this: Table| Ok(this))?)?;
    handle.set("close", lua.create_function(|_, _this: Table| Ok(true))?)?;
    handle.set(
        "setvbuf",
        lua.create_function(|_, _args: MultiValue| Ok(true))?,
    )?;

    Ok(handle)
}

/// Stand-in for `io.stdin`: every read raises.
fn create_stdin(lua: &Lua) -> LuaResult<Table> {
    let handle = lua.create_table()?;
    handle.set("read", stdin_unavailable(lua, "io.stdin:read")?)?;
    handle.set("lines", stdin_unavailable(lua, "io.stdin:lines")?)?;
    handle.set("close", lua.create_function(|_, _this: Table| Ok(true))?)?;
    Ok(handle)
}

fn stdin_unavailable(lua: &Lua, name: &'static str) -> LuaResult<Function> {
    lua.create_function(move |_, _args: MultiValue| -> LuaResult<()> {
        Err(mlua::Error::RuntimeError(format!(
            "{name} is unavailable in the sandbox: stdin carries the protocol"
        )))
    })
}

/// Writes strings and numbers as `io.write` does.
fn write_values(lua: &Lua, sink: &OutputSink, stream: Stream, args: MultiValue) -> LuaResult<()> {
    for (i, arg) in args.into_iter().enumerate() {
        let type_name = arg.type_name();
        match lua.coerce_string(arg)? {
            Some(s) => sink.write(stream, &s.to_string_lossy()),
            None => {
                return Err(mlua::Error::RuntimeError(format!(
                    "bad argument #{} to 'write' (string expected, got {type_name})",
                    i + 1
                )))
            }
        }
    }
    Ok(())
}

/// Installs the utility bindings into `env`.
pub(crate) fn install_utilities(lua: &Lua, env: &Table, text: &ContextText) -> LuaResult<()> {
    let t = text.clone();
    let chunk_text = lua.create_function(
        move |lua, (input, size, overlap): (Option<LuaString>, i64, Option<i64>)| {
            let chunks = match lossy_opt(input) {
                Some(input) => utils::chunk_text(&input, size, overlap.unwrap_or(0)),
                None => utils::chunk_text(&t.snapshot(), size, overlap.unwrap_or(0)),
            };
            lua.create_sequence_from(chunks)
        },
    )?;
    env.raw_set("chunk_text", chunk_text)?;

    let t = text.clone();
    let search_context = lua.create_function(
        move |lua, (pattern, window, max_results): (String, Option<i64>, Option<i64>)| {
            let hits = utils::search_context(
                &t.snapshot(),
                &pattern,
                non_negative(window, utils::DEFAULT_WINDOW),
                non_negative(max_results, utils::DEFAULT_MAX_RESULTS),
            )
            .map_err(utility_error)?;
            lua.to_value(&hits)
        },
    )?;
    env.raw_set("search_context", search_context)?;

    let t = text.clone();
    let count_matches = lua.create_function(move |_, pattern: String| {
        utils::count_matches(&t.snapshot(), &pattern).map_err(utility_error)
    })?;
    env.raw_set("count_matches", count_matches)?;

    let t = text.clone();
    let extract_json = lua.create_function(move |lua, input: Option<LuaString>| {
        let found = match lossy_opt(input) {
            Some(input) => utils::extract_json(&input),
            None => utils::extract_json(&t.snapshot()),
        };
        match found {
            Some(value) => json_to_lua(lua, &value),
            None => Ok(Value::Nil),
        }
    })?;
    env.raw_set("extract_json", extract_json)?;

    let t = text.clone();
    let extract_sections = lua.create_function(move |lua, pattern: String| {
        let sections = utils::extract_sections(&t.snapshot(), &pattern).map_err(utility_error)?;
        lua.to_value(&sections)
    })?;
    env.raw_set("extract_sections", extract_sections)?;

    let t = text.clone();
    let find_line = lua.create_function(move |lua, pattern: String| {
        let lines = utils::find_line(&t.snapshot(), &pattern).map_err(utility_error)?;
        lua.to_value(&lines)
    })?;
    env.raw_set("find_line", find_line)?;

    let t = text.clone();
    let count_lines = lua.create_function(move |_, pattern: Option<String>| {
        utils::count_lines(&t.snapshot(), pattern.as_deref()).map_err(utility_error)
    })?;
    env.raw_set("count_lines", count_lines)?;

    let t = text.clone();
    let get_line = lua.create_function(move |_, n: i64| Ok(utils::get_line(&t.snapshot(), n)))?;
    env.raw_set("get_line", get_line)?;

    let t = text.clone();
    let quote_match = lua.create_function(move |_, (pattern, max_length): (String, Option<i64>)| {
        utils::quote_match(
            &t.snapshot(),
            &pattern,
            non_negative(max_length, utils::DEFAULT_QUOTE_LENGTH),
        )
        .map_err(utility_error)
    })?;
    env.raw_set("quote_match", quote_match)?;

    Ok(())
}
