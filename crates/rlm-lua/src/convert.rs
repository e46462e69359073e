//! Conversions between Lua values and JSON.

use mlua::{DeserializeOptions, Function, Lua, LuaSerdeExt, SerializeOptions, Value};

/// JSON → Lua. `null` becomes `nil`, arrays keep the array metatable.
pub(crate) fn json_to_lua(lua: &Lua, value: &serde_json::Value) -> mlua::Result<Value> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(value, options)
}

/// Lua → JSON, or `None` when the value has no JSON form
/// (functions, userdata, threads, tables with non-string keys, cycles,
/// NaN and infinities anywhere in the value).
pub(crate) fn lua_to_json(lua: &Lua, value: Value) -> Option<serde_json::Value> {
    if has_non_finite(&value, &mut Vec::new()) {
        return None;
    }
    let options = DeserializeOptions::new()
        .deny_unsupported_types(true)
        .deny_recursive_tables(true);
    lua.from_value_with(value, options).ok()
}

/// serde_json writes non-finite floats as `null`; catch them first.
fn has_non_finite(value: &Value, seen: &mut Vec<*const std::ffi::c_void>) -> bool {
    match value {
        Value::Number(n) => !n.is_finite(),
        Value::Table(table) => {
            let ptr = table.to_pointer();
            if seen.contains(&ptr) {
                return false;
            }
            seen.push(ptr);
            table
                .pairs::<Value, Value>()
                .filter_map(Result::ok)
                .any(|(key, item)| has_non_finite(&key, seen) || has_non_finite(&item, seen))
        }
        _ => false,
    }
}

/// Human-readable form, as Lua's `tostring` renders it.
pub(crate) fn display(lua: &Lua, value: Value) -> String {
    let rendered = lua
        .globals()
        .get::<Function>("tostring")
        .and_then(|tostring| tostring.call::<mlua::String>(value.clone()));
    match rendered {
        Ok(s) => s.to_string_lossy(),
        Err(_) => format!("<{}>", value.type_name()),
    }
}
