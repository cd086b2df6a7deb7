use std::collections::{BTreeMap, HashMap};

use log::debug;
use mlua::{Function, Lua, LuaOptions, MultiValue, StdLib, Table, Value};
use sail_lua_common::config::SessionConfig;

use crate::binding::ScriptSource;
use crate::error::{BridgeError, BridgeResult};
use crate::session::host::{self, InterruptHandle, Severity};
use crate::session::{Hook, ScriptEngine};
use crate::value::ScriptValue;

/// The global table holding the host functions and severity constants.
pub const HOST_NAMESPACE: &str = "fdw";

/// A Lua 5.4 state with the host namespace registered and the table script
/// loaded.
pub struct LuaEngine {
    lua: Lua,
    hooks: HashMap<Hook, Function>,
    interrupt: InterruptHandle,
    max_table_depth: usize,
}

impl LuaEngine {
    pub fn start(source: &ScriptSource, config: &SessionConfig) -> BridgeResult<Self> {
        let lua = if config.sandbox {
            let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE;
            Lua::new_with(libs, LuaOptions::default()).map_err(load_error)?
        } else {
            Lua::new()
        };
        if let Some(limit) = config.memory_limit {
            lua.set_memory_limit(limit).map_err(load_error)?;
        }
        let interrupt = InterruptHandle::new();
        register_host(&lua, &interrupt).map_err(load_error)?;

        if let Some(path) = &source.script {
            let code = std::fs::read_to_string(path).map_err(|e| {
                BridgeError::ScriptLoad(format!("cannot open {}: {e}", path.display()))
            })?;
            lua.load(code.as_str())
                .set_name(format!("@{}", path.display()))
                .exec()
                .map_err(load_error)?;
        }
        if let Some(inject) = &source.inject {
            lua.load(inject.as_str())
                .set_name("=inject")
                .exec()
                .map_err(load_error)?;
        }

        let globals = lua.globals();
        let mut hooks = HashMap::new();
        for hook in Hook::ALL {
            if let Ok(Value::Function(function)) = globals.get::<Value>(hook.name()) {
                hooks.insert(hook, function);
            }
        }
        debug!("loaded Lua script with {} hook(s)", hooks.len());

        Ok(Self {
            lua,
            hooks,
            interrupt,
            max_table_depth: config.max_table_depth,
        })
    }
}

impl ScriptEngine for LuaEngine {
    fn has_hook(&self, hook: Hook) -> bool {
        self.hooks.contains_key(&hook)
    }

    fn call(&mut self, hook: Hook, args: Vec<ScriptValue>) -> BridgeResult<Vec<ScriptValue>> {
        let Some(function) = self.hooks.get(&hook) else {
            return Ok(vec![]);
        };
        let args = args
            .iter()
            .map(|arg| to_lua(&self.lua, arg))
            .collect::<mlua::Result<Vec<_>>>()
            .map_err(|e| runtime_error(hook, e))?;
        let results = function
            .call::<MultiValue>(MultiValue::from_vec(args))
            .map_err(|e| runtime_error(hook, e))?;
        Ok(results
            .into_iter()
            .map(|value| from_lua(value, self.max_table_depth))
            .collect())
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    fn stop(self: Box<Self>) {
        let LuaEngine { lua, hooks, .. } = *self;
        drop(hooks);
        debug!("closing Lua state using {} bytes", lua.used_memory());
    }
}

fn register_host(lua: &Lua, interrupt: &InterruptHandle) -> mlua::Result<()> {
    let namespace = lua.create_table()?;
    for severity in Severity::ALL {
        namespace.set(severity.name(), severity.code())?;
    }
    let interrupt = interrupt.clone();
    let ereport = lua.create_function(move |_, (level, message): (i64, String)| {
        let severity = Severity::from_code(level)
            .ok_or_else(|| mlua::Error::runtime(format!("invalid severity level: {level}")))?;
        host::ereport(severity, &message, &interrupt).map_err(mlua::Error::external)
    })?;
    namespace.set("ereport", ereport)?;
    lua.globals().set(HOST_NAMESPACE, namespace)
}

fn load_error(err: mlua::Error) -> BridgeError {
    BridgeError::ScriptLoad(err.to_string())
}

/// Maps a failed hook call to an error, keeping the bridge error a host
/// function raised from inside the script.
fn runtime_error(hook: Hook, err: mlua::Error) -> BridgeError {
    bridge_error(&err).unwrap_or_else(|| BridgeError::ScriptRuntime {
        hook: hook.name(),
        message: err.to_string(),
    })
}

fn bridge_error(err: &mlua::Error) -> Option<BridgeError> {
    match err {
        mlua::Error::CallbackError { cause, .. } => bridge_error(cause),
        mlua::Error::WithContext { cause, .. } => bridge_error(cause),
        mlua::Error::ExternalError(e) => e.downcast_ref::<BridgeError>().cloned(),
        _ => None,
    }
}

fn to_lua(lua: &Lua, value: &ScriptValue) -> mlua::Result<Value> {
    let value = match value {
        ScriptValue::Nil => Value::Nil,
        ScriptValue::Boolean(v) => Value::Boolean(*v),
        ScriptValue::Integer(v) => Value::Integer(*v),
        ScriptValue::Number(v) => Value::Number(*v),
        ScriptValue::String(v) => Value::String(lua.create_string(v)?),
        ScriptValue::Bytes(v) => Value::String(lua.create_string(v)?),
        ScriptValue::Table(fields) => {
            let table = lua.create_table_with_capacity(0, fields.len())?;
            for (key, value) in fields {
                table.raw_set(key.as_str(), to_lua(lua, value)?)?;
            }
            Value::Table(table)
        }
        ScriptValue::List(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, value) in items.iter().enumerate() {
                table.raw_set(i + 1, to_lua(lua, value)?)?;
            }
            Value::Table(table)
        }
    };
    Ok(value)
}

/// Converts a Lua value. Tables nested deeper than `depth` become nil.
fn from_lua(value: Value, depth: usize) -> ScriptValue {
    match value {
        Value::Nil => ScriptValue::Nil,
        Value::Boolean(v) => ScriptValue::Boolean(v),
        Value::Integer(v) => ScriptValue::Integer(v),
        Value::Number(v) => ScriptValue::Number(v),
        Value::String(v) => match v.to_str() {
            Ok(text) => ScriptValue::String(str::to_owned(&text)),
            Err(_) => ScriptValue::Bytes(v.as_bytes().to_vec()),
        },
        Value::Table(table) if depth > 0 => from_lua_table(table, depth - 1),
        _ => ScriptValue::Nil,
    }
}

fn from_lua_table(table: Table, depth: usize) -> ScriptValue {
    let entries = table
        .pairs::<Value, Value>()
        .filter_map(Result::ok)
        .collect::<Vec<_>>();
    let mut indices = entries
        .iter()
        .filter_map(|(key, _)| match key {
            Value::Integer(i) => Some(*i),
            _ => None,
        })
        .collect::<Vec<_>>();
    indices.sort_unstable();
    let is_list = !entries.is_empty()
        && indices.len() == entries.len()
        && indices.iter().zip(1..).all(|(i, expected)| *i == expected);
    if is_list {
        let mut entries = entries;
        entries.sort_by_key(|(key, _)| match key {
            Value::Integer(i) => *i,
            _ => 0,
        });
        return ScriptValue::List(
            entries
                .into_iter()
                .map(|(_, value)| from_lua(value, depth))
                .collect(),
        );
    }
    let fields = entries
        .into_iter()
        .filter_map(|(key, value)| {
            // a key that is not valid UTF-8 cannot name a column
            let key = match key {
                Value::String(s) => str::to_owned(&s.to_str().ok()?),
                Value::Integer(i) => i.to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((key, from_lua(value, depth)))
        })
        .collect::<BTreeMap<_, _>>();
    ScriptValue::Table(fields)
}
