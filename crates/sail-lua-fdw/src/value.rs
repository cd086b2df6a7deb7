use std::collections::BTreeMap;

/// A value exchanged with a table script, independent of the script engine.
///
/// Script tables whose keys are exactly `1..=n` become [`ScriptValue::List`];
/// every other table becomes [`ScriptValue::Table`] with its keys rendered as
/// strings. Values with no counterpart (functions, userdata, threads) are
/// [`ScriptValue::Nil`]. Script strings that are not valid UTF-8 are kept
/// as [`ScriptValue::Bytes`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    Table(BTreeMap<String, ScriptValue>),
    List(Vec<ScriptValue>),
}

impl ScriptValue {
    pub fn table<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ScriptValue)>,
        K: Into<String>,
    {
        ScriptValue::Table(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }

    /// Looks up a field by name. List elements are addressed by their
    /// one-based position.
    pub fn field(&self, name: &str) -> Option<&ScriptValue> {
        match self {
            ScriptValue::Table(fields) => fields.get(name),
            ScriptValue::List(items) => name
                .parse::<usize>()
                .ok()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| items.get(i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Reads a number, accepting numeric strings the way the script engine
    /// coerces them in arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScriptValue::Integer(v) => Some(*v as f64),
            ScriptValue::Number(v) => Some(*v),
            ScriptValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::String(value)
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Boolean(value)
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        ScriptValue::Integer(value)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        ScriptValue::Number(value)
    }
}
