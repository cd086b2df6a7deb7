use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use datafusion::arrow::datatypes::{Schema, SchemaRef};

use crate::error::BridgeResult;
use crate::options::{validate_options, OptionContext, INJECT_OPTION, SCRIPT_OPTION};
use crate::types::ColumnDescriptor;
use crate::value::ScriptValue;

/// Where the Lua source of a table comes from. Both parts are optional and the
/// file is loaded before the inline text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSource {
    pub script: Option<PathBuf>,
    pub inject: Option<String>,
}

impl ScriptSource {
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        Self {
            script: options.get(SCRIPT_OPTION).map(PathBuf::from),
            inject: options.get(INJECT_OPTION).cloned(),
        }
    }
}

/// A scripted table: its name, columns, and script source.
#[derive(Debug, Clone)]
pub struct TableBinding {
    name: String,
    schema: SchemaRef,
    columns: Arc<[ColumnDescriptor]>,
    source: ScriptSource,
}

impl TableBinding {
    /// Creates a binding from an Arrow schema and the table options.
    pub fn try_new(
        name: impl Into<String>,
        schema: &Schema,
        options: &HashMap<String, String>,
    ) -> BridgeResult<Self> {
        validate_options(OptionContext::ForeignTable, options.keys().map(String::as_str))?;
        let columns = schema
            .fields()
            .iter()
            .map(|field| ColumnDescriptor::try_new(field.name().clone(), field.data_type().clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            schema: Arc::new(schema.clone()),
            columns: Arc::from(columns),
            source: ScriptSource::from_options(options),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn columns(&self) -> &Arc<[ColumnDescriptor]> {
        &self.columns
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    /// The `{table, columns}` context handed to every hook.
    pub fn script_context(&self) -> ScriptValue {
        let columns = self
            .columns
            .iter()
            .map(|c| (c.name(), ScriptValue::from(c.logical_type().name())));
        ScriptValue::table([
            ("table", ScriptValue::from(self.name.as_str())),
            ("columns", ScriptValue::table(columns)),
        ])
    }
}
