use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use datafusion::arrow::datatypes::{Field, Schema};
use datafusion::prelude::SessionContext;
use log::info;
use sail_lua_common::config::AppConfig;
use sail_lua_fdw::options::{INJECT_OPTION, SCRIPT_OPTION};
use sail_lua_fdw::types::LogicalType;
use sail_lua_fdw::LuaTableProvider;
use sail_lua_telemetry::{init_telemetry, shutdown_telemetry};

pub struct QueryArgs {
    pub table: String,
    pub columns: String,
    pub script: Option<PathBuf>,
    pub inject: Option<String>,
    pub sql: String,
}

/// Parses `name:type` pairs into a schema. Every column is nullable.
fn parse_columns(columns: &str) -> Result<Schema, Box<dyn std::error::Error>> {
    let fields = columns
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|column| -> Result<Field, Box<dyn std::error::Error>> {
            let (name, logical_type) = column
                .split_once(':')
                .ok_or_else(|| format!("invalid column definition: {column}"))?;
            let logical_type = logical_type.trim().parse::<LogicalType>()?;
            Ok(Field::new(
                name.trim(),
                logical_type.default_data_type(),
                true,
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if fields.is_empty() {
        return Err("at least one column is required".into());
    }
    Ok(Schema::new(fields))
}

pub fn run_query(args: QueryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_telemetry(&config.telemetry)?;

    let schema = parse_columns(&args.columns)?;
    let mut options = HashMap::new();
    if let Some(script) = &args.script {
        options.insert(SCRIPT_OPTION.to_string(), script.to_string_lossy().into_owned());
    }
    if let Some(inject) = args.inject {
        options.insert(INJECT_OPTION.to_string(), inject);
    }
    let provider = LuaTableProvider::try_new(args.table.as_str(), &schema, &options, &config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let ctx = SessionContext::new();
        ctx.register_table(args.table.as_str(), Arc::new(provider))?;
        info!("running query against {}", args.table);
        ctx.sql(&args.sql).await?.show().await?;
        <Result<(), Box<dyn std::error::Error>>>::Ok(())
    })?;

    shutdown_telemetry();

    Ok(())
}

#[cfg(test)]
mod tests {
    use datafusion::arrow::datatypes::DataType;

    use super::*;

    #[test]
    fn test_parse_columns() {
        let schema = parse_columns("id:integer, name:text,born:date").unwrap();
        let types = schema
            .fields()
            .iter()
            .map(|f| (f.name().as_str(), f.data_type().clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                ("id", DataType::Int64),
                ("name", DataType::Utf8),
                ("born", DataType::Date32),
            ]
        );
    }

    #[test]
    fn test_parse_columns_rejects_bad_input() {
        assert!(parse_columns("").is_err());
        assert!(parse_columns("id").is_err());
        assert!(parse_columns("id:blob").is_err());
    }
}
