use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use datafusion::arrow::datatypes::{Schema, SchemaRef};
use datafusion::catalog::Session;
use datafusion::common::{not_impl_err, plan_err, DataFusionError, Result};
use datafusion::datasource::TableProvider;
use datafusion::logical_expr::dml::InsertOp;
use datafusion::logical_expr::{Expr, TableProviderFilterPushDown, TableType};
use datafusion::physical_plan::ExecutionPlan;
use log::debug;
use sail_lua_common::config::{AppConfig, ScanConfig, SessionConfig};

use super::exec::LuaScanExec;
use super::insert::LuaInsertExec;
use super::stream::ScanReadOptions;
use crate::binding::TableBinding;
use crate::capabilities::{updatable_operations, UpdatableOperations};
use crate::error::BridgeResult;
use crate::filter::{is_pushable, translate};
use crate::operator::OperatorCatalog;
use crate::planning::plan;

/// A table whose rows come from a Lua script.
///
/// Every scan plans on its own session. Filters of the shape the operator
/// catalog understands are handed to the script as conditions, but the engine
/// still applies them to the rows that come back.
#[derive(Debug, Clone)]
pub struct LuaTableProvider {
    binding: TableBinding,
    session_config: SessionConfig,
    scan_config: ScanConfig,
    catalog: Arc<OperatorCatalog>,
}

impl LuaTableProvider {
    pub fn try_new(
        name: impl Into<String>,
        schema: &Schema,
        options: &HashMap<String, String>,
        config: &AppConfig,
    ) -> BridgeResult<Self> {
        Ok(Self {
            binding: TableBinding::try_new(name, schema, options)?,
            session_config: config.session.clone(),
            scan_config: config.scan.clone(),
            catalog: Arc::new(OperatorCatalog::default()),
        })
    }

    pub fn with_operator_catalog(mut self, catalog: OperatorCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn binding(&self) -> &TableBinding {
        &self.binding
    }
}

#[async_trait]
impl TableProvider for LuaTableProvider {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        self.binding.schema()
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    async fn scan(
        &self,
        _state: &dyn Session,
        projection: Option<&Vec<usize>>,
        filters: &[Expr],
        limit: Option<usize>,
    ) -> Result<Arc<dyn ExecutionPlan>> {
        let schema = self.binding.schema();
        let projection = projection
            .cloned()
            .unwrap_or_else(|| (0..schema.fields().len()).collect());
        let projected_schema = Arc::new(schema.project(&projection)?);

        let binding = self.binding.clone();
        let session_config = self.session_config.clone();
        let catalog = Arc::clone(&self.catalog);
        let filters = filters.to_vec();
        let (scan, estimates) = tokio::task::spawn_blocking(move || -> BridgeResult<_> {
            let conditions = translate(&filters, binding.columns(), &catalog);
            let planned = plan(binding, &session_config)?;
            let estimates = *planned.estimates();
            Ok((planned.into_scan(conditions), estimates))
        })
        .await
        .map_err(|e| DataFusionError::External(Box::new(e)))??;
        debug!(
            "planned scan of {} with {} condition(s)",
            self.binding.name(),
            scan.conditions().len()
        );

        let read_options = ScanReadOptions {
            projection,
            limit,
            batch_size: self.scan_config.batch_size,
            channel_capacity: self.scan_config.channel_capacity,
        };
        Ok(Arc::new(LuaScanExec::new(
            scan,
            projected_schema,
            read_options,
            estimates,
        )))
    }

    fn supports_filters_pushdown(
        &self,
        filters: &[&Expr],
    ) -> Result<Vec<TableProviderFilterPushDown>> {
        Ok(filters
            .iter()
            .map(|expr| {
                if is_pushable(expr, self.binding.columns(), &self.catalog) {
                    TableProviderFilterPushDown::Inexact
                } else {
                    TableProviderFilterPushDown::Unsupported
                }
            })
            .collect())
    }

    async fn insert_into(
        &self,
        _state: &dyn Session,
        input: Arc<dyn ExecutionPlan>,
        insert_op: InsertOp,
    ) -> Result<Arc<dyn ExecutionPlan>> {
        if insert_op != InsertOp::Append {
            return not_impl_err!("{insert_op} is not supported for scripted tables");
        }
        if !updatable_operations().contains(UpdatableOperations::INSERT) {
            return plan_err!("table {} does not allow inserts", self.binding.name());
        }
        Ok(Arc::new(LuaInsertExec::new(
            input,
            self.binding.clone(),
            self.session_config.clone(),
            self.scan_config.channel_capacity,
        )))
    }
}
