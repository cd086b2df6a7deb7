use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use datafusion::arrow::datatypes::SchemaRef;
use datafusion::common::stats::Precision;
use datafusion::common::{exec_err, internal_err, DataFusionError, Result, Statistics};
use datafusion::execution::TaskContext;
use datafusion::physical_expr::EquivalenceProperties;
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, ExecutionPlan, Partitioning, PlanProperties,
    SendableRecordBatchStream,
};
use log::debug;

use super::stream::{LuaScanStream, ScanReadOptions};
use crate::planning::ScanEstimates;
use crate::scan::{ScanLifecycle, ScanState};

/// Physical plan node reading a scripted table.
///
/// The node owns the scan lifecycle created when the query was planned. The
/// first execution begins the scan and later executions restart it. The scan
/// ends when the node is dropped.
#[derive(Debug)]
pub struct LuaScanExec {
    scan: Arc<Mutex<ScanLifecycle>>,
    table_name: String,
    schema: SchemaRef,
    read_options: ScanReadOptions,
    estimates: ScanEstimates,
    properties: PlanProperties,
}

impl LuaScanExec {
    pub fn new(
        scan: ScanLifecycle,
        schema: SchemaRef,
        read_options: ScanReadOptions,
        estimates: ScanEstimates,
    ) -> Self {
        let table_name = scan.binding().name().to_string();
        let properties = PlanProperties::new(
            EquivalenceProperties::new(Arc::clone(&schema)),
            Partitioning::UnknownPartitioning(1),
            EmissionType::Incremental,
            Boundedness::Bounded,
        );
        Self {
            scan: Arc::new(Mutex::new(scan)),
            table_name,
            schema,
            read_options,
            estimates,
            properties,
        }
    }

    pub fn estimates(&self) -> &ScanEstimates {
        &self.estimates
    }

    /// Runs a closure on the scan lifecycle.
    pub fn with_scan<T>(&self, f: impl FnOnce(&mut ScanLifecycle) -> T) -> Result<T> {
        let mut scan = self
            .scan
            .lock()
            .map_err(|_| DataFusionError::Internal("scan lock poisoned".to_string()))?;
        Ok(f(&mut scan))
    }
}

impl DisplayAs for LuaScanExec {
    fn fmt_as(&self, t: DisplayFormatType, f: &mut fmt::Formatter) -> fmt::Result {
        let ScanEstimates {
            rows,
            width,
            startup_cost,
            total_cost,
        } = self.estimates;
        match t {
            DisplayFormatType::Default | DisplayFormatType::Verbose => {
                write!(
                    f,
                    "LuaScanExec: table={}, rows={rows}, cost={startup_cost:.2}..{total_cost:.2}",
                    self.table_name
                )?;
                if let Some(width) = width {
                    write!(f, ", width={width}")?;
                }
                if let Some(limit) = self.read_options.limit {
                    write!(f, ", limit={limit}")?;
                }
                // the scan is busy while a stream is reading
                if let Ok(mut scan) = self.scan.try_lock() {
                    if !scan.conditions().is_empty() {
                        let conditions = scan
                            .conditions()
                            .iter()
                            .map(|c| format!("{} {} {}", c.column, c.operator, c.literal))
                            .collect::<Vec<_>>();
                        write!(f, ", conditions=[{}]", conditions.join(", "))?;
                    }
                    if let Ok(Some(text)) = scan.explain() {
                        write!(f, ", script={text}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl ExecutionPlan for LuaScanExec {
    fn name(&self) -> &str {
        "LuaScanExec"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.properties
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }

    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> Result<Arc<dyn ExecutionPlan>> {
        if !children.is_empty() {
            return internal_err!("LuaScanExec should have no children");
        }
        Ok(self)
    }

    fn execute(
        &self,
        partition: usize,
        _context: Arc<TaskContext>,
    ) -> Result<SendableRecordBatchStream> {
        if partition != 0 {
            return internal_err!("LuaScanExec can only be executed in a single partition");
        }
        let interrupt = self.with_scan(|scan| {
            match scan.state() {
                ScanState::Created => scan.begin()?,
                ScanState::Began | ScanState::Iterating => {
                    debug!("restarting scan of {}", self.table_name);
                    scan.rescan()?
                }
                ScanState::Ended => {
                    return exec_err!("scan of {} has already ended", self.table_name)
                }
            }
            scan.interrupt_handle().ok_or_else(|| {
                DataFusionError::Internal(format!("scan of {} has no session", self.table_name))
            })
        })??;
        Ok(Box::pin(LuaScanStream::new(
            Arc::clone(&self.scan),
            Arc::clone(&self.schema),
            self.read_options.clone(),
            interrupt,
        )))
    }

    fn statistics(&self) -> Result<Statistics> {
        let mut rows = self.estimates.rows.max(0.0) as usize;
        if let Some(limit) = self.read_options.limit {
            rows = rows.min(limit);
        }
        let total_byte_size = match self.estimates.width {
            Some(width) if width > 0 => Precision::Inexact(rows.saturating_mul(width as usize)),
            _ => Precision::Absent,
        };
        Ok(Statistics {
            num_rows: Precision::Inexact(rows),
            total_byte_size,
            column_statistics: Statistics::unknown_column(&self.schema),
        })
    }
}
