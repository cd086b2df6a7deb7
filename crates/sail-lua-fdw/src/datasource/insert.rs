use std::any::Any;
use std::fmt;
use std::sync::Arc;

use datafusion::arrow::array::{RecordBatch, UInt64Array};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::common::{exec_err, internal_err, DataFusionError, Result, ScalarValue};
use datafusion::execution::TaskContext;
use datafusion::physical_expr::EquivalenceProperties;
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    execute_stream, DisplayAs, DisplayFormatType, ExecutionPlan, Partitioning, PlanProperties,
    SendableRecordBatchStream,
};
use futures::StreamExt;
use log::debug;
use sail_lua_common::config::SessionConfig;
use tokio::sync::{mpsc, oneshot};

use crate::binding::TableBinding;
use crate::error::{BridgeError, BridgeResult};
use crate::modify::{ModifyLifecycle, ModifyOperation};
use crate::session::{InterruptHandle, Session};
use crate::types::Row;

/// Physical plan node that inserts its input rows through a table script.
///
/// Output is a single `count` row with the number of rows handed to the script.
#[derive(Debug)]
pub struct LuaInsertExec {
    input: Arc<dyn ExecutionPlan>,
    binding: TableBinding,
    session_config: SessionConfig,
    channel_capacity: usize,
    properties: PlanProperties,
}

impl LuaInsertExec {
    pub fn new(
        input: Arc<dyn ExecutionPlan>,
        binding: TableBinding,
        session_config: SessionConfig,
        channel_capacity: usize,
    ) -> Self {
        let properties = PlanProperties::new(
            EquivalenceProperties::new(Self::count_schema()),
            Partitioning::UnknownPartitioning(1),
            EmissionType::Final,
            Boundedness::Bounded,
        );
        Self {
            input,
            binding,
            session_config,
            channel_capacity,
            properties,
        }
    }

    fn count_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("count", DataType::UInt64, false)]))
    }

    pub fn input(&self) -> &Arc<dyn ExecutionPlan> {
        &self.input
    }

    async fn insert_all(
        input: Arc<dyn ExecutionPlan>,
        binding: TableBinding,
        session_config: SessionConfig,
        channel_capacity: usize,
        context: Arc<TaskContext>,
    ) -> Result<RecordBatch> {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let (handle_tx, handle_rx) = oneshot::channel();
        let writer = tokio::task::spawn_blocking(move || -> Result<u64> {
            let session = Session::start(binding.source(), &session_config)?;
            let _ = handle_tx.send(session.interrupt_handle());
            let modify = ModifyLifecycle::new(binding.clone(), &session_config);
            write_batches(&binding, modify, session, rx)
        });
        let mut guard = InterruptOnDrop(handle_rx.await.ok());
        let fed = Self::feed(input, context, &tx).await;
        if fed.is_ok() {
            let _ = tx.send(WriterMessage::Finish).await;
        }
        drop(tx);
        let written = writer
            .await
            .map_err(|e| DataFusionError::External(Box::new(e)))?;
        guard.disarm();
        fed?;
        let count = written?;
        Ok(RecordBatch::try_new(
            Self::count_schema(),
            vec![Arc::new(UInt64Array::from(vec![count]))],
        )?)
    }

    async fn feed(
        input: Arc<dyn ExecutionPlan>,
        context: Arc<TaskContext>,
        tx: &mpsc::Sender<WriterMessage>,
    ) -> Result<()> {
        let mut stream = execute_stream(input, context)?;
        while let Some(batch) = stream.next().await {
            if tx.send(WriterMessage::Batch(batch?)).await.is_err() {
                // the writer stopped and reports its own error
                break;
            }
        }
        Ok(())
    }
}

/// Messages from the input side to the blocking writer.
enum WriterMessage {
    Batch(RecordBatch),
    /// The input completed. A writer whose channel closes without it aborts.
    Finish,
}

/// Interrupts the writer's script when the insert is dropped before the
/// writer returns.
struct InterruptOnDrop(Option<InterruptHandle>);

impl InterruptOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.interrupt();
        }
    }
}

/// Drives the modify lifecycle over the incoming batches. `EndForeignModify`
/// runs only after [`WriterMessage::Finish`]; any error or a closed channel
/// aborts the modify instead.
fn write_batches(
    binding: &TableBinding,
    mut modify: ModifyLifecycle,
    session: Session,
    mut rx: mpsc::Receiver<WriterMessage>,
) -> Result<u64> {
    modify.begin_with_session(session)?;
    let mut count = 0u64;
    while let Some(message) = rx.blocking_recv() {
        let batch = match message {
            WriterMessage::Batch(batch) => batch,
            WriterMessage::Finish => {
                modify.end()?;
                debug!("inserted {count} row(s) into {}", binding.name());
                return Ok(count);
            }
        };
        if batch.num_columns() != binding.columns().len() {
            return internal_err!(
                "insert into {} expects {} column(s) but got {}",
                binding.name(),
                binding.columns().len(),
                batch.num_columns()
            );
        }
        for row in batch_to_rows(binding, &batch)? {
            if modify.execute(ModifyOperation::Insert, &row)?.is_some() {
                count += 1;
            }
        }
    }
    modify.abort();
    exec_err!("insert into {} stopped before its input completed", binding.name())
}

/// Splits a batch into rows of the table, casting columns to the table types.
fn batch_to_rows(binding: &TableBinding, batch: &RecordBatch) -> BridgeResult<Vec<Row>> {
    let columns = binding
        .columns()
        .iter()
        .zip(batch.columns())
        .map(|(column, array)| {
            if array.data_type() == column.data_type() {
                Ok(Arc::clone(array))
            } else {
                cast(array, column.data_type())
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| BridgeError::internal(e.to_string()))?;
    (0..batch.num_rows())
        .map(|i| {
            let values = columns
                .iter()
                .map(|array| ScalarValue::try_from_array(array, i))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BridgeError::internal(e.to_string()))?;
            Ok(Row::try_new(Arc::clone(binding.columns()), values)?)
        })
        .collect()
}

impl DisplayAs for LuaInsertExec {
    fn fmt_as(&self, t: DisplayFormatType, f: &mut fmt::Formatter) -> fmt::Result {
        match t {
            DisplayFormatType::Default | DisplayFormatType::Verbose => {
                write!(f, "LuaInsertExec: table={}", self.binding.name())
            }
        }
    }
}

impl ExecutionPlan for LuaInsertExec {
    fn name(&self) -> &str {
        "LuaInsertExec"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.properties
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.input]
    }

    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> Result<Arc<dyn ExecutionPlan>> {
        if children.len() != 1 {
            return internal_err!("LuaInsertExec should have exactly one child");
        }
        Ok(Arc::new(Self::new(
            Arc::clone(&children[0]),
            self.binding.clone(),
            self.session_config.clone(),
            self.channel_capacity,
        )))
    }

    fn execute(
        &self,
        partition: usize,
        context: Arc<TaskContext>,
    ) -> Result<SendableRecordBatchStream> {
        if partition != 0 {
            return internal_err!("LuaInsertExec can only be executed in a single partition");
        }
        let stream = futures::stream::once(Self::insert_all(
            Arc::clone(&self.input),
            self.binding.clone(),
            self.session_config.clone(),
            self.channel_capacity,
            context,
        ));
        Ok(Box::pin(RecordBatchStreamAdapter::new(
            Self::count_schema(),
            stream,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use datafusion::arrow::array::{Int32Array, Int64Array, StringArray};
    use sail_lua_common::config::SessionConfig;

    use super::*;
    use crate::session::testing::{Recorder, RecordingEngine};
    use crate::session::Hook;

    fn users() -> TableBinding {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]);
        TableBinding::try_new("users", &schema, &HashMap::new()).unwrap()
    }

    fn writer_session() -> (Session, Recorder) {
        let (engine, recorder) = RecordingEngine::new();
        let session = engine
            .with_hook(Hook::ExecForeignInsert, |_| Ok(vec![]))
            .with_hook(Hook::EndForeignModify, |_| Ok(vec![]))
            .into_session();
        (session, recorder)
    }

    fn two_users() -> RecordBatch {
        RecordBatch::try_new(
            users().schema(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("Alice"), None])),
            ],
        )
        .unwrap()
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            sandbox: false,
            memory_limit: None,
            max_table_depth: 16,
        }
    }

    #[test]
    fn test_batch_to_rows_casts_columns() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]);
        let binding = TableBinding::try_new("users", &schema, &HashMap::new()).unwrap();
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("id", DataType::Int32, false),
                Field::new("name", DataType::Utf8, true),
            ])),
            vec![
                Arc::new(Int32Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("Alice"), None])),
            ],
        )
        .unwrap();
        let rows = batch_to_rows(&binding, &batch).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&ScalarValue::Int64(Some(1))));
        assert_eq!(rows[1].get("name"), Some(&ScalarValue::Utf8(None)));
    }

    #[test]
    fn test_writer_ends_modify_after_finish() {
        let binding = users();
        let (session, recorder) = writer_session();
        let modify = ModifyLifecycle::new(binding.clone(), &session_config());
        let (tx, rx) = mpsc::channel(4);
        tx.blocking_send(WriterMessage::Batch(two_users())).unwrap();
        tx.blocking_send(WriterMessage::Finish).unwrap();
        let count = write_batches(&binding, modify, session, rx).unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            recorder.calls(),
            vec![
                Hook::ExecForeignInsert,
                Hook::ExecForeignInsert,
                Hook::EndForeignModify,
            ]
        );
        assert_eq!(recorder.stops(), 1);
    }

    #[test]
    fn test_writer_aborts_when_input_stops_early() {
        let binding = users();
        let (session, recorder) = writer_session();
        let modify = ModifyLifecycle::new(binding.clone(), &session_config());
        let (tx, rx) = mpsc::channel(4);
        tx.blocking_send(WriterMessage::Batch(two_users())).unwrap();
        drop(tx);
        let err = write_batches(&binding, modify, session, rx).unwrap_err();
        assert!(err.to_string().contains("stopped before its input completed"), "{err}");
        assert_eq!(
            recorder.calls(),
            vec![Hook::ExecForeignInsert, Hook::ExecForeignInsert]
        );
        assert_eq!(recorder.stops(), 1);
    }

    #[test]
    fn test_writer_failure_skips_end_hook() {
        let binding = users();
        let (engine, recorder) = RecordingEngine::new();
        let session = engine
            .with_hook(Hook::ExecForeignInsert, |_| {
                Err(BridgeError::internal("disk full"))
            })
            .with_hook(Hook::EndForeignModify, |_| Ok(vec![]))
            .into_session();
        let modify = ModifyLifecycle::new(binding.clone(), &session_config());
        let (tx, rx) = mpsc::channel(4);
        tx.blocking_send(WriterMessage::Batch(two_users())).unwrap();
        tx.blocking_send(WriterMessage::Finish).unwrap();
        assert!(write_batches(&binding, modify, session, rx).is_err());
        assert_eq!(recorder.calls(), vec![Hook::ExecForeignInsert]);
        assert_eq!(recorder.stops(), 1);
    }

    #[test]
    fn test_dropped_insert_interrupts_writer() {
        let interrupt = InterruptHandle::new();
        drop(InterruptOnDrop(Some(interrupt.clone())));
        assert!(interrupt.is_interrupted());

        let interrupt = InterruptHandle::new();
        let mut guard = InterruptOnDrop(Some(interrupt.clone()));
        guard.disarm();
        drop(guard);
        assert!(!interrupt.is_interrupted());
    }
}
