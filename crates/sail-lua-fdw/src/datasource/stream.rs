use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use datafusion::arrow::array::{ArrayRef, RecordBatch, RecordBatchOptions};
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::common::{DataFusionError, Result, ScalarValue};
use datafusion::physical_plan::RecordBatchStream;
use futures::Stream;
use log::debug;
use tokio::sync::{mpsc, oneshot};

use crate::scan::ScanLifecycle;
use crate::session::InterruptHandle;
use crate::types::Row;

/// How a scan stream turns script rows into batches.
#[derive(Debug, Clone)]
pub struct ScanReadOptions {
    /// Indices of the table columns to emit.
    pub projection: Vec<usize>,
    pub limit: Option<usize>,
    pub batch_size: usize,
    pub channel_capacity: usize,
}

enum StreamState {
    Running {
        stop_signal: Option<oneshot::Sender<()>>,
        reader: Option<std::thread::JoinHandle<()>>,
        rx: mpsc::Receiver<Result<RecordBatch>>,
        interrupt: InterruptHandle,
    },
    Stopped,
}

/// Record batches read from a scan on a dedicated thread.
///
/// Script calls block, so they run on their own thread rather than on the
/// async runtime. Dropping the stream signals the thread to stop, interrupts
/// the script it may be running and joins it. The interrupt is withdrawn once
/// the thread has returned, so the scan can still be restarted or ended.
pub struct LuaScanStream {
    schema: SchemaRef,
    state: StreamState,
}

impl LuaScanStream {
    pub fn new(
        scan: Arc<Mutex<ScanLifecycle>>,
        schema: SchemaRef,
        options: ScanReadOptions,
        interrupt: InterruptHandle,
    ) -> Self {
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let reader_schema = Arc::clone(&schema);
        let reader = std::thread::spawn(move || {
            Self::run_reader(scan, reader_schema, options, tx, stop_rx);
        });
        Self {
            schema,
            state: StreamState::Running {
                stop_signal: Some(stop_tx),
                reader: Some(reader),
                rx,
                interrupt,
            },
        }
    }

    fn run_reader(
        scan: Arc<Mutex<ScanLifecycle>>,
        schema: SchemaRef,
        options: ScanReadOptions,
        tx: mpsc::Sender<Result<RecordBatch>>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let batch_size = options.batch_size.max(1);
        let mut rows = Vec::with_capacity(batch_size);
        let mut produced = 0usize;
        loop {
            match stop_rx.try_recv() {
                Ok(_) | Err(oneshot::error::TryRecvError::Closed) => return,
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
            if options.limit.is_some_and(|limit| produced + rows.len() >= limit) {
                break;
            }
            let next = match scan.lock() {
                Ok(mut scan) => scan.next(),
                Err(_) => {
                    let _ = tx.blocking_send(Err(DataFusionError::Internal(
                        "scan lock poisoned".to_string(),
                    )));
                    return;
                }
            };
            match next {
                Ok(Some(row)) => {
                    rows.push(row);
                    if rows.len() >= batch_size {
                        produced += rows.len();
                        let batch = rows_to_batch(&schema, &options.projection, &rows);
                        rows.clear();
                        if tx.blocking_send(batch).is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e.into()));
                    return;
                }
            }
        }
        if !rows.is_empty() {
            produced += rows.len();
            let _ = tx.blocking_send(rows_to_batch(&schema, &options.projection, &rows));
        }
        debug!("scan stream produced {produced} row(s)");
    }
}

/// Builds a batch of the projected columns from rows of the full table.
pub(crate) fn rows_to_batch(schema: &SchemaRef, projection: &[usize], rows: &[Row]) -> Result<RecordBatch> {
    let columns = projection
        .iter()
        .map(|&i| {
            let values = rows.iter().map(|row| {
                row.values()
                    .get(i)
                    .cloned()
                    .unwrap_or(ScalarValue::Null)
            });
            ScalarValue::iter_to_array(values)
        })
        .collect::<Result<Vec<ArrayRef>>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(schema),
        columns,
        &options,
    )?)
}

impl Stream for LuaScanStream {
    type Item = Result<RecordBatch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.state {
            StreamState::Running { rx, .. } => rx.poll_recv(cx),
            StreamState::Stopped => Poll::Ready(None),
        }
    }
}

impl RecordBatchStream for LuaScanStream {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl Drop for LuaScanStream {
    fn drop(&mut self) {
        let state = std::mem::replace(&mut self.state, StreamState::Stopped);
        if let StreamState::Running {
            stop_signal,
            reader,
            rx,
            interrupt,
        } = state
        {
            if let Some(signal) = stop_signal {
                let _ = signal.send(());
            }
            // unblocks a reader waiting on a full channel
            drop(rx);
            if let Some(reader) = reader {
                if !reader.is_finished() {
                    interrupt.interrupt();
                }
                let _ = reader.join();
            }
            interrupt.clear();
        }
    }
}
