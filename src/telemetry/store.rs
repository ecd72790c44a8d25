//! Sink feeding the analytical store.
//!
//! `accept` only queues the record; a single writer task performs the
//! inserts in order. A failed insert is reported by the writer itself,
//! naming the record that was lost, to the other sinks of the fan-out.

use std::sync::Weak;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::fanout::{Fanout, LogSink, SinkError};
use super::record::LogRecord;
use crate::db::Db;

pub const STORE_SINK: &str = "store";

pub struct StoreSink {
    tx: UnboundedSender<LogRecord>,
}

/// The background task writing queued records to the store.
pub struct StoreWriter {
    handle: JoinHandle<u64>,
}

impl StoreWriter {
    /// Wait until every record queued before the sink was dropped has been
    /// written or reported. Returns the number of records written.
    pub async fn finish(self) -> u64 {
        self.handle.await.unwrap_or(0)
    }
}

/// Create a sink and spawn its writer. Insert failures are reported
/// through `reports` while it is alive. Must be called inside a tokio
/// runtime.
pub fn store_sink(db: Db, reports: Weak<Fanout>) -> (StoreSink, StoreWriter) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(write_records(db, rx, reports));
    (StoreSink { tx }, StoreWriter { handle })
}

async fn write_records(db: Db, mut rx: UnboundedReceiver<LogRecord>, reports: Weak<Fanout>) -> u64 {
    let mut written = 0;
    while let Some(record) = rx.recv().await {
        match db.insert_record(&record).await {
            Ok(()) => written += 1,
            Err(e) => {
                if let Some(fanout) = reports.upgrade() {
                    fanout.report_failure(STORE_SINK, &SinkError::Store(e.to_string()), &record);
                }
            }
        }
    }
    written
}

impl LogSink for StoreSink {
    fn name(&self) -> &str {
        STORE_SINK
    }

    fn accept(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.tx.send(record.clone()).map_err(|_| SinkError::Closed)
    }
}
