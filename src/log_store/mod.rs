//! Warning and error log sink.
//!
//! [`LogStoreLayer`] is a `tracing_subscriber` layer that copies every WARN
//! and ERROR event onto a bounded channel. [`LogStore`] owns the receiving
//! end: after [`LogStore::startup`] a background task writes each record to
//! a [`LogSink`], and [`LogStore::shutdown`] drains what is left before the
//! sink is closed. Records that cannot be written are printed to stderr.
//!
//! - [`MongoLogSink`]: a MongoDB collection
//! - [`MemoryLogSink`]: in-process list, for tests

mod layer;
mod memory;
mod mongo;

pub use layer::LogStoreLayer;
pub use memory::MemoryLogSink;
pub use mongo::MongoLogSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{ConfigError, Settings};

/// One warning or error event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    /// `WARN` or `ERROR`
    pub level: String,
    /// Event message followed by its `key=value` fields
    pub message: String,
    pub target: String,
    pub module: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {}",
            self.timestamp.to_rfc3339(),
            self.level,
            self.target,
            self.message
        )
    }
}

/// Errors raised by a log sink
#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    #[error("Failed to connect to the log store: {0}")]
    Connect(String),

    #[error("Failed to write log record: {0}")]
    Write(String),

    #[error("Log store is not connected")]
    NotConnected,

    #[error("Log writer task failed: {0}")]
    Worker(String),
}

/// Destination for warning and error records
#[async_trait]
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Open the connection. Called once, before any write.
    async fn startup(&self) -> Result<(), LogStoreError> {
        Ok(())
    }

    async fn write(&self, record: &LogRecord) -> Result<(), LogStoreError>;

    /// Close the connection. Called once, after the last write.
    async fn shutdown(&self) -> Result<(), LogStoreError> {
        Ok(())
    }
}

/// Records buffered between the layer and the writer task
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Owns the sink and the task that feeds it
#[derive(Debug)]
pub struct LogStore {
    sink: Arc<dyn LogSink>,
    sender: mpsc::Sender<LogRecord>,
    receiver: Mutex<Option<mpsc::Receiver<LogRecord>>>,
    worker: Mutex<Option<Worker>>,
}

#[derive(Debug)]
struct Worker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl LogStore {
    pub fn new(sink: Arc<dyn LogSink>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sink,
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
        }
    }

    /// The configured MongoDB sink, or `None` when no connection string is set
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, ConfigError> {
        let config = &settings.log_store;
        let Some(uri) = config
            .connection_string
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        else {
            return Ok(None);
        };

        if config.database.trim().is_empty() {
            return Err(ConfigError::Missing(vec!["MONGODB_DB_NAME".to_string()]));
        }
        if config.collection.trim().is_empty() {
            return Err(ConfigError::Missing(vec!["MONGODB_LOG_COLLECTION".to_string()]));
        }

        let sink = MongoLogSink::new(uri, &config.database, &config.collection)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        Ok(Some(Self::new(Arc::new(sink), config.channel_capacity)))
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// A layer feeding this store, for `tracing_subscriber::registry().with(..)`
    pub fn layer(&self) -> LogStoreLayer {
        LogStoreLayer::new(self.sender.clone())
    }

    /// Connect the sink and start writing. Records emitted earlier are
    /// buffered and written now. A second call does nothing.
    pub async fn startup(&self) -> Result<(), LogStoreError> {
        let Some(mut receiver) = lock(&self.receiver).take() else {
            return Ok(());
        };
        if let Err(e) = self.sink.startup().await {
            *lock(&self.receiver) = Some(receiver);
            return Err(e);
        }

        let (stop, mut stopped) = oneshot::channel::<()>();
        let sink = Arc::clone(&self.sink);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    record = receiver.recv() => match record {
                        Some(record) => write_or_fallback(sink.as_ref(), &record).await,
                        None => break,
                    },
                    _ = &mut stopped => {
                        receiver.close();
                        while let Some(record) = receiver.recv().await {
                            write_or_fallback(sink.as_ref(), &record).await;
                        }
                        break;
                    }
                }
            }
        });

        *lock(&self.worker) = Some(Worker { stop, handle });
        Ok(())
    }

    /// Write the buffered records, stop the writer and close the sink.
    /// Later events go to stderr.
    pub async fn shutdown(&self) -> Result<(), LogStoreError> {
        let Some(worker) = lock(&self.worker).take() else {
            return Ok(());
        };
        // the task may already be gone if the channel closed
        let _ = worker.stop.send(());
        worker
            .handle
            .await
            .map_err(|e| LogStoreError::Worker(e.to_string()))?;
        self.sink.shutdown().await
    }
}

async fn write_or_fallback(sink: &dyn LogSink, record: &LogRecord) {
    if let Err(e) = sink.write(record).await {
        eprintln!("Failed to write log record to {}: {}", sink.name(), e);
        eprintln!("{}", record);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
