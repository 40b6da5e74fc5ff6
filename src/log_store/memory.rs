//! In-memory log sink.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::log_store::{LogRecord, LogSink, LogStoreError};

/// Keeps written records in a list
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<LogRecord>>,
    attempts: AtomicUsize,
    fail_writes: bool,
    refuse_startup: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose writes always fail
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Make `startup` fail until [`MemoryLogSink::accept_startup`] is called
    pub fn refusing_startup(self) -> Self {
        self.refuse_startup.store(true, Ordering::SeqCst);
        self
    }

    pub fn accept_startup(&self) {
        self.refuse_startup.store(false, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Writes attempted, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn startup(&self) -> Result<(), LogStoreError> {
        if self.refuse_startup.load(Ordering::SeqCst) {
            return Err(LogStoreError::Connect("connection refused".to_string()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, record: &LogRecord) -> Result<(), LogStoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(LogStoreError::Write("collection unavailable".to_string()));
        }
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), LogStoreError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
