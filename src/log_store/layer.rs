//! `tracing_subscriber` layer feeding the log store.

use chrono::Utc;
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::log_store::LogRecord;

/// Copies WARN and ERROR events onto the log store channel.
///
/// Never blocks the emitting thread: when the channel is full or closed the
/// record is printed to stderr instead. Events from the MongoDB driver are
/// skipped so a failing sink cannot feed itself.
#[derive(Debug, Clone)]
pub struct LogStoreLayer {
    sender: mpsc::Sender<LogRecord>,
}

impl LogStoreLayer {
    pub(crate) fn new(sender: mpsc::Sender<LogRecord>) -> Self {
        Self { sender }
    }
}

impl<S: Subscriber> Layer<S> for LogStoreLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !matches!(*meta.level(), Level::WARN | Level::ERROR) {
            return;
        }
        if meta.target().starts_with("mongodb") {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord {
            timestamp: Utc::now(),
            level: meta.level().to_string(),
            message: visitor.finish(),
            target: meta.target().to_string(),
            module: meta.module_path().map(str::to_string),
            file: meta.file().map(str::to_string),
            line: meta.line(),
        };

        if let Err(e) = self.sender.try_send(record) {
            let record = match e {
                TrySendError::Full(record) | TrySendError::Closed(record) => record,
            };
            eprintln!("{}", record);
        }
    }
}

/// Collects the `message` field and the remaining fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        let mut message = self.message.unwrap_or_default();
        for field in self.fields {
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(&field);
        }
        message
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}
