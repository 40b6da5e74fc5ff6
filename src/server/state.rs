//! Shared application state for the HTTP service.

use std::sync::Arc;

use crate::chat::ChatProxy;
use crate::config::{ConfigError, Settings};
use crate::log_store::LogStore;
use crate::pipeline::AcquisitionPipeline;
use crate::server::ServerError;
use crate::storage::store_from_settings;

/// Everything a handler needs, built once at startup
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: AcquisitionPipeline,
    pub chat: ChatProxy,

    /// Warning and error sink, when one is configured
    pub log_store: Option<Arc<LogStore>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(pipeline: AcquisitionPipeline, chat: ChatProxy) -> Self {
        Self {
            pipeline,
            chat,
            log_store: None,
        }
    }

    /// Attach the log store whose layer is installed in the subscriber
    pub fn with_log_store(mut self, log_store: Arc<LogStore>) -> Self {
        self.log_store = Some(log_store);
        self
    }

    /// Validate the settings and build every component. Any missing
    /// required key fails here, before the listener is bound.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let store = store_from_settings(settings)?;
        let pipeline = AcquisitionPipeline::from_settings(settings, store)?;
        let chat = ChatProxy::from_settings(settings)?;
        Ok(Self::new(pipeline, chat))
    }

    /// Run before accepting requests. The log store connects first so
    /// warnings from the other hooks reach it.
    pub async fn startup(&self) -> Result<(), ServerError> {
        if let Some(log_store) = &self.log_store {
            log_store.startup().await?;
            tracing::info!(sink = log_store.sink_name(), "Log store connected");
        }
        let store = self.pipeline.store();
        store.startup().await?;
        tracing::info!(store = store.name(), "Application started");
        Ok(())
    }

    /// Run after the listener has drained. The log store closes last and
    /// is closed even when the blob store hook fails.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        let stored = self.pipeline.store().shutdown().await;
        if let Err(e) = &stored {
            tracing::error!("Blob store shutdown failed: {}", e);
        }
        tracing::info!("Application stopped");

        if let Some(log_store) = &self.log_store {
            log_store.shutdown().await?;
        }
        stored?;
        Ok(())
    }
}
