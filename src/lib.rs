//! # Research Agent
//!
//! A backend service that finds open-access research articles, stores their
//! PDFs in blob storage, and proxies chat completions to Azure OpenAI.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Article, request and response payloads)
//! - [`sources`]: CrossRef, Unpaywall and PDF resolver clients
//! - [`storage`]: Blob stores for downloaded PDFs
//! - [`pipeline`]: The acquisition pipeline and its download fan-out
//! - [`chat`]: Chat-completion proxy
//! - [`server`]: HTTP router, handlers and serve loop
//! - [`log_store`]: Warning and error sink fed by a `tracing` layer
//! - [`utils`]: HTTP client and input validation
//! - [`config`]: Configuration management

pub mod chat;
pub mod config;
pub mod log_store;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod sources;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use models::Article;
pub use pipeline::{AcquisitionPipeline, PipelineError};
pub use server::{build_router, AppState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
