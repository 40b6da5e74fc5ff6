//! Mock PDF resolver for testing purposes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::sources::{PdfResolver, ResolveError};

/// What the mock returns for a DOI
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return these bytes
    Pdf(Vec<u8>),
    /// Return `Ok(None)`
    Empty,
    /// Return an error with this message
    Fail(String),
    /// Panic inside the resolver
    Panic,
    /// Sleep, then return these bytes
    Delayed(Duration, Vec<u8>),
}

/// A resolver that returns programmed outcomes per DOI.
///
/// DOIs without a programmed outcome get the default, which is a minimal PDF.
#[derive(Debug)]
pub struct MockResolver {
    outcomes: Mutex<HashMap<String, MockOutcome>>,
    default: MockOutcome,
    calls: AtomicUsize,
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResolver {
    /// Create a mock that serves a minimal PDF for every DOI
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            default: MockOutcome::Pdf(sample_pdf()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Change the outcome for DOIs without a programmed one
    pub fn with_default(mut self, outcome: MockOutcome) -> Self {
        self.default = outcome;
        self
    }

    /// Program the outcome for one DOI
    pub fn with_outcome(self, doi: &str, outcome: MockOutcome) -> Self {
        self.set_outcome(doi, outcome);
        self
    }

    pub fn set_outcome(&self, doi: &str, outcome: MockOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(doi.to_string(), outcome);
    }

    /// Number of `fetch_pdf` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PdfResolver for MockResolver {
    fn fetch_pdf(&self, doi: &str) -> Result<Option<Vec<u8>>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(doi)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        match outcome {
            MockOutcome::Pdf(bytes) => Ok(Some(bytes)),
            MockOutcome::Empty => Ok(None),
            MockOutcome::Fail(msg) => Err(ResolveError::Other(msg)),
            MockOutcome::Panic => panic!("mock resolver panicked for {}", doi),
            MockOutcome::Delayed(delay, bytes) => {
                std::thread::sleep(delay);
                Ok(Some(bytes))
            }
        }
    }
}

/// Smallest byte string the pipeline accepts as a PDF
pub fn sample_pdf() -> Vec<u8> {
    b"%PDF-1.4\n%%EOF\n".to_vec()
}
