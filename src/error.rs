//! Error handling for vispipe
//!
//! This module defines the crate-level error type and a Result alias used by
//! configuration loading and the command line. The engine itself reports
//! [`PipelineError`], which converts into [`VisPipeError`].

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for vispipe operations
#[derive(Error, Debug)]
pub enum VisPipeError {
    /// Errors raised by the pipeline engine
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to pipeline description files
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VisPipeError>,
    },
}

impl VisPipeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VisPipeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The pipeline error at the bottom of a context chain, if any.
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        match self {
            VisPipeError::Pipeline(e) => Some(e),
            VisPipeError::WithContext { source, .. } => source.pipeline_error(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for VisPipeError {
    fn from(err: serde_json::Error) -> Self {
        VisPipeError::Serialization(err.to_string())
    }
}

/// Result type alias for vispipe operations
pub type Result<T> = std::result::Result<T, VisPipeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| VisPipeError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| VisPipeError::from(e).with_context(f()))
    }
}
