//! Error handling for voxflow
//!
//! This module defines the crate-level error type and a Result alias used by
//! the configuration and context layers. Pipeline execution has its own
//! [`PipelineError`], which converts into [`VoxflowError`].

use crate::pipeline::error::PipelineError;
use thiserror::Error;

/// Main error type for voxflow operations
#[derive(Error, Debug)]
pub enum VoxflowError {
    /// Errors raised while building or updating a pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to the plan cache
    #[error("Plan cache error: {0}")]
    PlanCache(String),

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
        source: Box<VoxflowError>,
    },
}

impl VoxflowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VoxflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the innermost error is a cooperative pipeline abort
    pub fn is_abort(&self) -> bool {
        match self {
            VoxflowError::Pipeline(e) => e.is_abort(),
            VoxflowError::WithContext { source, .. } => source.is_abort(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for VoxflowError {
    fn from(err: serde_json::Error) -> Self {
        VoxflowError::Serialization(err.to_string())
    }
}

/// Result type alias for voxflow operations
pub type Result<T> = std::result::Result<T, VoxflowError>;

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
        self.map_err(|e| VoxflowError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| VoxflowError::from(e).with_context(f()))
    }
}
