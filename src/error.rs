//! Error handling for the SerialVis-RS library
//!
//! This module defines custom error types and a Result alias for use
//! throughout the crate.

use thiserror::Error;

/// Main error type for SerialVis-RS operations
#[derive(Error, Debug)]
pub enum SerialVisError {
    /// Errors related to Rhai script loading or execution
    #[error("Script error: {0}")]
    Script(String),

    /// Errors related to project or settings loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Payload could not be decoded (invalid hex/base64)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Decoded text could not be turned into fields or a JSON frame
    #[error("Parse error: {0}")]
    Parse(String),

    /// Parsed data did not bind to any group of the active schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// The detector buffer grew past its cap without a frame boundary
    #[error("Frame buffer overflow: {size} bytes exceeds limit of {limit} bytes")]
    BufferOverflow { size: usize, limit: usize },

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
        source: Box<SerialVisError>,
    },
}

impl SerialVisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SerialVisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        SerialVisError::Script(err.to_string())
    }

    /// Whether this error only affects a single frame
    pub fn is_frame_local(&self) -> bool {
        match self {
            SerialVisError::Decode(_)
            | SerialVisError::Parse(_)
            | SerialVisError::Schema(_)
            | SerialVisError::Script(_) => true,
            SerialVisError::WithContext { source, .. } => source.is_frame_local(),
            _ => false,
        }
    }
}

/// Result type alias for SerialVis-RS operations
pub type Result<T> = std::result::Result<T, SerialVisError>;

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

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| SerialVisError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SerialVisError::from_rhai_error(e).with_context(f()))
    }
}
