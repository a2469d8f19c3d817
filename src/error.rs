//! Error handling for the Tensile Lab application
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the acquisition pipeline and control surface.

use thiserror::Error;

/// Main error type for Tensile Lab operations
#[derive(Error, Debug)]
pub enum LabError {
    /// The serial link failed while open (read failure, device unplugged)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The serial link could not be opened
    #[error("Connect error on {port}: {message}")]
    Connect { port: String, message: String },

    /// A connect request was issued while a link is already open
    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    /// An operation needed an open link
    #[error("Not connected")]
    NotConnected,

    /// Errors related to the record or summary files of a session
    #[error("Recording error: {0}")]
    Recording(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication between threads
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or summary file content that the CSV layer rejected
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<LabError>,
    },
}

impl LabError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        LabError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serialport::Error> for LabError {
    fn from(err: serialport::Error) -> Self {
        LabError::Transport(err.to_string())
    }
}

/// Result type alias for Tensile Lab operations
pub type Result<T> = std::result::Result<T, LabError>;

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

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| LabError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| LabError::Io(e).with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, csv::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| LabError::Csv(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| LabError::Csv(e).with_context(f()))
    }
}
