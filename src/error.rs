//! Error handling for vislink-rs
//!
//! This module defines the crate-wide error type and a Result alias for use
//! throughout the library. Graph-construction errors are reported
//! synchronously at the call that caused them; transport failures surface to
//! blocked queue callers as [`VisLinkError::QueueClosed`] and are recorded on
//! the [`Device`](crate::device::Device).

use crate::pipeline::error::ValidationReport;
use crate::types::Datatype;
use thiserror::Error;

/// Main error type for vislink-rs operations
#[derive(Error, Debug)]
pub enum VisLinkError {
    /// The pipeline graph is malformed. Carries every violation found.
    #[error("Pipeline validation failed: {0}")]
    PipelineValidation(ValidationReport),

    /// Source port produces no datatype the destination port accepts
    #[error("Incompatible link {output} -> {input}: produces [{produced}], accepts [{accepted}]")]
    IncompatibleType {
        output: String,
        input: String,
        produced: String,
        accepted: String,
    },

    /// Input port already has an incoming link
    #[error("Input {input} is already connected to {existing}")]
    PortAlreadyConnected { input: String, existing: String },

    /// Unknown node/port or a port used in the wrong direction
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// Link does not exist
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    /// Unknown node type name
    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    /// Node ids no longer fit the packed port id
    #[error("Pipeline already holds the maximum of {max} nodes")]
    TooManyNodes { max: usize },

    /// Pipeline was already uploaded and can no longer be modified
    #[error("Pipeline is frozen and can no longer be modified")]
    PipelineFrozen,

    /// No queue is declared for this stream name
    #[error("No such stream: '{0}'")]
    NoSuchStream(String),

    /// Queue (or event queue) was closed
    #[error("Queue '{0}' is closed")]
    QueueClosed(String),

    /// Message payload is not of the requested kind
    #[error("Stream '{stream}' delivered {actual}, expected {expected}")]
    WrongMessageType {
        stream: String,
        expected: Datatype,
        actual: Datatype,
    },

    /// Message payload exceeds the stream's maximum data size
    #[error("Message of {size} bytes exceeds max data size {max} on stream '{stream}'")]
    MessageTooLarge {
        stream: String,
        size: usize,
        max: usize,
    },

    /// No device matched the connection target
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device firmware differs from the expected version
    #[error("Firmware mismatch: expected {expected}, device reports {found}")]
    FirmwareMismatch { expected: String, found: String },

    /// Errors raised by the transport collaborator
    #[error("Transport error: {0}")]
    Transport(String),

    /// Errors related to configuration loading/saving
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
        source: Box<VisLinkError>,
    },
}

impl VisLinkError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VisLinkError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error means the stream ended (queue or device closed)
    pub fn is_closed(&self) -> bool {
        match self {
            VisLinkError::QueueClosed(_) => true,
            VisLinkError::WithContext { source, .. } => source.is_closed(),
            _ => false,
        }
    }
}

/// Result type alias for vislink-rs operations
pub type Result<T> = std::result::Result<T, VisLinkError>;

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
