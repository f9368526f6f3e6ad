//! Error handling for Ringshift
//!
//! Every failure the pipeline can report, with stable error codes and
//! recovery suggestions for the CLI.

use thiserror::Error;

use crate::engine::{SlotState, Stage};

/// Result type alias for Ringshift operations
pub type Result<T> = std::result::Result<T, RingshiftError>;

/// Main error type for Ringshift operations
#[derive(Error, Debug)]
pub enum RingshiftError {
    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Device Errors
    #[error("Audio device error: {reason}")]
    Device {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{stage} starved on slot {slot}: no transition within {waited_ms} ms")]
    Starvation {
        stage: Stage,
        slot: usize,
        waited_ms: u64,
    },

    // Pipeline Errors
    #[error("{stage} stopped because another stage failed")]
    Stopped { stage: Stage },

    #[error("{stage} worker panicked")]
    WorkerPanicked { stage: Stage },

    #[error("Slot {slot}: illegal transition {from} -> {to}")]
    InvalidTransition {
        slot: usize,
        from: SlotState,
        to: SlotState,
    },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RingshiftError {
    /// Shorthand for a device error without an underlying source
    pub fn device(reason: impl Into<String>) -> Self {
        RingshiftError::Device {
            reason: reason.into(),
            source: None,
        }
    }

    /// Shorthand for a configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        RingshiftError::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            RingshiftError::InvalidConfig { .. } => "INVALID_CONFIG",
            RingshiftError::Device { .. } => "DEVICE_FATAL",
            RingshiftError::Starvation { .. } => "STARVATION",
            RingshiftError::Stopped { .. } => "STOPPED",
            RingshiftError::WorkerPanicked { .. } => "WORKER_PANICKED",
            RingshiftError::InvalidTransition { .. } => "INVALID_TRANSITION",
            RingshiftError::FileNotFound { .. } => "FILE_NOT_FOUND",
            RingshiftError::InvalidAudio { .. } => "INVALID_AUDIO",
            RingshiftError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            RingshiftError::Io(_) => "IO_ERROR",
            RingshiftError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable by the user before a rerun
    ///
    /// Nothing that happens mid-run is recoverable: a missed real-time
    /// block cannot be replayed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RingshiftError::InvalidConfig { .. }
                | RingshiftError::FileNotFound { .. }
                | RingshiftError::InvalidAudio { .. }
                | RingshiftError::UnsupportedFormat { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RingshiftError::InvalidConfig { .. } => vec![
                "Check block size, ring depth and run length are all non-zero",
                "Pitch window must be a power of two no larger than 8192",
                "Run 'ringshift-cli config' to print the resolved configuration",
            ],
            RingshiftError::Device { .. } => vec![
                "Check the input and output devices are still connected",
                "Verify the stream sample rate matches the configuration",
            ],
            RingshiftError::Starvation { .. } => vec![
                "The transform may be too slow for one block period",
                "Try a smaller oversampling factor or a deeper ring",
                "Raise starvation_timeout_ms, or set it to null to disable",
            ],
            RingshiftError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Generate a test input with 'ringshift-cli tone'",
            ],
            RingshiftError::InvalidAudio { .. } => vec![
                "Try converting the file to WAV format first",
                "The file may be corrupted - try re-exporting from source",
            ],
            RingshiftError::UnsupportedFormat { .. } => vec![
                "Convert the input to a mono WAV file",
                "Supported sample formats: 8/16/24/32-bit integer, 32-bit float",
            ],
            _ => vec![],
        }
    }
}
