//! Error types for source separation

use thiserror::Error;

/// Separation error types
#[derive(Error, Debug)]
pub enum DemixError {
    /// Trim target longer than the tensor being trimmed
    #[error("Invalid length: tensor of length {length} cannot be trimmed to {reference}")]
    InvalidLength { length: usize, reference: usize },

    /// Predictor invocation failed
    #[error("Predictor failed: {reason}")]
    Predictor { reason: String },

    /// Invalid input shape
    #[error("Invalid input shape: expected {expected}, got {got}")]
    InvalidInputShape { expected: String, got: String },

    /// Invalid output shape
    #[error("Invalid output shape: expected {expected}, got {got}")]
    InvalidOutputShape { expected: String, got: String },

    /// Model file not found
    #[error("Model not found: {path}")]
    ModelNotFound { path: String },

    /// Model file does not match its expected digest
    #[error("Checksum mismatch for {path}: expected {expected}, got {got}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        got: String,
    },

    /// Tract error
    #[error("Tract error: {0}")]
    Tract(String),

    /// Audio format not handled (sample rate, channel layout)
    #[error("Unsupported audio: {0}")]
    UnsupportedAudio(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// WAV read/write error
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for separation operations
pub type DemixResult<T> = Result<T, DemixError>;
