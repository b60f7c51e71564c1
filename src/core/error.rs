//! Structured error handling for the IndexTTS API
//!
//! One error enum for the whole crate. The HTTP layer maps these onto
//! status codes in `server::types::ApiError`.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias with TtsError
pub type Result<T> = std::result::Result<T, TtsError>;

/// Main error type
#[derive(Error, Debug, Clone)]
pub enum TtsError {
    /// Model loading errors
    #[error("Model loading error in {component}: {message}")]
    ModelLoad {
        message: String,
        component: String,
        path: Option<PathBuf>,
    },

    /// The model slot is empty
    #[error("Model not loaded")]
    ModelNotLoaded,

    /// Inference errors
    #[error("Inference error in {stage}: {message}")]
    Inference {
        stage: InferenceStage,
        message: String,
    },

    /// Generated audio could not be read back
    #[error("Audio error: {message}")]
    Audio {
        message: String,
        path: Option<PathBuf>,
    },

    /// Fused kernel loading or execution errors
    #[error("Kernel error: {message}")]
    Kernel {
        message: String,
        path: Option<PathBuf>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
    },

    /// Internal/bug errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        location: Option<String>,
    },
}

impl TtsError {
    /// Shorthand for a validation error on a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        TtsError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Shorthand for an inference error
    pub fn inference(stage: InferenceStage, message: impl Into<String>) -> Self {
        TtsError::Inference {
            stage,
            message: message.into(),
        }
    }
}

/// Inference pipeline stages as seen from the API layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStage {
    ReferencePreparation,
    ModelInvocation,
    OutputReadback,
}

impl fmt::Display for InferenceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceStage::ReferencePreparation => write!(f, "reference preparation"),
            InferenceStage::ModelInvocation => write!(f, "model invocation"),
            InferenceStage::OutputReadback => write!(f, "output readback"),
        }
    }
}

/// Convert from anyhow::Error
impl From<anyhow::Error> for TtsError {
    fn from(err: anyhow::Error) -> Self {
        TtsError::Internal {
            message: err.to_string(),
            location: None,
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for TtsError {
    fn from(err: std::io::Error) -> Self {
        TtsError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

/// Convert from candle_core::Error
impl From<candle_core::Error> for TtsError {
    fn from(err: candle_core::Error) -> Self {
        TtsError::Internal {
            message: format!("Tensor operation failed: {}", err),
            location: None,
        }
    }
}
