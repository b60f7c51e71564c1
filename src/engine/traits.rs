//! Model contract consumed by the HTTP layer
//!
//! The server never looks inside the model. It hands over a reference
//! recording, the text and an output path, and expects a WAV file at that
//! path when the call returns.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;

/// Synthesis scheduling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// Sentence-by-sentence autoregressive inference
    Standard,
    /// Bucketed batch inference, better for long text
    #[default]
    Fast,
}

impl InferenceMode {
    /// Mode for the `use_fast_mode` request flag
    pub fn from_fast_flag(use_fast_mode: bool) -> Self {
        if use_fast_mode {
            InferenceMode::Fast
        } else {
            InferenceMode::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMode::Standard => "standard",
            InferenceMode::Fast => "fast",
        }
    }
}

/// What a finished inference call reports back
#[derive(Debug, Clone)]
pub struct InferenceOutcome {
    /// Where the WAV was written
    pub output_path: PathBuf,
    /// Wall-clock inference time
    pub elapsed: Duration,
    /// Sample rate of the written WAV, when known
    pub sample_rate: Option<u32>,
    /// Duration of the written audio, when known
    pub audio_duration: Option<Duration>,
}

/// Zero-shot TTS model
///
/// Implementations are called from blocking worker threads and may take
/// seconds per call.
pub trait TtsModel: Send + Sync {
    /// Human-readable model name for logs and health output
    fn name(&self) -> &str;

    /// Standard inference
    fn infer(&self, reference: &Path, text: &str, output: &Path) -> Result<InferenceOutcome>;

    /// Fast (batched) inference
    fn infer_fast(&self, reference: &Path, text: &str, output: &Path) -> Result<InferenceOutcome>;

    /// Dispatch on `mode`
    fn synthesize(
        &self,
        mode: InferenceMode,
        reference: &Path,
        text: &str,
        output: &Path,
    ) -> Result<InferenceOutcome> {
        match mode {
            InferenceMode::Standard => self.infer(reference, text, output),
            InferenceMode::Fast => self.infer_fast(reference, text, output),
        }
    }

    /// Whether the vocoder runs the fused activation kernel
    fn fused_kernel(&self) -> bool {
        false
    }
}
