//! Model collaborator
//!
//! The HTTP layer talks to the TTS model only through `TtsModel`.
//! `IndexTts` is the production backend; tests substitute their own.

pub mod config;
pub mod indextts;
pub mod traits;

pub use config::{IndexTtsConfig, InferenceCommand};
pub use indextts::{read_wav_info, IndexTts};
pub use traits::{InferenceMode, InferenceOutcome, TtsModel};
