//! Core abstractions shared by the server and the vocoder shim
//!
//! - `error`: structured error handling

pub mod error;

pub use error::{InferenceStage, Result, TtsError};
