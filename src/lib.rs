//! # IndexTTS API
//!
//! HTTP service around the IndexTTS zero-shot text-to-speech model, plus
//! the anti-aliased activation used by its BigVGAN vocoder.
//!
//! ## Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | GET | `/health` | | `{"status","message"}`, 503 until the model loads |
//! | POST | `/synthesize` | multipart `reference_audio`, `text`, `use_fast_mode` | `audio/wav` attachment |
//! | POST | `/synthesize_base64` | JSON `text`, `use_fast_mode`, `reference_audio_base64` | `{"status":"success","audio_base64"}` |
//! | GET | `/stats` | | request counters |
//!
//! ## Embedding the server
//!
//! ```rust,ignore
//! use indextts_api::server::{ServerConfig, TtsServer};
//!
//! let config = ServerConfig::load("server.yaml")?;
//! TtsServer::new(config).run().await?;
//! ```
//!
//! ## Vocoder activation
//!
//! ```rust,ignore
//! use candle_core::Device;
//! use indextts_api::models::vocoder::{init_fused_kernel, Activation1d, SnakeActivation, SnakeKind};
//!
//! init_fused_kernel(Some("checkpoints".as_ref()));
//! let act = SnakeActivation::init(SnakeKind::SnakeBeta, 512, true, &Device::Cpu)?;
//! let layer = Activation1d::with_defaults(act, true)?;
//! let y = layer.forward(&x)?;
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod models;
pub mod server;

pub use crate::config::ModelConfig;
pub use crate::core::error::{Result, TtsError};
pub use engine::{IndexTts, IndexTtsConfig, InferenceMode, InferenceOutcome, TtsModel};
pub use server::{ServerConfig, TtsServer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum text length accepted by the synthesis endpoints, in characters
pub const MAX_TEXT_LENGTH: usize = 500;

/// Output cache entries kept before the older half is dropped
pub const CACHE_SIZE_LIMIT: usize = 100;
