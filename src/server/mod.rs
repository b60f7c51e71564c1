//! HTTP service
//!
//! Axum router exposing IndexTTS over HTTP:
//! - `GET /health` reports whether the model is loaded
//! - `POST /synthesize` takes a multipart upload, returns a WAV attachment
//! - `POST /synthesize_base64` takes and returns base64 audio
//! - `GET /stats` returns request counters

pub mod cache;
pub mod config;
pub mod middleware;
pub mod routes;
pub mod server_core;
pub mod types;
pub mod upload;

pub use cache::OutputCache;
pub use config::{CacheConfig, LimitsConfig, LoggingConfig, ServerConfig};
pub use middleware::{MetricsState, ServerMetrics};
pub use server_core::{create_router, load_model, ServerState, TtsServer};
pub use types::*;
