//! Checkpoint configuration

mod model_config;

pub use model_config::{BigVGANSettings, DatasetConfig, ModelConfig};
