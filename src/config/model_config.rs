//! Model configuration types matching the IndexTTS checkpoint config.yaml
//!
//! Only the sections the API layer reads are modelled. Unknown keys are
//! ignored so newer checkpoints keep loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Dataset configuration
    pub dataset: DatasetConfig,

    /// BigVGAN vocoder configuration
    #[serde(default)]
    pub bigvgan: BigVGANSettings,

    /// GPT checkpoint filename
    pub gpt_checkpoint: String,

    /// Discrete VAE checkpoint filename
    #[serde(default)]
    pub dvae_checkpoint: Option<String>,

    /// BigVGAN checkpoint filename
    #[serde(default)]
    pub bigvgan_checkpoint: Option<String>,

    /// Model version
    #[serde(default = "default_version")]
    pub version: f32,
}

fn default_version() -> f32 {
    1.0
}

impl ModelConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_yaml::from_str(&content)
            .with_context(|| "Failed to parse config YAML")
    }

    /// Get the full path to a checkpoint file
    pub fn checkpoint_path<P: AsRef<Path>>(&self, model_dir: P, filename: &str) -> PathBuf {
        model_dir.as_ref().join(filename)
    }

    /// Checkpoint filenames referenced by this config
    pub fn checkpoint_files(&self) -> Vec<&str> {
        let mut files = vec![self.gpt_checkpoint.as_str()];
        if let Some(ref dvae) = self.dvae_checkpoint {
            files.push(dvae);
        }
        if let Some(ref bigvgan) = self.bigvgan_checkpoint {
            files.push(bigvgan);
        }
        files
    }

    /// Checkpoints listed in the config but absent from `model_dir`
    pub fn missing_checkpoints<P: AsRef<Path>>(&self, model_dir: P) -> Vec<PathBuf> {
        self.checkpoint_files()
            .into_iter()
            .map(|f| self.checkpoint_path(model_dir.as_ref(), f))
            .filter(|p| !p.exists())
            .collect()
    }

    /// Output sample rate of the vocoder
    pub fn output_sample_rate(&self) -> u32 {
        self.bigvgan.sampling_rate.unwrap_or(self.dataset.sample_rate)
    }
}

/// Dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// BPE tokenizer model filename
    #[serde(default)]
    pub bpe_model: Option<String>,

    /// Audio sample rate
    pub sample_rate: u32,
}

/// Vocoder activation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigVGANSettings {
    /// Activation type: "snake" or "snakebeta"
    #[serde(default = "default_activation")]
    pub activation: String,

    /// Whether alpha/beta are stored in log scale
    #[serde(default = "default_true")]
    pub snake_logscale: bool,

    /// Vocoder output sample rate
    #[serde(default)]
    pub sampling_rate: Option<u32>,

    /// Whether the checkpoint asks for the fused activation kernel
    #[serde(default)]
    pub use_cuda_kernel: bool,

    /// Upsampling rates
    #[serde(default)]
    pub upsample_rates: Vec<usize>,
}

impl Default for BigVGANSettings {
    fn default() -> Self {
        Self {
            activation: default_activation(),
            snake_logscale: true,
            sampling_rate: None,
            use_cuda_kernel: false,
            upsample_rates: Vec::new(),
        }
    }
}

fn default_activation() -> String {
    "snakebeta".to_string()
}

fn default_true() -> bool {
    true
}
