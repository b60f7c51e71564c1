//! Model loading configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// IndexTTS model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexTtsConfig {
    /// Checkpoint directory
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Path to the checkpoint config.yaml
    #[serde(default = "default_cfg_path")]
    pub cfg_path: PathBuf,

    /// FP16 inference
    #[serde(default = "default_true")]
    pub is_fp16: bool,

    /// Use the fused activation kernel when it can be loaded
    #[serde(default = "default_true")]
    pub use_cuda_kernel: bool,

    /// Directory searched for the fused kernel (defaults to `model_dir`)
    #[serde(default)]
    pub kernel_dir: Option<PathBuf>,

    /// Inference command
    #[serde(default)]
    pub command: InferenceCommand,
}

impl Default for IndexTtsConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            cfg_path: default_cfg_path(),
            is_fp16: true,
            use_cuda_kernel: true,
            kernel_dir: None,
            command: InferenceCommand::default(),
        }
    }
}

impl IndexTtsConfig {
    /// Config rooted at `model_dir`, with `config.yaml` inside it
    pub fn with_model_dir(model_dir: impl Into<PathBuf>) -> Self {
        let model_dir = model_dir.into();
        Self {
            cfg_path: model_dir.join("config.yaml"),
            model_dir,
            ..Default::default()
        }
    }

    /// Directory searched for the fused kernel
    pub fn kernel_search_dir(&self) -> PathBuf {
        self.kernel_dir.clone().unwrap_or_else(|| self.model_dir.clone())
    }
}

/// External inference command.
///
/// Arguments may contain the placeholders `{reference}`, `{text}`,
/// `{output}`, `{model_dir}` and `{cfg_path}`. Each argument is passed to
/// the process as-is; no shell is involved.
///
/// The final argument list is `args`, then `fast_args` and `fp16_args`,
/// then `trailing_args`. The default puts the text after a `--` separator
/// so text starting with a dash is never read as an option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceCommand {
    /// Executable
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments for every call
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Extra arguments in fast mode
    #[serde(default)]
    pub fast_args: Vec<String>,

    /// Extra arguments when `is_fp16` is set
    #[serde(default = "default_fp16_args")]
    pub fp16_args: Vec<String>,

    /// Arguments after all options
    #[serde(default = "default_trailing_args")]
    pub trailing_args: Vec<String>,
}

impl Default for InferenceCommand {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            fast_args: Vec::new(),
            fp16_args: default_fp16_args(),
            trailing_args: default_trailing_args(),
        }
    }
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_cfg_path() -> PathBuf {
    PathBuf::from("checkpoints/config.yaml")
}

fn default_true() -> bool {
    true
}

fn default_program() -> String {
    "indextts".to_string()
}

fn default_args() -> Vec<String> {
    [
        "--voice",
        "{reference}",
        "--output_path",
        "{output}",
        "--model_dir",
        "{model_dir}",
        "--config",
        "{cfg_path}",
        "--force",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_fp16_args() -> Vec<String> {
    vec!["--fp16".to_string()]
}

fn default_trailing_args() -> Vec<String> {
    vec!["--".to_string(), "{text}".to_string()]
}
