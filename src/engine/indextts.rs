//! IndexTTS model backend
//!
//! Validates the checkpoint directory, reads its config.yaml, probes the
//! fused activation kernel, and runs inference through the configured
//! external command.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use candle_core::Device;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::core::error::{InferenceStage, Result, TtsError};
use crate::engine::config::IndexTtsConfig;
use crate::engine::traits::{InferenceMode, InferenceOutcome, TtsModel};
use crate::models::vocoder::{init_fused_kernel, Activation1d, SnakeActivation, SnakeKind};

/// Longest stderr excerpt carried into an error message
const STDERR_TAIL: usize = 2000;

/// Loaded IndexTTS model
pub struct IndexTts {
    config: IndexTtsConfig,
    model_config: ModelConfig,
    fused_kernel: bool,
    name: String,
}

impl IndexTts {
    /// Load and validate the checkpoints described by `config`
    pub fn load(config: IndexTtsConfig) -> Result<Self> {
        if !config.model_dir.is_dir() {
            return Err(TtsError::ModelLoad {
                message: format!("checkpoint directory not found: {:?}", config.model_dir),
                component: "checkpoints".to_string(),
                path: Some(config.model_dir.clone()),
            });
        }

        let model_config = ModelConfig::load(&config.cfg_path).map_err(|e| TtsError::ModelLoad {
            message: format!("{:#}", e),
            component: "config".to_string(),
            path: Some(config.cfg_path.clone()),
        })?;

        let missing = model_config.missing_checkpoints(&config.model_dir);
        if !missing.is_empty() {
            return Err(TtsError::ModelLoad {
                message: format!("missing checkpoint files: {:?}", missing),
                component: "checkpoints".to_string(),
                path: Some(config.model_dir.clone()),
            });
        }

        let fused_kernel = if config.use_cuda_kernel {
            Self::probe_fused_activation(&config, &model_config)?
        } else {
            false
        };

        let name = format!("IndexTTS v{}", model_config.version);
        info!(
            "{} ready: model_dir={:?}, fp16={}, fused_kernel={}, sample_rate={}",
            name,
            config.model_dir,
            config.is_fp16,
            fused_kernel,
            model_config.output_sample_rate()
        );

        Ok(Self {
            config,
            model_config,
            fused_kernel,
            name,
        })
    }

    /// Whether an activation configured like the checkpoint's would run fused
    fn probe_fused_activation(config: &IndexTtsConfig, model_config: &ModelConfig) -> Result<bool> {
        let kind: SnakeKind = model_config
            .bigvgan
            .activation
            .parse()
            .map_err(|e: anyhow::Error| TtsError::ModelLoad {
                message: e.to_string(),
                component: "bigvgan".to_string(),
                path: Some(config.cfg_path.clone()),
            })?;

        if init_fused_kernel(Some(&config.kernel_search_dir())).is_none() {
            return Ok(false);
        }

        let activation = SnakeActivation::init(kind, 1, model_config.bigvgan.snake_logscale, &Device::Cpu)?;
        Ok(Activation1d::with_defaults(activation, true)?.is_fused())
    }

    pub fn config(&self) -> &IndexTtsConfig {
        &self.config
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    /// Expand placeholders for one call
    fn build_args(&self, mode: InferenceMode, reference: &Path, text: &str, output: &Path) -> Vec<String> {
        let command = &self.config.command;
        let mut templates: Vec<&String> = command.args.iter().collect();
        if mode == InferenceMode::Fast {
            templates.extend(command.fast_args.iter());
        }
        if self.config.is_fp16 {
            templates.extend(command.fp16_args.iter());
        }
        templates.extend(command.trailing_args.iter());

        let reference = reference.to_string_lossy();
        let output = output.to_string_lossy();
        let model_dir = self.config.model_dir.to_string_lossy();
        let cfg_path = self.config.cfg_path.to_string_lossy();

        templates
            .into_iter()
            .map(|arg| {
                // {text} last: the text itself may contain brace sequences
                arg.replace("{reference}", &reference)
                    .replace("{output}", &output)
                    .replace("{model_dir}", &model_dir)
                    .replace("{cfg_path}", &cfg_path)
                    .replace("{text}", text)
            })
            .collect()
    }

    fn run(&self, mode: InferenceMode, reference: &Path, text: &str, output: &Path) -> Result<InferenceOutcome> {
        if !reference.exists() {
            return Err(TtsError::inference(
                InferenceStage::ReferencePreparation,
                format!("reference audio not found: {:?}", reference),
            ));
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let args = self.build_args(mode, reference, text, output);
        debug!("Running {} {:?}", self.config.command.program, args);

        let start = Instant::now();
        let result = Command::new(&self.config.command.program)
            .args(&args)
            .output()
            .map_err(|e| {
                TtsError::inference(
                    InferenceStage::ModelInvocation,
                    format!("failed to start {}: {}", self.config.command.program, e),
                )
            })?;
        let elapsed = start.elapsed();

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail = stderr_tail(&stderr, STDERR_TAIL);
            warn!("Inference command failed with {}", result.status);
            return Err(TtsError::inference(
                InferenceStage::ModelInvocation,
                format!("{} exited with {}: {}", self.config.command.program, result.status, tail),
            ));
        }

        if !output.exists() {
            return Err(TtsError::inference(
                InferenceStage::OutputReadback,
                format!("model did not write {:?}", output),
            ));
        }

        let (sample_rate, audio_duration) = read_wav_info(output)?;
        Ok(InferenceOutcome {
            output_path: output.to_path_buf(),
            elapsed,
            sample_rate: Some(sample_rate),
            audio_duration: Some(audio_duration),
        })
    }
}

/// Last `max` bytes of `stderr` at most, starting on a character boundary
fn stderr_tail(stderr: &str, max: usize) -> &str {
    let mut start = stderr.len().saturating_sub(max);
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    stderr[start..].trim()
}

/// Sample rate and duration of a WAV file
pub fn read_wav_info(path: &Path) -> Result<(u32, Duration)> {
    let reader = hound::WavReader::open(path).map_err(|e| TtsError::Audio {
        message: format!("not a readable WAV file: {}", e),
        path: Some(path.to_path_buf()),
    })?;
    let spec = reader.spec();
    let frames = reader.duration();
    let seconds = if spec.sample_rate == 0 {
        0.0
    } else {
        frames as f64 / spec.sample_rate as f64
    };
    Ok((spec.sample_rate, Duration::from_secs_f64(seconds)))
}

impl TtsModel for IndexTts {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, reference: &Path, text: &str, output: &Path) -> Result<InferenceOutcome> {
        self.run(InferenceMode::Standard, reference, text, output)
    }

    fn infer_fast(&self, reference: &Path, text: &str, output: &Path) -> Result<InferenceOutcome> {
        self.run(InferenceMode::Fast, reference, text, output)
    }

    fn fused_kernel(&self) -> bool {
        self.fused_kernel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::InferenceCommand;

    const CONFIG_YAML: &str = "dataset:\n  sample_rate: 24000\nbigvgan:\n  activation: snakebeta\n  snake_logscale: true\ngpt_checkpoint: gpt.pth\nbigvgan_checkpoint: bigvgan_generator.pth\n";

    fn write_wav(path: &Path, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn checkpoint_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), CONFIG_YAML).unwrap();
        std::fs::write(dir.path().join("gpt.pth"), b"gpt").unwrap();
        std::fs::write(dir.path().join("bigvgan_generator.pth"), b"vocoder").unwrap();
        dir
    }

    fn config_with_command(dir: &Path, program: &str, args: &[&str]) -> IndexTtsConfig {
        let mut config = IndexTtsConfig::with_model_dir(dir);
        config.use_cuda_kernel = false;
        config.is_fp16 = false;
        config.command = InferenceCommand {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            fast_args: vec!["--fast".to_string()],
            fp16_args: vec!["--fp16".to_string()],
            trailing_args: Vec::new(),
        };
        config
    }

    #[test]
    fn test_load_missing_dir() {
        let err = IndexTts::load(IndexTtsConfig::with_model_dir("/nonexistent/ckpt")).err().unwrap();
        assert!(matches!(err, TtsError::ModelLoad { .. }));
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let dir = checkpoint_dir();
        std::fs::remove_file(dir.path().join("gpt.pth")).unwrap();
        let err = IndexTts::load(config_with_command(dir.path(), "true", &[])).err().unwrap();
        assert!(err.to_string().contains("gpt.pth"));
    }

    #[test]
    fn test_load_unknown_activation() {
        let dir = checkpoint_dir();
        std::fs::write(
            dir.path().join("config.yaml"),
            CONFIG_YAML.replace("snakebeta", "gelu"),
        )
        .unwrap();
        let mut config = config_with_command(dir.path(), "true", &[]);
        config.use_cuda_kernel = true;
        assert!(IndexTts::load(config).is_err());
    }

    #[test]
    fn test_build_args_substitutes_placeholders() {
        let dir = checkpoint_dir();
        let mut config = config_with_command(dir.path(), "indextts", &["{text}", "-v", "{reference}", "-o", "{output}"]);
        config.is_fp16 = true;
        let model = IndexTts::load(config).unwrap();
        let args = model.build_args(
            InferenceMode::Fast,
            Path::new("/tmp/ref.wav"),
            "你好 {output}",
            Path::new("outputs/a.wav"),
        );
        assert_eq!(
            args,
            vec!["你好 {output}", "-v", "/tmp/ref.wav", "-o", "outputs/a.wav", "--fast", "--fp16"]
        );

        let standard = model.build_args(InferenceMode::Standard, Path::new("r.wav"), "t", Path::new("o.wav"));
        assert!(!standard.contains(&"--fast".to_string()));
    }

    #[test]
    fn test_default_args_put_text_after_options() {
        let dir = checkpoint_dir();
        let mut config = IndexTtsConfig::with_model_dir(dir.path());
        config.use_cuda_kernel = false;
        config.command.fast_args = vec!["--fast".to_string()];
        let model = IndexTts::load(config).unwrap();

        let args = model.build_args(InferenceMode::Fast, Path::new("r.wav"), "--help", Path::new("o.wav"));
        let n = args.len();
        assert_eq!(&args[n - 2..], &["--", "--help"]);
        let separator = n - 2;
        for option in ["--voice", "--output_path", "--fast", "--fp16"] {
            let pos = args.iter().position(|a| a == option).unwrap();
            assert!(pos < separator, "{} after separator", option);
        }
    }

    #[test]
    fn test_stderr_tail_on_char_boundary() {
        let stderr = "语".repeat(1000);
        let tail = stderr_tail(&stderr, 2000);
        assert!(!tail.is_empty());
        assert!(tail.len() <= 2000);
        assert!(tail.chars().all(|c| c == '语'));

        assert_eq!(stderr_tail("  short\n", 2000), "short");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_copies_reference() {
        let dir = checkpoint_dir();
        let config = config_with_command(dir.path(), "sh", &["-c", "cp \"$0\" \"$1\"", "{reference}", "{output}"]);
        let model = IndexTts::load(config).unwrap();

        let reference = dir.path().join("ref.wav");
        write_wav(&reference, 24000, 12000);
        let output = dir.path().join("out").join("gen.wav");

        let outcome = model.infer(&reference, "hello", &output).unwrap();
        assert_eq!(outcome.output_path, output);
        assert_eq!(outcome.sample_rate, Some(24000));
        assert_eq!(outcome.audio_duration, Some(Duration::from_millis(500)));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_text_starting_with_dash() {
        let dir = checkpoint_dir();
        let prepared = dir.path().join("prepared.wav");
        write_wav(&prepared, 22050, 2205);

        // Reads options up to `--` like an argparse CLI; `--help` before it prints usage
        let script = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --) shift; break ;;
    --help) echo usage; exit 0 ;;
    --output_path) out="$2"; shift 2 ;;
    --voice|--model_dir|--config) shift 2 ;;
    *) shift ;;
  esac
done
[ "$1" = "--help" ] || exit 4
cp "@PREPARED@" "$out"
"#
        .replace("@PREPARED@", &prepared.to_string_lossy());
        let mut config = config_with_command(
            dir.path(),
            "sh",
            &["-c", script.as_str(), "indextts", "--voice", "{reference}", "--output_path", "{output}"],
        );
        config.command.trailing_args = vec!["--".to_string(), "{text}".to_string()];
        let model = IndexTts::load(config).unwrap();

        let reference = dir.path().join("ref.wav");
        write_wav(&reference, 16000, 10);
        let output = dir.path().join("dash.wav");
        let outcome = model.infer(&reference, "--help", &output).unwrap();
        assert_eq!(outcome.sample_rate, Some(22050));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_stderr() {
        let dir = checkpoint_dir();
        let config = config_with_command(dir.path(), "sh", &["-c", "echo cuda out of memory >&2; exit 3"]);
        let model = IndexTts::load(config).unwrap();
        let reference = dir.path().join("ref.wav");
        write_wav(&reference, 16000, 10);

        let err = model.infer_fast(&reference, "hello", &dir.path().join("o.wav")).unwrap_err();
        assert!(matches!(err, TtsError::Inference { stage: InferenceStage::ModelInvocation, .. }));
        assert!(err.to_string().contains("cuda out of memory"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_requires_output_file() {
        let dir = checkpoint_dir();
        let config = config_with_command(dir.path(), "true", &[]);
        let model = IndexTts::load(config).unwrap();
        let reference = dir.path().join("ref.wav");
        write_wav(&reference, 16000, 10);

        let err = model.infer(&reference, "hello", &dir.path().join("o.wav")).unwrap_err();
        assert!(matches!(err, TtsError::Inference { stage: InferenceStage::OutputReadback, .. }));
    }
}
