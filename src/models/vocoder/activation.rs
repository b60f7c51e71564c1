//! Anti-aliased periodic activations
//!
//! `Activation1d` wraps a Snake-family activation between an up-sampler and
//! a down-sampler. When the fused native kernel is loaded and the
//! hyperparameters match the ones compiled into it, the three steps run as
//! one kernel call; otherwise they run as separate tensor ops.

use std::sync::Arc;

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use tracing::debug;

use super::fused::{fused_kernel, FusedKernel, FUSED_FILTER_SIZE, FUSED_RATIO};
use super::resample::{DownSample1d, UpSample1d};

/// Guards the 1/beta term
const NO_DIV_BY_ZERO: f64 = 1e-9;

/// Which member of the Snake family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnakeKind {
    /// x + 1/a * sin²(a·x)
    Snake,
    /// x + 1/b * sin²(a·x)
    SnakeBeta,
}

impl std::str::FromStr for SnakeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "snake" => Ok(SnakeKind::Snake),
            "snakebeta" | "snake_beta" => Ok(SnakeKind::SnakeBeta),
            other => Err(anyhow::anyhow!("unknown activation: {}", other)),
        }
    }
}

/// Snake / SnakeBeta activation with per-channel parameters
#[derive(Debug, Clone)]
pub struct SnakeActivation {
    kind: SnakeKind,
    alpha: Tensor,
    beta: Option<Tensor>,
    alpha_logscale: bool,
}

impl SnakeActivation {
    /// Snake with trainable `alpha` of shape [channels]
    pub fn snake(alpha: Tensor, alpha_logscale: bool) -> Self {
        Self {
            kind: SnakeKind::Snake,
            alpha,
            beta: None,
            alpha_logscale,
        }
    }

    /// SnakeBeta with separate frequency (`alpha`) and magnitude (`beta`)
    pub fn snake_beta(alpha: Tensor, beta: Tensor, alpha_logscale: bool) -> Self {
        Self {
            kind: SnakeKind::SnakeBeta,
            alpha,
            beta: Some(beta),
            alpha_logscale,
        }
    }

    /// Freshly initialised parameters: zeros in log scale, ones otherwise
    pub fn init(kind: SnakeKind, channels: usize, alpha_logscale: bool, device: &Device) -> Result<Self> {
        let param = if alpha_logscale {
            Tensor::zeros((channels,), DType::F32, device)?
        } else {
            Tensor::ones((channels,), DType::F32, device)?
        };
        Ok(match kind {
            SnakeKind::Snake => Self::snake(param, alpha_logscale),
            SnakeKind::SnakeBeta => Self::snake_beta(param.clone(), param, alpha_logscale),
        })
    }

    pub fn kind(&self) -> SnakeKind {
        self.kind
    }

    pub fn alpha_logscale(&self) -> bool {
        self.alpha_logscale
    }

    pub fn channels(&self) -> usize {
        self.alpha.elem_count()
    }

    fn beta_or_alpha(&self) -> &Tensor {
        self.beta.as_ref().unwrap_or(&self.alpha)
    }

    /// Parameters as the fused kernel expects them: log scale, with
    /// beta = alpha for plain Snake
    pub fn kernel_params(&self) -> Result<(Tensor, Tensor)> {
        let alpha = self.alpha.clone();
        let beta = self.beta_or_alpha().clone();
        if self.alpha_logscale {
            Ok((alpha, beta))
        } else {
            Ok((alpha.log()?, beta.log()?))
        }
    }

    /// Apply to (batch, channels, time)
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let alpha = self.alpha.to_dtype(x.dtype())?.unsqueeze(0)?.unsqueeze(2)?;
        let beta = self.beta_or_alpha().to_dtype(x.dtype())?.unsqueeze(0)?.unsqueeze(2)?;
        let (alpha, beta) = if self.alpha_logscale {
            (alpha.exp()?, beta.exp()?)
        } else {
            (alpha, beta)
        };

        let sin_sq = x.broadcast_mul(&alpha)?.sin()?.sqr()?;
        let inv_beta = (beta + NO_DIV_BY_ZERO)?.recip()?;
        Ok((x + sin_sq.broadcast_mul(&inv_beta)?)?)
    }
}

/// Up-sample, activate, down-sample
pub struct Activation1d {
    activation: SnakeActivation,
    upsample: UpSample1d,
    downsample: DownSample1d,
    kernel: Option<Arc<FusedKernel>>,
}

impl Activation1d {
    /// Create with explicit hyperparameters.
    ///
    /// `fused` is a request: it only takes effect when the process-wide
    /// kernel loaded and the hyperparameters match the kernel's.
    pub fn new(
        activation: SnakeActivation,
        up_ratio: usize,
        down_ratio: usize,
        up_kernel_size: usize,
        down_kernel_size: usize,
        fused: bool,
    ) -> Result<Self> {
        let kernel = if fused && Self::fused_supported(up_ratio, down_ratio, up_kernel_size, down_kernel_size) {
            fused_kernel()
        } else {
            None
        };
        Self::with_kernel(activation, up_ratio, down_ratio, up_kernel_size, down_kernel_size, kernel)
    }

    /// BigVGAN defaults: ratio 2, 12-tap filters
    pub fn with_defaults(activation: SnakeActivation, fused: bool) -> Result<Self> {
        Self::new(activation, 2, 2, 12, 12, fused)
    }

    /// Create with an explicit kernel handle.
    ///
    /// The kernel is discarded when the hyperparameters do not match it.
    /// Fails when a kernel size is smaller than its ratio.
    pub fn with_kernel(
        activation: SnakeActivation,
        up_ratio: usize,
        down_ratio: usize,
        up_kernel_size: usize,
        down_kernel_size: usize,
        kernel: Option<Arc<FusedKernel>>,
    ) -> Result<Self> {
        let supported = Self::fused_supported(up_ratio, down_ratio, up_kernel_size, down_kernel_size);
        if kernel.is_some() && !supported {
            debug!(
                "Fused activation disabled: up_ratio={} down_ratio={} up_kernel={} down_kernel={}",
                up_ratio, down_ratio, up_kernel_size, down_kernel_size
            );
        }
        Ok(Self {
            activation,
            upsample: UpSample1d::new(up_ratio, Some(up_kernel_size))?,
            downsample: DownSample1d::new(down_ratio, Some(down_kernel_size))?,
            kernel: kernel.filter(|_| supported),
        })
    }

    /// Whether the fused kernel can compute this configuration
    pub fn fused_supported(
        up_ratio: usize,
        down_ratio: usize,
        up_kernel_size: usize,
        down_kernel_size: usize,
    ) -> bool {
        up_ratio == FUSED_RATIO
            && down_ratio == FUSED_RATIO
            && up_kernel_size == FUSED_FILTER_SIZE
            && down_kernel_size == FUSED_FILTER_SIZE
    }

    /// Whether forward passes go through the fused kernel
    pub fn is_fused(&self) -> bool {
        self.kernel.is_some()
    }

    pub fn activation(&self) -> &SnakeActivation {
        &self.activation
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        match self.kernel {
            Some(ref kernel) => {
                let (alpha, beta) = self.activation.kernel_params()?;
                Ok(kernel.forward(
                    x,
                    self.upsample.filter(),
                    self.downsample.filter(),
                    &alpha,
                    &beta,
                )?)
            }
            None => {
                let x = self.upsample.forward(x)?;
                let x = self.activation.forward(&x)?;
                self.downsample.forward(&x)
            }
        }
    }
}
