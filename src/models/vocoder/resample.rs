//! Alias-free resampling for BigVGAN activations
//!
//! Kaiser-windowed sinc low-pass filters used to up-sample before the
//! periodic activation and to down-sample after it. Padding is always
//! replicate ("same edge") padding.

use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor};

/// Zeroth-order modified Bessel function of the first kind
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 1.0;
    loop {
        term *= (half / k) * (half / k);
        sum += term;
        if term < 1e-12 * sum {
            return sum;
        }
        k += 1.0;
    }
}

/// Symmetric (non-periodic) Kaiser window
fn kaiser_window(len: usize, beta: f64) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    let denom = bessel_i0(beta);
    (0..len)
        .map(|n| {
            let r = 2.0 * n as f64 / (len - 1) as f64 - 1.0;
            bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
        })
        .collect()
}

/// Normalised sinc: sin(pi x) / (pi x)
fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

/// Kaiser-windowed sinc low-pass filter.
///
/// `cutoff` and `half_width` are fractions of the sample rate. The taps are
/// normalised to sum to one; a zero cutoff yields an all-zero filter.
pub fn kaiser_sinc_filter1d(cutoff: f64, half_width: f64, kernel_size: usize) -> Vec<f32> {
    let even = kernel_size % 2 == 0;
    let half_size = (kernel_size / 2) as f64;

    // Kaiser window parameters
    let delta_f = 4.0 * half_width;
    let attenuation = 2.285 * (half_size - 1.0) * std::f64::consts::PI * delta_f + 7.95;
    let beta = if attenuation > 50.0 {
        0.1102 * (attenuation - 8.7)
    } else if attenuation >= 21.0 {
        0.5842 * (attenuation - 21.0).powf(0.4) + 0.07886 * (attenuation - 21.0)
    } else {
        0.0
    };
    let window = kaiser_window(kernel_size, beta);

    if cutoff == 0.0 {
        return vec![0.0; kernel_size];
    }

    let taps: Vec<f64> = (0..kernel_size)
        .map(|n| {
            let time = if even {
                n as f64 - half_size + 0.5
            } else {
                n as f64 - half_size
            };
            2.0 * cutoff * window[n] * sinc(2.0 * cutoff * time)
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.iter().map(|t| (t / sum) as f32).collect()
}

/// Default filter length for a resampling ratio
pub fn default_kernel_size(ratio: usize) -> usize {
    (6 * ratio / 2) * 2
}

fn filter_tensor(taps: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(taps, (1, 1, taps.len()), device)?)
}

/// Fold channels into the batch so a single-channel filter acts depthwise
fn to_depthwise(x: &Tensor) -> Result<(Tensor, usize, usize)> {
    let (b, c, t) = x.dims3()?;
    Ok((x.reshape((b * c, 1, t))?, b, c))
}

/// Anti-aliased up-sampler
#[derive(Debug, Clone)]
pub struct UpSample1d {
    ratio: usize,
    kernel_size: usize,
    pad: usize,
    pad_left: usize,
    pad_right: usize,
    taps: Vec<f32>,
}

impl UpSample1d {
    /// Create an up-sampler; `kernel_size` defaults to `default_kernel_size(ratio)`.
    ///
    /// `kernel_size` must be at least `ratio`.
    pub fn new(ratio: usize, kernel_size: Option<usize>) -> Result<Self> {
        if ratio == 0 {
            bail!("up-sampling ratio must be positive");
        }
        let kernel_size = kernel_size.unwrap_or_else(|| default_kernel_size(ratio));
        if kernel_size < ratio {
            bail!(
                "up-sampling kernel size {} is smaller than the ratio {}",
                kernel_size,
                ratio
            );
        }
        let stride = ratio;
        let pad = kernel_size / ratio - 1;
        let pad_left = pad * stride + (kernel_size - stride) / 2;
        let pad_right = pad * stride + (kernel_size - stride + 1) / 2;
        let taps = kaiser_sinc_filter1d(
            0.5 / ratio as f64,
            0.6 / ratio as f64,
            kernel_size,
        );
        Ok(Self {
            ratio,
            kernel_size,
            pad,
            pad_left,
            pad_right,
            taps,
        })
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Filter taps
    pub fn filter(&self) -> &[f32] {
        &self.taps
    }

    /// (batch, channels, time) -> (batch, channels, time * ratio)
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (folded, b, c) = to_depthwise(x)?;
        let padded = folded.pad_with_same(2, self.pad, self.pad)?;
        let filter = filter_tensor(&self.taps, x.device())?.to_dtype(x.dtype())?;

        let y = padded.conv_transpose1d(&filter, 0, 0, self.ratio, 1, 1)?;
        let y = (y * self.ratio as f64)?;

        let full = y.dim(2)?;
        let out_len = full - self.pad_left - self.pad_right;
        let y = y.narrow(2, self.pad_left, out_len)?;
        Ok(y.reshape((b, c, out_len))?)
    }
}

/// Strided low-pass filter with replicate padding
#[derive(Debug, Clone)]
pub struct LowPassFilter1d {
    stride: usize,
    pad_left: usize,
    pad_right: usize,
    taps: Vec<f32>,
}

impl LowPassFilter1d {
    pub fn new(cutoff: f64, half_width: f64, stride: usize, kernel_size: usize) -> Result<Self> {
        if stride == 0 || kernel_size == 0 {
            bail!(
                "low-pass filter needs a positive stride and kernel size, got stride={} kernel_size={}",
                stride,
                kernel_size
            );
        }
        let even = kernel_size % 2 == 0;
        Ok(Self {
            stride,
            pad_left: kernel_size / 2 - usize::from(even),
            pad_right: kernel_size / 2,
            taps: kaiser_sinc_filter1d(cutoff, half_width, kernel_size),
        })
    }

    /// Filter taps
    pub fn filter(&self) -> &[f32] {
        &self.taps
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (folded, b, c) = to_depthwise(x)?;
        let padded = folded.pad_with_same(2, self.pad_left, self.pad_right)?;
        let filter = filter_tensor(&self.taps, x.device())?.to_dtype(x.dtype())?;
        let y = padded.conv1d(&filter, 0, self.stride, 1, 1)?;
        let out_len = y.dim(2)?;
        Ok(y.reshape((b, c, out_len))?)
    }
}

/// Anti-aliased down-sampler
#[derive(Debug, Clone)]
pub struct DownSample1d {
    ratio: usize,
    kernel_size: usize,
    lowpass: LowPassFilter1d,
}

impl DownSample1d {
    /// Create a down-sampler; `kernel_size` defaults to `default_kernel_size(ratio)`
    pub fn new(ratio: usize, kernel_size: Option<usize>) -> Result<Self> {
        if ratio == 0 {
            bail!("down-sampling ratio must be positive");
        }
        let kernel_size = kernel_size.unwrap_or_else(|| default_kernel_size(ratio));
        Ok(Self {
            ratio,
            kernel_size,
            lowpass: LowPassFilter1d::new(
                0.5 / ratio as f64,
                0.6 / ratio as f64,
                ratio,
                kernel_size,
            )?,
        })
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Filter taps of the inner low-pass filter
    pub fn filter(&self) -> &[f32] {
        self.lowpass.filter()
    }

    /// (batch, channels, time) -> (batch, channels, ceil(time / ratio))
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.lowpass.forward(x)
    }
}

/// Constant-valued test signal helper used by benches and tests
pub fn constant_signal(value: f32, shape: (usize, usize, usize), device: &Device) -> Result<Tensor> {
    Ok((Tensor::ones(shape, DType::F32, device)? * value as f64)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_kernel_size() {
        assert_eq!(default_kernel_size(2), 12);
        assert_eq!(default_kernel_size(3), 18);
    }

    #[test]
    fn test_kaiser_sinc_filter_normalised_and_symmetric() {
        let taps = kaiser_sinc_filter1d(0.25, 0.3, 12);
        assert_eq!(taps.len(), 12);
        let sum: f32 = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..6 {
            assert!((taps[i] - taps[11 - i]).abs() < 1e-7);
        }
        // Centre taps dominate
        assert!((taps[5] - 0.443_21).abs() < 1e-4);
    }

    #[test]
    fn test_zero_cutoff_filter() {
        let taps = kaiser_sinc_filter1d(0.0, 0.3, 12);
        assert!(taps.iter().all(|&t| t == 0.0));
    }

    #[test]
    fn test_bessel_i0() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-12);
        assert!((bessel_i0(1.0) - 1.266_065_877_752_008).abs() < 1e-9);
    }

    #[test]
    fn test_upsample_shape_and_constant() {
        let device = Device::Cpu;
        let up = UpSample1d::new(2, None).unwrap();
        let x = constant_signal(0.5, (2, 3, 40), &device).unwrap();
        let y = up.forward(&x).unwrap();
        assert_eq!(y.dims3().unwrap(), (2, 3, 80));
        let values: Vec<f32> = y.flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|v| (v - 0.5).abs() < 1e-4));
    }

    #[test]
    fn test_downsample_shape_and_constant() {
        let device = Device::Cpu;
        let down = DownSample1d::new(2, None).unwrap();
        let x = constant_signal(-0.25, (1, 4, 80), &device).unwrap();
        let y = down.forward(&x).unwrap();
        assert_eq!(y.dims3().unwrap(), (1, 4, 40));
        let values: Vec<f32> = y.flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|v| (v + 0.25).abs() < 1e-4));
    }

    #[test]
    fn test_downsample_odd_length() {
        let device = Device::Cpu;
        let down = DownSample1d::new(2, None).unwrap();
        let x = constant_signal(1.0, (1, 1, 41), &device).unwrap();
        let y = down.forward(&x).unwrap();
        assert_eq!(y.dims3().unwrap(), (1, 1, 21));
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        assert!(UpSample1d::new(4, Some(2)).is_err());
        assert!(UpSample1d::new(0, None).is_err());
        assert!(DownSample1d::new(0, None).is_err());
        assert!(DownSample1d::new(2, Some(0)).is_err());
        assert!(LowPassFilter1d::new(0.25, 0.3, 0, 12).is_err());
        assert!(UpSample1d::new(2, Some(2)).is_ok());
    }
}
