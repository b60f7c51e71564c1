//! Fused anti-alias activation kernel loader
//!
//! The kernel is a prebuilt native library that performs up-sample,
//! Snake activation and down-sample in a single pass. It hard-codes the
//! filter length (12) and the resampling ratio (2), and expects `alpha` and
//! `beta` in log scale because it exponentiates them itself.
//!
//! C ABI of the exported symbol:
//!
//! ```text
//! int anti_alias_activation_forward(
//!     const float *input, float *output,
//!     size_t batch, size_t channels, size_t length,
//!     const float *up_filter, const float *down_filter, size_t filter_len,
//!     const float *alpha, const float *beta);
//! ```
//!
//! A non-zero return value is an error. Only the forward pass exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{DType, Tensor};
use libloading::Library;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::core::error::{Result, TtsError};

/// File name of the prebuilt kernel
pub const KERNEL_FILE_NAME: &str = "anti_alias_activation_cuda.so";

/// Environment variable overriding the kernel location
pub const KERNEL_ENV_VAR: &str = "INDEXTTS_ACTIVATION_KERNEL";

/// Exported symbol name
const FORWARD_SYMBOL: &[u8] = b"anti_alias_activation_forward";

/// Filter length baked into the kernel
pub const FUSED_FILTER_SIZE: usize = 12;

/// Resampling ratio baked into the kernel
pub const FUSED_RATIO: usize = 2;

pub(crate) type ForwardFn = unsafe extern "C" fn(
    input: *const f32,
    output: *mut f32,
    batch: usize,
    channels: usize,
    length: usize,
    up_filter: *const f32,
    down_filter: *const f32,
    filter_len: usize,
    alpha: *const f32,
    beta: *const f32,
) -> i32;

static FUSED_KERNEL: OnceCell<Option<Arc<FusedKernel>>> = OnceCell::new();

/// A loaded fused activation kernel
pub struct FusedKernel {
    path: PathBuf,
    forward_fn: ForwardFn,
    // Keeps `forward_fn` valid; dropped last. `None` for in-process functions.
    _library: Option<Library>,
}

impl std::fmt::Debug for FusedKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusedKernel").field("path", &self.path).finish()
    }
}

impl FusedKernel {
    /// Load the kernel from an explicit path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TtsError::Kernel {
                message: format!("kernel library not found: {}", path.display()),
                path: Some(path.to_path_buf()),
            });
        }

        // SAFETY: loading runs the library's initialisers; the kernel is a
        // trusted build artifact shipped next to the checkpoints.
        let library = unsafe { Library::new(path) }.map_err(|e| TtsError::Kernel {
            message: format!("failed to load {}: {}", path.display(), e),
            path: Some(path.to_path_buf()),
        })?;

        // SAFETY: the symbol type matches the documented C ABI.
        let forward_fn = unsafe {
            let symbol = library
                .get::<ForwardFn>(FORWARD_SYMBOL)
                .map_err(|e| TtsError::Kernel {
                    message: format!("missing symbol anti_alias_activation_forward: {}", e),
                    path: Some(path.to_path_buf()),
                })?;
            *symbol
        };

        Ok(Self {
            path: path.to_path_buf(),
            forward_fn,
            _library: Some(library),
        })
    }

    /// Wrap a function linked into this process
    #[cfg(test)]
    pub(crate) fn from_fn(path: impl Into<PathBuf>, forward_fn: ForwardFn) -> Self {
        Self {
            path: path.into(),
            forward_fn,
            _library: None,
        }
    }

    /// Path the kernel was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the fused forward pass.
    ///
    /// `x` is (batch, channels, time); `alpha` and `beta` are per-channel
    /// log-scale parameters. Output has the same shape and dtype as `x`.
    pub fn forward(
        &self,
        x: &Tensor,
        up_filter: &[f32],
        down_filter: &[f32],
        alpha: &Tensor,
        beta: &Tensor,
    ) -> Result<Tensor> {
        let (batch, channels, length) = x.dims3()?;
        if up_filter.len() != FUSED_FILTER_SIZE || down_filter.len() != FUSED_FILTER_SIZE {
            return Err(TtsError::Kernel {
                message: format!(
                    "fused kernel requires {}-tap filters, got {} and {}",
                    FUSED_FILTER_SIZE,
                    up_filter.len(),
                    down_filter.len()
                ),
                path: Some(self.path.clone()),
            });
        }

        let input: Vec<f32> = x.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
        let alpha: Vec<f32> = alpha.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
        let beta: Vec<f32> = beta.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
        if alpha.len() != channels || beta.len() != channels {
            return Err(TtsError::Kernel {
                message: format!(
                    "expected {} activation parameters, got alpha={} beta={}",
                    channels,
                    alpha.len(),
                    beta.len()
                ),
                path: Some(self.path.clone()),
            });
        }

        let mut output = vec![0f32; input.len()];
        // SAFETY: every buffer is sized as the ABI documents and outlives the call.
        let status = unsafe {
            (self.forward_fn)(
                input.as_ptr(),
                output.as_mut_ptr(),
                batch,
                channels,
                length,
                up_filter.as_ptr(),
                down_filter.as_ptr(),
                FUSED_FILTER_SIZE,
                alpha.as_ptr(),
                beta.as_ptr(),
            )
        };
        if status != 0 {
            return Err(TtsError::Kernel {
                message: format!("fused activation returned status {}", status),
                path: Some(self.path.clone()),
            });
        }

        let out = Tensor::from_vec(output, (batch, channels, length), x.device())?;
        Ok(out.to_dtype(x.dtype())?)
    }
}

/// Candidate kernel locations, in probe order
pub fn kernel_search_paths(kernel_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(explicit) = std::env::var(KERNEL_ENV_VAR) {
        if !explicit.is_empty() {
            paths.push(PathBuf::from(explicit));
        }
    }
    if let Some(dir) = kernel_dir {
        paths.push(dir.join("build").join(KERNEL_FILE_NAME));
        paths.push(dir.join(KERNEL_FILE_NAME));
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        paths.push(exe_dir.join("build").join(KERNEL_FILE_NAME));
    }
    paths.push(PathBuf::from("build").join(KERNEL_FILE_NAME));
    paths
}

/// Try each candidate path and return the first kernel that loads
pub fn probe_kernel(paths: &[PathBuf]) -> Option<FusedKernel> {
    for path in paths {
        debug!("Fused activation kernel: checking {:?} exists={}", path, path.exists());
        match FusedKernel::load(path) {
            Ok(kernel) => {
                info!("Loaded fused activation kernel from {:?}", path);
                return Some(kernel);
            }
            Err(e) => debug!("{}", e),
        }
    }
    warn!("Fused activation kernel unavailable, using unfused activation");
    None
}

/// Probe the kernel once per process, searching `kernel_dir` first.
///
/// Later calls return the first result regardless of `kernel_dir`.
pub fn init_fused_kernel(kernel_dir: Option<&Path>) -> Option<Arc<FusedKernel>> {
    FUSED_KERNEL
        .get_or_init(|| probe_kernel(&kernel_search_paths(kernel_dir)).map(Arc::new))
        .clone()
}

/// Process-wide fused kernel, probing default locations on first use
pub fn fused_kernel() -> Option<Arc<FusedKernel>> {
    init_fused_kernel(None)
}
