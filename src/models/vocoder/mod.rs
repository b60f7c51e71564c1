//! Vocoder building blocks
//!
//! Anti-aliased Snake activations used by the BigVGAN vocoder, with an
//! optional fused native kernel and a pure tensor fallback.

mod activation;
mod fused;
mod resample;

pub use activation::{Activation1d, SnakeActivation, SnakeKind};
pub use fused::{
    fused_kernel, init_fused_kernel, kernel_search_paths, probe_kernel,
    FusedKernel, FUSED_FILTER_SIZE, FUSED_RATIO, KERNEL_ENV_VAR, KERNEL_FILE_NAME,
};
pub use resample::{
    constant_signal, default_kernel_size, kaiser_sinc_filter1d, DownSample1d, LowPassFilter1d,
    UpSample1d,
};
