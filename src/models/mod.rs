//! Model-side components that live in this crate
//!
//! The TTS network itself is an external collaborator (see `engine`);
//! only the vocoder's activation shim is implemented here.

pub mod vocoder;

pub use vocoder::{Activation1d, SnakeActivation, SnakeKind};
