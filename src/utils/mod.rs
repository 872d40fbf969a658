//! Shared utilities for image preparation

pub mod preprocessing;

pub use preprocessing::{ImagePreprocessor, TensorNormalization};
