//! Backend implementations for different generation engines
//!
//! This module provides the backends a model handle can wrap:
//! - Remote backend (Stable Diffusion web-UI compatible HTTP service)
//! - ONNX Runtime backends (local segmentation and LaMa-style erasure)

#[cfg(feature = "remote")]
pub mod remote;

#[cfg(feature = "onnx")]
pub mod onnx;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

// Re-export backends based on enabled features
#[cfg(feature = "remote")]
pub use self::remote::RemoteBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxErasureBackend, OnnxSegmentationBackend};
