//! Backend implementations
//!
//! - Compute backend catalog (capability query and preparation)
//! - ONNX Runtime inference backend

pub mod catalog;

#[cfg(feature = "onnx")]
pub mod onnx;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

pub use self::catalog::{
    BackendCatalog, BackendKind, ComputeBackend, PreparationOutcome, ReadyState,
    StaticBackendCatalog, CPU_BACKEND,
};

#[cfg(feature = "onnx")]
pub use self::catalog::OrtBackendCatalog;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxBackend, OnnxBackendFactory};
