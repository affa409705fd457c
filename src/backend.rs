//! Backend abstraction - NdArray (CPU) inference backend
//!
//! Serving is inference-only and CPU-bound, so there is no autodiff wrapper and no
//! device selection: every tensor lives on the NdArray CPU device.

use burn::tensor::backend::Backend;

/// The backend used for serving
pub type DefaultBackend = burn_ndarray::NdArray<f32>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as Backend>::Device {
    <DefaultBackend as Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    "NdArray (CPU)"
}
