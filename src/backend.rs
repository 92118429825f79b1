//! Burn backends. Models train on the CPU (`NdArray`) unless the crate is built with the `gpu`
//! feature and the run asks for it.

use burn::{
    backend::{Autodiff, NdArray, ndarray::NdArrayDevice},
    tensor::{Tensor, backend::Backend},
};
#[cfg(feature = "gpu")]
use burn::backend::{Wgpu, wgpu::WgpuDevice};
use log::warn;

use crate::error::{Error, Result};

pub type CpuBackend = NdArray<f32>;
pub type CpuTrainBackend = Autodiff<CpuBackend>;

#[cfg(feature = "gpu")]
pub type GpuBackend = Wgpu;
#[cfg(feature = "gpu")]
pub type GpuTrainBackend = Autodiff<GpuBackend>;

pub fn cpu_device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

#[cfg(feature = "gpu")]
pub fn gpu_device() -> WgpuDevice {
    WgpuDevice::default()
}

/// Whether a GPU run is possible. Logs a warning when one is requested but this build has no GPU
/// backend.
pub fn use_gpu(requested: bool) -> bool {
    if requested && !cfg!(feature = "gpu") {
        warn!("GPU requested, but this build lacks the `gpu` feature; running on the CPU");
        return false;
    }
    requested
}

/// Copies a float tensor to the host, flattened.
pub fn to_vec<B: Backend, const D: usize>(t: Tensor<B, D>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| Error::Tensor(format!("{e:?}")))
}
