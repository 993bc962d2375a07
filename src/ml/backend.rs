// ============================================================
// Layer 5 — Backend Selection
// ============================================================
// The trainer and the model are generic over an AutodiffBackend;
// which one a run uses comes from `trainer.accelerator` (or the
// top-level `accelerator` key for inference):
//
//   cpu  → Autodiff<NdArray>
//   gpu  → Autodiff<Wgpu>
//   auto → Autodiff<Wgpu> when a GPU adapter can be initialised,
//          Autodiff<NdArray> otherwise
//
// Code that needs a backend implements BackendTask and is handed
// to `dispatch`, which monomorphises it for the chosen backend.

use std::panic;

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::{backend::AutodiffBackend, Tensor},
};
use serde::Deserialize;

pub type CpuBackend = Autodiff<NdArray>;
pub type GpuBackend = Autodiff<Wgpu>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    Cpu,
    Gpu,
    #[default]
    Auto,
}

impl std::fmt::Display for Accelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Accelerator::Cpu => "cpu",
            Accelerator::Gpu => "gpu",
            Accelerator::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// Work that runs the same way on any autodiff backend.
pub trait BackendTask {
    type Output;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<Self::Output>;
}

/// Turn `auto` into `gpu` or `cpu`. `gpu_available` is only asked
/// for `auto`; an explicit choice is returned unchanged.
pub fn resolve(accelerator: Accelerator, gpu_available: impl FnOnce() -> bool) -> Accelerator {
    match accelerator {
        Accelerator::Auto if gpu_available() => Accelerator::Gpu,
        Accelerator::Auto => {
            tracing::warn!("No usable GPU adapter found, falling back to cpu");
            Accelerator::Cpu
        }
        explicit => explicit,
    }
}

/// Initialising wgpu without an adapter panics inside the runtime,
/// so the first allocation is tried under `catch_unwind`.
fn wgpu_adapter_available() -> bool {
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let probe = panic::catch_unwind(|| {
        let tensor = Tensor::<Wgpu, 1>::zeros([1], &WgpuDevice::default());
        let _ = tensor.into_data();
    });
    panic::set_hook(previous_hook);
    probe.is_ok()
}

pub fn dispatch<T: BackendTask>(accelerator: Accelerator, task: T) -> Result<T::Output> {
    match resolve(accelerator, wgpu_adapter_available) {
        Accelerator::Cpu => {
            tracing::info!("Using NdArray (CPU) backend");
            task.run::<CpuBackend>(NdArrayDevice::Cpu)
        }
        Accelerator::Gpu | Accelerator::Auto => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            task.run::<GpuBackend>(device)
        }
    }
}
