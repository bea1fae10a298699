use candle_core::{DType, Device};
use tracing::info;

use crate::error::Result;

/// Picks the best available accelerator, falling back to CPU.
pub fn get_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        info!("CPU forced by configuration");
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "cuda")]
    {
        if candle_core::utils::cuda_is_available() {
            match Device::new_cuda(0) {
                Ok(device) => return Ok(device),
                Err(e) => tracing::warn!("CUDA not usable: {}, falling back", e),
            }
        }
    }

    #[cfg(feature = "metal")]
    {
        if candle_core::utils::metal_is_available() {
            match Device::new_metal(0) {
                Ok(device) => return Ok(device),
                Err(e) => tracing::warn!("Metal not usable: {}, falling back", e),
            }
        }
    }

    Ok(Device::Cpu)
}

/// Half precision on accelerators, full precision on CPU.
pub fn dtype_for(device: &Device) -> DType {
    match device {
        Device::Cpu => DType::F32,
        Device::Cuda(_) | Device::Metal(_) => DType::F16,
    }
}

pub fn device_info(device: &Device) -> String {
    match device {
        Device::Cpu => "CPU".to_string(),
        Device::Cuda(_) => "CUDA".to_string(),
        Device::Metal(_) => "Metal".to_string(),
    }
}
