use candle_core::Device;
use tracing::info;

pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("Device: Metal (MPS)");
            return dev;
        }
    }
    #[cfg(feature = "cuda")]
    {
        if let Ok(dev) = Device::new_cuda(0) {
            info!("Device: CUDA");
            return dev;
        }
    }
    info!("Device: CPU");
    Device::Cpu
}
