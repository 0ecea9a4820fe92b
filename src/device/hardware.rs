//! Hardware detection
//!
//! Every probe degrades to a documented default instead of failing:
//! no GPU → `None`, unknown storage → 0, unknown network → `Unknown`.

#[cfg(feature = "cuda")]
use candle_core::CudaDevice;
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, Networks, System};
use tracing::{debug, info};

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Ethernet,
    Wifi,
    Cellular,
    Unknown,
}

impl NetworkType {
    /// Classifies an interface by its OS name
    pub fn from_interface_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.starts_with("wl") || name.starts_with("wifi") {
            NetworkType::Wifi
        } else if name.starts_with("ww") || name.starts_with("rmnet") || name.starts_with("pdp_ip")
        {
            NetworkType::Cellular
        } else if name.starts_with("en") || name.starts_with("eth") {
            NetworkType::Ethernet
        } else {
            NetworkType::Unknown
        }
    }
}

/// Available compute devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "CPU"),
            ComputeDevice::Cuda => write!(f, "CUDA"),
            ComputeDevice::Metal => write!(f, "Metal"),
        }
    }
}

/// Raw capabilities as reported by the OS
#[derive(Debug, Clone)]
pub struct HardwareCapabilities {
    pub total_memory_mb: u64,
    pub available_memory_mb: u64,
    pub cpu_cores: usize,
    pub cpu_brand: Option<String>,
    /// `linux`, `macos`, `windows`, ...
    pub platform: String,
    pub arch: String,
    pub os_version: String,
    pub storage_available_mb: u64,
    pub network_type: NetworkType,
    pub cuda_available: bool,
    pub metal_available: bool,
    pub gpu_name: Option<String>,
    pub gpu_memory_mb: Option<u64>,
}

impl HardwareCapabilities {
    pub fn best_device(&self) -> ComputeDevice {
        if self.cuda_available {
            ComputeDevice::Cuda
        } else if self.metal_available {
            ComputeDevice::Metal
        } else {
            ComputeDevice::Cpu
        }
    }

    pub fn has_gpu_compute(&self) -> bool {
        self.cuda_available || self.metal_available
    }

    /// Fixed capabilities for tests and simulations
    pub fn synthetic(total_memory_mb: u64, cpu_cores: usize) -> Self {
        Self {
            total_memory_mb,
            available_memory_mb: total_memory_mb / 2,
            cpu_cores,
            cpu_brand: Some("Synthetic CPU".to_string()),
            platform: "linux".to_string(),
            arch: "x86_64".to_string(),
            os_version: "Linux".to_string(),
            storage_available_mb: 64 * 1024,
            network_type: NetworkType::Ethernet,
            cuda_available: false,
            metal_available: false,
            gpu_name: None,
            gpu_memory_mb: None,
        }
    }
}

pub struct HardwareDetector;

impl HardwareDetector {
    /// Blocking; call from `spawn_blocking` on async paths
    pub fn detect() -> HardwareCapabilities {
        let mut sys = System::new_all();
        sys.refresh_all();

        let cpu_brand = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty());

        let (cuda_available, cuda_memory_bytes) = Self::detect_cuda();
        let metal_available = Self::detect_metal();

        let gpu_name = if cuda_available {
            Some("NVIDIA CUDA device 0".to_string())
        } else if metal_available {
            Some("Apple Metal GPU".to_string())
        } else {
            None
        };

        let capabilities = HardwareCapabilities {
            total_memory_mb: sys.total_memory() / BYTES_PER_MB,
            available_memory_mb: sys.available_memory() / BYTES_PER_MB,
            cpu_cores: sys.cpus().len().max(1),
            cpu_brand,
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            os_version: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
            storage_available_mb: Self::detect_storage(),
            network_type: Self::detect_network(),
            cuda_available,
            metal_available,
            gpu_name,
            gpu_memory_mb: cuda_memory_bytes.map(|b| b / BYTES_PER_MB),
        };

        info!(
            "Hardware detected: {}MB RAM ({}MB available), {} cores, device: {}",
            capabilities.total_memory_mb,
            capabilities.available_memory_mb,
            capabilities.cpu_cores,
            capabilities.best_device()
        );
        debug!("Hardware capabilities: {:?}", capabilities);

        capabilities
    }

    /// Free space on the largest mounted disk
    fn detect_storage() -> u64 {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .map(|disk| disk.available_space() / BYTES_PER_MB)
            .max()
            .unwrap_or(0)
    }

    /// Type of the busiest non-loopback interface
    fn detect_network() -> NetworkType {
        let networks = Networks::new_with_refreshed_list();
        networks
            .list()
            .iter()
            .filter(|(name, _)| !name.starts_with("lo"))
            .max_by_key(|(_, data)| data.total_received() + data.total_transmitted())
            .map(|(name, _)| NetworkType::from_interface_name(name))
            .unwrap_or(NetworkType::Unknown)
    }

    #[cfg(feature = "cuda")]
    fn detect_cuda() -> (bool, Option<u64>) {
        use candle_core::backend::BackendDevice;
        use candle_core::cuda::cudarc;
        use std::mem::MaybeUninit;

        match CudaDevice::new(0) {
            Ok(_device) => {
                let context = match cudarc::driver::CudaContext::new(0) {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        debug!("Failed to create CUDA context: {}", e);
                        return (true, None);
                    }
                };

                let cu_device = context.cu_device();
                let memory_bytes = unsafe {
                    let mut bytes = MaybeUninit::uninit();
                    match cudarc::driver::sys::cuDeviceTotalMem_v2(bytes.as_mut_ptr(), cu_device) {
                        cudarc::driver::sys::cudaError_enum::CUDA_SUCCESS => {
                            Some(bytes.assume_init() as u64)
                        }
                        _ => None,
                    }
                };

                (true, memory_bytes)
            }
            Err(e) => {
                debug!("CUDA not available: {}", e);
                (false, None)
            }
        }
    }

    #[cfg(not(feature = "cuda"))]
    fn detect_cuda() -> (bool, Option<u64>) {
        debug!("CUDA support not compiled (cuda feature not enabled)");
        (false, None)
    }

    #[cfg(feature = "metal")]
    fn detect_metal() -> bool {
        use candle_core::metal_backend::MetalDevice;
        use candle_core::backend::BackendDevice;

        match MetalDevice::new(0) {
            Ok(_) => true,
            Err(e) => {
                debug!("Metal not available: {}", e);
                false
            }
        }
    }

    #[cfg(not(feature = "metal"))]
    fn detect_metal() -> bool {
        debug!("Metal support not compiled (metal feature not enabled)");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_detection() {
        let caps = HardwareDetector::detect();

        assert!(caps.total_memory_mb > 0);
        assert!(caps.available_memory_mb <= caps.total_memory_mb);
        assert!(caps.cpu_cores > 0);
        assert!(!caps.platform.is_empty());
    }

    #[test]
    fn test_best_device_selection() {
        let cpu_caps = HardwareCapabilities::synthetic(16384, 8);
        assert_eq!(cpu_caps.best_device(), ComputeDevice::Cpu);
        assert!(!cpu_caps.has_gpu_compute());

        let cuda_caps = HardwareCapabilities {
            cuda_available: true,
            gpu_memory_mb: Some(8192),
            ..cpu_caps.clone()
        };
        assert_eq!(cuda_caps.best_device(), ComputeDevice::Cuda);

        let metal_caps = HardwareCapabilities {
            metal_available: true,
            ..cpu_caps.clone()
        };
        assert_eq!(metal_caps.best_device(), ComputeDevice::Metal);
        assert!(metal_caps.has_gpu_compute());
    }

    #[test]
    fn test_network_type_from_interface() {
        assert_eq!(NetworkType::from_interface_name("wlan0"), NetworkType::Wifi);
        assert_eq!(NetworkType::from_interface_name("wlp3s0"), NetworkType::Wifi);
        assert_eq!(NetworkType::from_interface_name("eth0"), NetworkType::Ethernet);
        assert_eq!(NetworkType::from_interface_name("en0"), NetworkType::Ethernet);
        assert_eq!(NetworkType::from_interface_name("wwan0"), NetworkType::Cellular);
        assert_eq!(NetworkType::from_interface_name("docker0"), NetworkType::Unknown);
    }
}
