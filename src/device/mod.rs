//! Device profiling and identity

mod fingerprint;
mod hardware;
mod identity;
mod profile;
mod profiler;

pub use fingerprint::{fingerprint, FingerprintInputs, FINGERPRINT_LEN};
pub use hardware::{ComputeDevice, HardwareCapabilities, HardwareDetector, NetworkType};
pub use identity::{DeviceIdentity, FileIdentityStore, IdentityStore, MemoryIdentityStore};
pub use profile::{DeviceProfile, ScreenGeometry};
pub use profiler::{DeviceProfiler, RUNTIME_NAME};
