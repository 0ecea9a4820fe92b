//! Hardware fingerprint
//!
//! A weak identity: identical hardware collides. It survives reinstalls, which
//! the persisted [`DeviceIdentity`](super::DeviceIdentity) does not, so the
//! backend uses both together.

use sha2::{Digest, Sha256};

pub const FINGERPRINT_LEN: usize = 16;
const DELIMITER: &str = "|";

/// Hardware-identifying inputs in a fixed order. Absent values hash as empty.
#[derive(Debug, Clone, Default)]
pub struct FingerprintInputs<'a> {
    pub cpu: Option<&'a str>,
    pub cpu_cores: usize,
    pub memory_mb: u64,
    pub platform: &'a str,
    pub arch: &'a str,
    pub gpu_renderer: Option<&'a str>,
    pub screen: Option<String>,
}

pub fn fingerprint(inputs: &FingerprintInputs<'_>) -> String {
    let cpu = inputs
        .cpu
        .map(str::to_string)
        .unwrap_or_else(|| inputs.cpu_cores.to_string());

    let parts = [
        cpu,
        inputs.memory_mb.to_string(),
        inputs.platform.to_string(),
        inputs.arch.to_string(),
        inputs.gpu_renderer.unwrap_or_default().to_string(),
        inputs.screen.clone().unwrap_or_default(),
    ];

    let digest = Sha256::digest(parts.join(DELIMITER).as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(FINGERPRINT_LEN);
    encoded
}
