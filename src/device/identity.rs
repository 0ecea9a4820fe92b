//! Persisted random device identity

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

const IDENTITY_FILE: &str = "device_id";

/// Where the device id lives between runs
pub trait IdentityStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;

    fn save(&self, device_id: &str) -> Result<()>;
}

/// Stores the id in `<dir>/device_id`
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    dir: PathBuf,
}

impl FileIdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(IDENTITY_FILE)
    }

    fn read(path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read device id from {}", path.display()))?;
        let id = content.trim();
        Ok((!id.is_empty()).then(|| id.to_string()))
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<String>> {
        Self::read(&self.path())
    }

    fn save(&self, device_id: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        std::fs::write(self.path(), device_id)
            .with_context(|| format!("Failed to write device id to {}", self.path().display()))
    }
}

/// In-memory store, for tests and ephemeral hosts
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    id: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Mutex::new(Some(id.into())),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self
            .id
            .lock()
            .map_err(|_| anyhow::anyhow!("identity store lock poisoned"))?
            .clone())
    }

    fn save(&self, device_id: &str) -> Result<()> {
        *self
            .id
            .lock()
            .map_err(|_| anyhow::anyhow!("identity store lock poisoned"))? =
            Some(device_id.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    /// True when this run created the id
    pub created: bool,
}

impl DeviceIdentity {
    /// Returns the stored id, creating and persisting a new one on first run
    pub fn load_or_create(store: &dyn IdentityStore) -> Result<Self> {
        if let Some(device_id) = store.load()? {
            debug!(device_id = %device_id, "Reusing persisted device id");
            return Ok(Self {
                device_id,
                created: false,
            });
        }

        let device_id = format!("dev_{}", Uuid::new_v4().simple());
        store.save(&device_id)?;
        info!(device_id = %device_id, "Created new device id");

        Ok(Self {
            device_id,
            created: true,
        })
    }
}
