use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use super::patcher::file_mtime;
use super::TypeRegistry;
use crate::error::Result;

/// Shared handle over loaded registries keyed by path.
///
/// Registries are immutable once loaded and handed out as `Arc`s, so many
/// files can decode concurrently against one dump. Loads for a given
/// manager are serialized through its lock, which also serializes the
/// patch-cache writes for a registry seen for the first time.
#[derive(Debug, Default)]
pub struct RegistryManager {
    inner: Mutex<HashMap<PathBuf, ManagedEntry>>,
}

#[derive(Debug)]
struct ManagedEntry {
    mtime: Option<SystemTime>,
    registry: Arc<TypeRegistry>,
}

impl RegistryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registry for `path`, loading it on first use and
    /// reloading when the file's modification time changes.
    pub fn get(&self, path: impl AsRef<Path>) -> Result<Arc<TypeRegistry>> {
        let path = path.as_ref();
        let mtime = file_mtime(path);

        let mut entries = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(path) {
            if entry.mtime == mtime && mtime.is_some() {
                return Ok(entry.registry.clone());
            }
            log::debug!("registry {:?} changed on disk, reloading", path);
        }

        let registry = Arc::new(TypeRegistry::load(path)?);
        entries.insert(
            path.to_path_buf(),
            ManagedEntry {
                mtime,
                registry: registry.clone(),
            },
        );
        Ok(registry)
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_manager_reuses_loaded_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsz.json");
        fs::write(&path, r#"{"1": {"crc": 0, "name": "t", "fields": []}}"#).unwrap();

        let manager = RegistryManager::new();
        let first = manager.get(&path).unwrap();
        let second = manager.get(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
