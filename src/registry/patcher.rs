use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{RawTypeInfo, RegistryMetadata};
use crate::error::{Error, Result};

/// A registry dump in its on-disk JSON shape, after field-name patching.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawRegistry {
    pub types: Vec<(u32, RawTypeInfo)>,
    pub metadata: RegistryMetadata,
}

pub(crate) fn parse_raw_registry(json: &str) -> std::result::Result<RawRegistry, String> {
    let root: serde_json::Map<String, Value> =
        serde_json::from_str(json).map_err(|e| e.to_string())?;

    let mut registry = RawRegistry::default();
    for (key, value) in root {
        if key == "metadata" {
            registry.metadata = serde_json::from_value(value).unwrap_or_default();
            continue;
        }
        let Ok(type_id) = u32::from_str_radix(&key, 16) else {
            log::warn!("skipping registry entry with non-hexadecimal key {:?}", key);
            continue;
        };
        let info: RawTypeInfo =
            serde_json::from_value(value).map_err(|e| format!("type {:08x}: {}", type_id, e))?;
        registry.types.push((type_id, info));
    }

    Ok(registry)
}

/// Uniquifies duplicate field names within each type by appending `_<n>`
/// to the second and later occurrences, preserving field order.
pub(crate) fn patch_duplicate_field_names(registry: &mut RawRegistry) {
    for (_, info) in registry.types.iter_mut() {
        let mut seen: HashMap<String, u32> = HashMap::new();
        for field in info.fields.iter_mut() {
            if field.name.is_empty() {
                continue;
            }
            match seen.get(&field.name).copied() {
                Some(count) => {
                    let count = count + 1;
                    seen.insert(field.name.clone(), count);
                    let renamed = format!("{}_{}", field.name, count);
                    log::debug!("renamed duplicate field {:?} to {:?}", field.name, renamed);
                    field.name = renamed;
                }
                None => {
                    seen.insert(field.name.clone(), 1);
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    mtime_secs: u64,
    mtime_nanos: u32,
    registry: Value,
}

/// Applies the duplicate-field patch pass to a registry dump, caching the
/// patched result on disk keyed by the dump's modification time. Patching
/// a large dump is expensive; the cache makes repeat loads cheap.
#[derive(Debug)]
pub struct RegistryPatcher {
    registry_path: PathBuf,
    cache_path: PathBuf,
}

impl RegistryPatcher {
    pub fn new(registry_path: impl AsRef<Path>) -> Self {
        let registry_path = registry_path.as_ref().to_path_buf();
        let file_name = registry_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cache_path = registry_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(".cache")
            .join(format!("{}.patch_cache", file_name));

        Self {
            registry_path,
            cache_path,
        }
    }

    pub(crate) fn load_patched(&self) -> Result<RawRegistry> {
        let mtime = fs::metadata(&self.registry_path)?.modified()?;
        let since_epoch = mtime.duration_since(UNIX_EPOCH).unwrap_or_default();

        if let Some(cached) = self.read_cache(since_epoch.as_secs(), since_epoch.subsec_nanos()) {
            log::debug!("using cached patches for {:?}", self.registry_path);
            return Ok(cached);
        }

        log::debug!("creating new patches for {:?}", self.registry_path);
        let json = fs::read_to_string(&self.registry_path)?;
        let mut registry = parse_raw_registry(&json).map_err(|reason| Error::InvalidRegistry {
            path: self.registry_path.to_string_lossy().into_owned(),
            reason,
        })?;
        patch_duplicate_field_names(&mut registry);

        self.write_cache(
            &registry,
            since_epoch.as_secs(),
            since_epoch.subsec_nanos(),
        );

        Ok(registry)
    }

    fn read_cache(&self, mtime_secs: u64, mtime_nanos: u32) -> Option<RawRegistry> {
        let json = fs::read_to_string(&self.cache_path).ok()?;
        let cache: CacheFile = match serde_json::from_str(&json) {
            Ok(cache) => cache,
            Err(e) => {
                log::warn!("discarding unreadable patch cache {:?}: {}", self.cache_path, e);
                return None;
            }
        };
        if cache.mtime_secs != mtime_secs || cache.mtime_nanos != mtime_nanos {
            return None;
        }

        let root = cache.registry.as_object()?;
        let mut registry = RawRegistry::default();
        for (key, value) in root {
            if key == "metadata" {
                registry.metadata = serde_json::from_value(value.clone()).unwrap_or_default();
                continue;
            }
            let type_id = u32::from_str_radix(key, 16).ok()?;
            let info: RawTypeInfo = serde_json::from_value(value.clone()).ok()?;
            registry.types.push((type_id, info));
        }
        Some(registry)
    }

    /// Cache writes are best-effort; a read-only registry directory only
    /// costs a re-patch on the next load.
    fn write_cache(&self, registry: &RawRegistry, mtime_secs: u64, mtime_nanos: u32) {
        let mut root = serde_json::Map::new();
        root.insert(
            "metadata".to_owned(),
            serde_json::to_value(registry.metadata).unwrap_or(Value::Null),
        );
        for (type_id, info) in &registry.types {
            if let Ok(value) = serde_json::to_value(info) {
                root.insert(format!("{:x}", type_id), value);
            }
        }

        let cache = CacheFile {
            mtime_secs,
            mtime_nanos,
            registry: Value::Object(root),
        };

        let result = self
            .cache_path
            .parent()
            .map(fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| fs::write(&self.cache_path, serde_json::to_string(&cache).unwrap_or_default()));
        if let Err(e) = result {
            log::warn!("could not save patch cache {:?}: {}", self.cache_path, e);
        }
    }
}

pub(crate) fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "10": {
            "crc": "aabbccdd",
            "name": "via.Sample",
            "fields": [
                {"name": "x", "type": "F32", "size": 4, "align": 4},
                {"name": "x", "type": "F32", "size": 4, "align": 4}
            ]
        }
    }"#;

    #[test]
    fn test_patch_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry_path = dir.path().join("rszsample.json");
        let mut file = fs::File::create(&registry_path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        drop(file);

        let first = TypeRegistry::load(&registry_path).unwrap();
        assert!(registry_path
            .parent()
            .unwrap()
            .join(".cache")
            .join("rszsample.json.patch_cache")
            .is_file());

        // second load goes through the cache and must agree
        let second = TypeRegistry::load(&registry_path).unwrap();
        let a = first.get(0x10).unwrap();
        let b = second.get(0x10).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.fields[1].name, "x_2");
    }

    #[test]
    fn test_stale_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let registry_path = dir.path().join("rszsample.json");
        fs::write(&registry_path, SAMPLE).unwrap();

        let cache_dir = dir.path().join(".cache");
        fs::create_dir_all(&cache_dir).unwrap();
        fs::write(
            cache_dir.join("rszsample.json.patch_cache"),
            r#"{"mtime_secs": 1, "mtime_nanos": 0, "registry": {}}"#,
        )
        .unwrap();

        let registry = TypeRegistry::load(&registry_path).unwrap();
        assert!(registry.get(0x10).is_some());
    }
}
