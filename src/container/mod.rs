//! Outer file envelopes wrapping the object stream: scene, prefab and
//! user-root containers plus their legacy revisions.

mod pfb;
mod scn;
mod usr;

pub use self::pfb::*;
pub use self::scn::*;
pub use self::usr::*;

use std::collections::HashMap;
use std::path::Path;

use crate::cursor::BinaryCursor;
use crate::error::{Error, Result, Warning};
use crate::registry::TypeRegistry;
use crate::rsz::ObjectStream;

pub const SCN_MAGIC: [u8; 4] = *b"SCN\0";
pub const PFB_MAGIC: [u8; 4] = *b"PFB\0";
pub const USR_MAGIC: [u8; 4] = *b"USR\0";

/// Container variant, decided by the file magic plus the numeric
/// extension the engine appends to asset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Scene,
    Scene18,
    Scene19,
    Prefab,
    Prefab16,
    UserRoot,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Scene => "SCN",
            Self::Scene18 => "SCN.18",
            Self::Scene19 => "SCN.19",
            Self::Prefab => "PFB",
            Self::Prefab16 => "PFB.16",
            Self::UserRoot => "USR",
        };
        f.write_str(name)
    }
}

impl Format {
    /// Detects the variant from the first bytes of `data` and the
    /// file-name suffix (`.18`, `.19`, `.16`).
    pub fn detect(data: &[u8], path: impl AsRef<Path>) -> Result<Self> {
        let mut magic = [0u8; 4];
        if data.len() < 4 {
            return Err(Error::Truncated {
                offset: 0,
                expected: 4,
                actual: data.len(),
            });
        }
        magic.copy_from_slice(&data[..4]);

        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match magic {
            SCN_MAGIC if name.ends_with(".18") => Ok(Self::Scene18),
            SCN_MAGIC if name.ends_with(".19") => Ok(Self::Scene19),
            SCN_MAGIC => Ok(Self::Scene),
            PFB_MAGIC if name.ends_with(".16") => Ok(Self::Prefab16),
            PFB_MAGIC => Ok(Self::Prefab),
            USR_MAGIC => Ok(Self::UserRoot),
            other => Err(Error::MalformedMagic { magic: other }),
        }
    }
}

/// An 8-byte resource descriptor pointing into the string heap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    pub string_offset: u32,
    pub reserved: u32,
    pub path: String,
}

impl ResourceInfo {
    pub fn read(cursor: &mut BinaryCursor) -> Result<Self> {
        Ok(Self {
            string_offset: cursor.read_u32()?,
            reserved: cursor.read_u32()?,
            path: String::new(),
        })
    }
}

/// A resource stored as an inline UTF-16LE string instead of a
/// descriptor, used by the legacy prefab and scene revisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineResourceInfo {
    pub string_value: String,
}

/// An 8-byte prefab descriptor: heap offset plus parent slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefabInfo {
    pub string_offset: u32,
    pub parent_id: u32,
    pub path: String,
}

impl PrefabInfo {
    pub fn read(cursor: &mut BinaryCursor) -> Result<Self> {
        Ok(Self {
            string_offset: cursor.read_u32()?,
            parent_id: cursor.read_u32()?,
            path: String::new(),
        })
    }
}

/// A 16-byte userdata descriptor in the outer header tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDataInfo {
    pub hash: u32,
    pub crc: u32,
    pub string_offset: u64,
    pub path: String,
}

impl UserDataInfo {
    pub fn read(cursor: &mut BinaryCursor) -> Result<Self> {
        Ok(Self {
            hash: cursor.read_u32()?,
            crc: cursor.read_u32()?,
            string_offset: cursor.read_u64()?,
            path: String::new(),
        })
    }
}

/// An 8-byte folder record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderInfo {
    pub id: i32,
    pub parent_id: i32,
}

impl FolderInfo {
    pub fn read(cursor: &mut BinaryCursor) -> Result<Self> {
        Ok(Self {
            id: cursor.read_i32()?,
            parent_id: cursor.read_i32()?,
        })
    }

    pub fn write(&self, cursor: &mut BinaryCursor) {
        cursor.write_i32(self.id);
        cursor.write_i32(self.parent_id);
    }
}

/// Connects a prefab gameobject property to its referenced target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameObjectRefInfo {
    pub object_id: i32,
    pub property_id: i32,
    pub array_index: i32,
    pub target_id: i32,
}

impl GameObjectRefInfo {
    pub fn read(cursor: &mut BinaryCursor) -> Result<Self> {
        Ok(Self {
            object_id: cursor.read_i32()?,
            property_id: cursor.read_i32()?,
            array_index: cursor.read_i32()?,
            target_id: cursor.read_i32()?,
        })
    }

    pub fn write(&self, cursor: &mut BinaryCursor) {
        cursor.write_i32(self.object_id);
        cursor.write_i32(self.property_id);
        cursor.write_i32(self.array_index);
        cursor.write_i32(self.target_id);
    }
}

/// Assigns heap offsets to strings ahead of table emission. Identical
/// strings share one offset and are emitted once; empty strings get
/// offset 0 and no heap entry.
///
/// The outer descriptor records store 4-byte offsets that must be known
/// before the records themselves are written, so they cannot use the
/// cursor's backpatched 8-byte string slots
/// ([`BinaryCursor::queue_string`]); those serve the object-stream
/// userdata table.
#[derive(Debug, Default)]
pub(crate) struct StringHeapPlanner {
    next_offset: u64,
    entries: Vec<(u64, String)>,
    by_value: HashMap<String, u64>,
}

impl StringHeapPlanner {
    pub fn new(start: u64) -> Self {
        Self {
            next_offset: start,
            entries: Vec::new(),
            by_value: HashMap::new(),
        }
    }

    pub fn assign(&mut self, value: &str) -> u64 {
        if value.is_empty() {
            return 0;
        }
        if let Some(offset) = self.by_value.get(value) {
            return *offset;
        }
        let offset = self.next_offset;
        self.next_offset += 2 * (value.encode_utf16().count() as u64 + 1);
        self.entries.push((offset, value.to_owned()));
        self.by_value.insert(value.to_owned(), offset);
        offset
    }

    /// Emits the heap, padding with zeros up to each planned offset.
    pub fn write_heap(&self, cursor: &mut BinaryCursor) {
        for (offset, value) in &self.entries {
            while cursor.tell() < *offset {
                cursor.write_u8(0);
            }
            cursor.write_wstring(value);
        }
    }
}

/// Reads a heap string for a descriptor, degrading an out-of-bounds
/// offset to an empty string plus a warning.
pub(crate) fn resolve_heap_string(
    cursor: &mut BinaryCursor,
    offset: u64,
    warnings: &mut Vec<Warning>,
) -> String {
    if offset == 0 {
        return String::new();
    }
    if offset as usize >= cursor.len() {
        warnings.push(Warning::InvalidStringOffset { offset });
        return String::new();
    }
    cursor.read_wstring_at(offset).0
}

/// A parsed asset file of any container variant.
#[derive(Debug)]
pub enum AssetFile {
    Scene(SceneFile),
    Prefab(PrefabFile),
    User(UserFile),
}

impl AssetFile {
    /// Detects the variant and parses the whole file, object stream
    /// included.
    pub fn read(
        data: Vec<u8>,
        path: impl AsRef<Path>,
        registry: &TypeRegistry,
    ) -> Result<Self> {
        Self::read_with_options(data, path, registry, false)
    }

    /// Parses headers and tables but leaves instance fields undecoded.
    pub fn read_skip_data(
        data: Vec<u8>,
        path: impl AsRef<Path>,
        registry: &TypeRegistry,
    ) -> Result<Self> {
        Self::read_with_options(data, path, registry, true)
    }

    fn read_with_options(
        data: Vec<u8>,
        path: impl AsRef<Path>,
        registry: &TypeRegistry,
        skip_data: bool,
    ) -> Result<Self> {
        let format = Format::detect(&data, &path)?;
        log::debug!("reading {} container ({} bytes)", format, data.len());

        match format {
            Format::Scene | Format::Scene18 | Format::Scene19 => Ok(Self::Scene(
                SceneFile::read(data, format, registry, skip_data)?,
            )),
            Format::Prefab | Format::Prefab16 => Ok(Self::Prefab(PrefabFile::read(
                data, format, registry, skip_data,
            )?)),
            Format::UserRoot => Ok(Self::User(UserFile::read(data, registry, skip_data)?)),
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Self::Scene(f) => f.format,
            Self::Prefab(f) => f.format,
            Self::User(_) => Format::UserRoot,
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        match self {
            Self::Scene(f) => &f.warnings,
            Self::Prefab(f) => &f.warnings,
            Self::User(f) => &f.warnings,
        }
    }

    pub fn stream(&self) -> &ObjectStream {
        match self {
            Self::Scene(f) => &f.stream,
            Self::Prefab(f) => &f.stream,
            Self::User(f) => &f.stream,
        }
    }

    pub fn stream_mut(&mut self) -> &mut ObjectStream {
        match self {
            Self::Scene(f) => &mut f.stream,
            Self::Prefab(f) => &mut f.stream,
            Self::User(f) => &mut f.stream,
        }
    }

    /// Opts resource descriptors into being regenerated from decoded
    /// fields at build time.
    pub fn set_auto_resource_management(&mut self, enabled: bool) {
        match self {
            Self::Scene(f) => f.auto_resource_management = enabled,
            Self::Prefab(f) => f.auto_resource_management = enabled,
            Self::User(f) => f.auto_resource_management = enabled,
        }
    }

    /// Serializes the file. With no edits the output is byte-identical
    /// to the parsed input for one of the two `special_align` settings.
    pub fn build(&mut self, registry: &TypeRegistry, special_align: bool) -> Result<Vec<u8>> {
        match self {
            Self::Scene(f) => f.build(registry, special_align),
            Self::Prefab(f) => f.build(registry, special_align),
            Self::User(f) => f.build(registry, special_align),
        }
    }
}

#[cfg(test)]
#[ctor::ctor]
fn init() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}
