//! The framed serialized-object stream shared by every container: a
//! stream header, the Object Table (root set), the instance table, an
//! optional userdata table and the per-instance field payloads.

mod codec;
mod graph;

pub use self::codec::*;
pub use self::graph::*;

use std::collections::HashMap;

use crate::cursor::BinaryCursor;
use crate::error::{Result, Warning};
use crate::macros::impl_default;
use crate::registry::TypeRegistry;

/// `"RSZ\0"` little-endian.
pub const RSZ_MAGIC: u32 = 0x005A_5352;

/// Stream header. Versions below 4 lack the userdata table and store a
/// 32-byte header; later versions store 48 bytes. All offsets are
/// relative to the stream's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RszHeader {
    pub magic: u32,
    pub version: u32,
    pub object_count: u32,
    pub instance_count: u32,
    pub userdata_count: u32,
    pub reserved: u32,
    pub instance_offset: u64,
    pub data_offset: u64,
    pub userdata_offset: u64,
}

impl RszHeader {
    pub fn new() -> Self {
        Self {
            magic: RSZ_MAGIC,
            version: 16,
            object_count: 0,
            instance_count: 0,
            userdata_count: 0,
            reserved: 0,
            instance_offset: 0,
            data_offset: 0,
            userdata_offset: 0,
        }
    }

    pub fn has_userdata(&self) -> bool {
        self.version > 3
    }

    pub fn size(&self) -> u64 {
        if self.version < 4 { 32 } else { 48 }
    }

    pub fn read(cursor: &mut BinaryCursor) -> Result<Self> {
        let magic = cursor.read_u32()?;
        let version = cursor.read_u32()?;

        let object_count = cursor.read_u32()?;
        let instance_count = cursor.read_u32()?;
        let (userdata_count, reserved) = if version < 4 {
            (0, 0)
        } else {
            (cursor.read_u32()?, cursor.read_u32()?)
        };

        let instance_offset = cursor.read_u64()?;
        let data_offset = cursor.read_u64()?;
        let userdata_offset = if version > 3 { cursor.read_u64()? } else { 0 };

        Ok(Self {
            magic,
            version,
            object_count,
            instance_count,
            userdata_count,
            reserved,
            instance_offset,
            data_offset,
            userdata_offset,
        })
    }

    pub fn write(&self, cursor: &mut BinaryCursor) {
        cursor.write_u32(self.magic);
        cursor.write_u32(self.version);
        cursor.write_u32(self.object_count);
        cursor.write_u32(self.instance_count);
        if self.version >= 4 {
            cursor.write_u32(self.userdata_count);
            cursor.write_u32(self.reserved);
        }
        cursor.write_u64(self.instance_offset);
        cursor.write_u64(self.data_offset);
        if self.version > 3 {
            cursor.write_u64(self.userdata_offset);
        }
    }
}

impl_default!(RszHeader);

/// Type identity of one instance slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RszInstanceInfo {
    pub type_id: u32,
    pub crc: u32,
}

/// A userdata slot resolved to its path string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RszUserDataInfo {
    pub instance_id: u32,
    pub hash: u32,
    pub string_offset: u64,
    pub path: String,
}

/// Legacy userdata slot framing a nested object stream.
#[derive(Debug, Default)]
pub struct EmbeddedUserDataInfo {
    pub instance_id: u32,
    pub type_id: u32,
    pub hash: u32,
    pub data_size: u32,
    pub rsz_offset: u64,
    /// Parsed nested stream; absent when parsing was skipped.
    pub stream: Option<Box<ObjectStream>>,
    /// Original framed bytes, re-emitted verbatim when no parsed stream
    /// is available.
    pub raw: Vec<u8>,
}

/// The userdata table in either of its two wire forms.
#[derive(Debug, Default)]
pub enum UserDataBlock {
    #[default]
    Absent,
    Standard(Vec<RszUserDataInfo>),
    Embedded(Vec<EmbeddedUserDataInfo>),
}

impl UserDataBlock {
    pub fn len(&self) -> usize {
        match self {
            Self::Absent => 0,
            Self::Standard(entries) => entries.len(),
            Self::Embedded(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn instance_ids(&self) -> Vec<u32> {
        match self {
            Self::Absent => Vec::new(),
            Self::Standard(entries) => entries.iter().map(|e| e.instance_id).collect(),
            Self::Embedded(entries) => entries.iter().map(|e| e.instance_id).collect(),
        }
    }

    fn paths_by_instance(&self) -> HashMap<u32, String> {
        match self {
            Self::Absent | Self::Embedded(_) => HashMap::new(),
            Self::Standard(entries) => entries
                .iter()
                .map(|e| (e.instance_id, e.path.clone()))
                .collect(),
        }
    }
}

/// Which wire form the userdata table takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDataLayout {
    Standard,
    Embedded,
}

/// Read-side parameters supplied by the container.
pub struct StreamReadOptions<'a> {
    pub userdata_layout: UserDataLayout,
    /// Object Table slots claimed by gameobject records.
    pub gameobject_ids: &'a [i32],
    /// Object Table slots claimed by folder records.
    pub folder_ids: &'a [i32],
    /// Parse tables only, leaving every field map empty.
    pub skip_data: bool,
}

/// One framed object stream plus its decoded instance graph.
#[derive(Debug, Default)]
pub struct ObjectStream {
    pub header: RszHeader,
    pub object_table: Vec<i32>,
    pub userdata: UserDataBlock,
    pub graph: InstanceGraph,
    /// Absolute offset where the field payload region began on read.
    pub data_origin: u64,
}

impl ObjectStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alignment base of the payload region, taken modulo 16.
    pub fn alignment_base(&self) -> u64 {
        self.data_origin % 16
    }

    /// Parses the stream at `section_start` and decodes every instance
    /// in index order. Later instances may reference earlier ones, never
    /// the reverse.
    pub fn read(
        cursor: &mut BinaryCursor,
        registry: &TypeRegistry,
        section_start: u64,
        options: &StreamReadOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self> {
        cursor.seek(section_start)?;
        let header = RszHeader::read(cursor)?;
        log::debug!(
            "object stream v{} at {:#x}: {} object(s), {} instance(s), {} userdata",
            header.version,
            section_start,
            header.object_count,
            header.instance_count,
            header.userdata_count
        );

        let mut object_table = Vec::with_capacity(header.object_count as usize);
        for _ in 0..header.object_count {
            object_table.push(cursor.read_i32()?);
        }

        cursor.seek(section_start + header.instance_offset)?;
        let mut instance_infos = Vec::with_capacity(header.instance_count as usize);
        for _ in 0..header.instance_count {
            let info = RszInstanceInfo {
                type_id: cursor.read_u32()?,
                crc: cursor.read_u32()?,
            };
            if header.version < 4 {
                cursor.skip_padding(8)?;
            }
            instance_infos.push(info);
        }
        let after_instances = cursor.tell();

        let mut stream = Self {
            header,
            object_table,
            userdata: UserDataBlock::Absent,
            graph: InstanceGraph::new(),
            data_origin: 0,
        };
        stream.graph.reset(instance_infos);
        stream.classify_roots(options.gameobject_ids, options.folder_ids);

        let data_origin = if header.has_userdata() {
            cursor.seek(section_start + header.userdata_offset)?;
            let end = match options.userdata_layout {
                UserDataLayout::Standard => {
                    stream.read_standard_userdata(cursor, section_start, warnings)?
                }
                UserDataLayout::Embedded => {
                    stream.read_embedded_userdata(cursor, registry, section_start, options, warnings)?
                }
            };
            cursor.seek(end)?;
            cursor.align(16);
            cursor.tell()
        } else {
            after_instances
        };

        stream.data_origin = data_origin;
        for id in stream.userdata.instance_ids() {
            stream.graph.userdata_instances.insert(id);
        }

        if !options.skip_data {
            stream.decode_instances(cursor, registry, warnings)?;
        }

        Ok(stream)
    }

    fn classify_roots(&mut self, gameobject_ids: &[i32], folder_ids: &[i32]) {
        for id in gameobject_ids {
            if let Some(instance) = self.object_table.get(*id as usize) {
                self.graph.gameobject_instances.insert(*instance as u32);
            }
        }
        for id in folder_ids {
            if let Some(instance) = self.object_table.get(*id as usize) {
                self.graph.folder_instances.insert(*instance as u32);
            }
        }
    }

    fn read_standard_userdata(
        &mut self,
        cursor: &mut BinaryCursor,
        section_start: u64,
        warnings: &mut Vec<Warning>,
    ) -> Result<u64> {
        let mut entries = Vec::with_capacity(self.header.userdata_count as usize);
        let mut strings_end = 0u64;
        for _ in 0..self.header.userdata_count {
            let mut entry = RszUserDataInfo {
                instance_id: cursor.read_u32()?,
                hash: cursor.read_u32()?,
                string_offset: cursor.read_u64()?,
                path: String::new(),
            };
            if entry.string_offset != 0 {
                let absolute = section_start + entry.string_offset;
                if absolute as usize >= cursor.len() {
                    warnings.push(Warning::InvalidStringOffset { offset: absolute });
                }
                let (path, string_end) = cursor.read_wstring_at(absolute);
                entry.path = path;
                // entries may share a string, so the block ends at the
                // furthest string, not the last entry's
                strings_end = strings_end.max(string_end);
            }
            log::trace!(
                "userdata instance {} -> {:?}",
                entry.instance_id,
                entry.path
            );
            entries.push(entry);
        }

        let end = cursor.tell().max(strings_end);
        self.userdata = UserDataBlock::Standard(entries);
        Ok(end)
    }

    fn read_embedded_userdata(
        &mut self,
        cursor: &mut BinaryCursor,
        registry: &TypeRegistry,
        section_start: u64,
        options: &StreamReadOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<u64> {
        let mut entries = Vec::with_capacity(self.header.userdata_count as usize);
        for _ in 0..self.header.userdata_count {
            entries.push(EmbeddedUserDataInfo {
                instance_id: cursor.read_u32()?,
                type_id: cursor.read_u32()?,
                hash: cursor.read_u32()?,
                data_size: cursor.read_u32()?,
                rsz_offset: cursor.read_u64()?,
                stream: None,
                raw: Vec::new(),
            });
        }

        let mut end = cursor.tell();
        for entry in entries.iter_mut() {
            let blob_start = section_start + entry.rsz_offset;
            entry.raw = cursor.at(blob_start, |c| c.read_bytes(entry.data_size as usize))?;
            end = end.max(blob_start + u64::from(entry.data_size));

            let nested_options = StreamReadOptions {
                userdata_layout: UserDataLayout::Standard,
                gameobject_ids: &[],
                folder_ids: &[],
                skip_data: options.skip_data,
            };
            match Self::read(cursor, registry, blob_start, &nested_options, warnings) {
                Ok(nested) => entry.stream = Some(Box::new(nested)),
                Err(e) => {
                    log::warn!(
                        "embedded stream of userdata instance {} kept as raw bytes: {}",
                        entry.instance_id,
                        e
                    );
                }
            }
        }

        self.userdata = UserDataBlock::Embedded(entries);
        Ok(end)
    }

    fn decode_instances(
        &mut self,
        cursor: &mut BinaryCursor,
        registry: &TypeRegistry,
        warnings: &mut Vec<Warning>,
    ) -> Result<()> {
        cursor.seek(self.data_origin)?;
        let codec = ObjectStreamCodec::new(registry);
        let userdata_paths = self.userdata.paths_by_instance();

        for index in 1..self.graph.len() as u32 {
            let info = self.graph.instance_infos[index as usize];
            if info.type_id == 0 || self.graph.userdata_instances.contains(&index) {
                continue;
            }

            let Some(type_info) = registry.get(info.type_id) else {
                warnings.push(Warning::UnknownType {
                    type_id: info.type_id,
                    instance: index,
                });
                continue;
            };
            if type_info.fields.is_empty() {
                continue;
            }

            let mut ctx = DecodeContext {
                index,
                graph: &mut self.graph,
                userdata_paths: &userdata_paths,
            };
            let map = codec.decode_instance(cursor, &type_info.fields, &mut ctx)?;
            self.graph.fields[index as usize] = map;
        }

        Ok(())
    }

    /// Serializes the stream at the cursor's current position and
    /// returns the stream's start offset. Offsets in the emitted header
    /// are patched after the dependent blocks land.
    pub fn write(
        &self,
        cursor: &mut BinaryCursor,
        registry: &TypeRegistry,
        align_instance_table: bool,
        sort_userdata: bool,
    ) -> Result<u64> {
        let rsz_start = cursor.tell();

        let mut header = self.header;
        header.object_count = u32::try_from(self.object_table.len())?;
        header.instance_count = u32::try_from(self.graph.len())?;
        header.userdata_count = u32::try_from(self.userdata.len())?;
        header.instance_offset = 0;
        header.data_offset = 0;
        header.userdata_offset = 0;
        header.write(cursor);

        for id in &self.object_table {
            cursor.write_i32(*id);
        }

        if align_instance_table {
            cursor.align_write(16);
        }
        let instance_offset = cursor.tell() - rsz_start;
        for info in &self.graph.instance_infos {
            cursor.write_u32(info.type_id);
            cursor.write_u32(info.crc);
            if header.version < 4 {
                cursor.write_bytes(&[0u8; 8]);
            }
        }

        let mut userdata_offset = 0;
        if header.has_userdata() {
            cursor.align_write(16);
            userdata_offset = cursor.tell() - rsz_start;
            match &self.userdata {
                UserDataBlock::Absent => {}
                UserDataBlock::Standard(entries) => {
                    self.write_standard_userdata(cursor, rsz_start, entries, sort_userdata)?;
                }
                UserDataBlock::Embedded(entries) => {
                    self.write_embedded_userdata(cursor, registry, rsz_start, entries)?;
                }
            }
            cursor.align_write(16);
        }

        // pre-v4 streams start the payload right after the instance
        // table, wherever that lands
        let data_offset = cursor.tell() - rsz_start;
        self.write_instance_data(cursor, registry)?;

        let end = cursor.tell();
        header.instance_offset = instance_offset;
        header.data_offset = data_offset;
        header.userdata_offset = userdata_offset;
        cursor.seek(rsz_start)?;
        header.write(cursor);
        cursor.seek(end)?;

        Ok(rsz_start)
    }

    fn write_standard_userdata(
        &self,
        cursor: &mut BinaryCursor,
        rsz_start: u64,
        entries: &[RszUserDataInfo],
        sort_userdata: bool,
    ) -> Result<()> {
        let mut order: Vec<&RszUserDataInfo> = entries.iter().collect();
        if sort_userdata {
            order.sort_by_key(|entry| entry.instance_id);
        }

        for entry in &order {
            cursor.write_u32(entry.instance_id);
            cursor.write_u32(entry.hash);
            cursor.queue_string(&entry.path);
        }
        cursor.flush_string_table(rsz_start)
    }

    fn write_embedded_userdata(
        &self,
        cursor: &mut BinaryCursor,
        registry: &TypeRegistry,
        rsz_start: u64,
        entries: &[EmbeddedUserDataInfo],
    ) -> Result<()> {
        let mut slots = Vec::with_capacity(entries.len());
        for entry in entries {
            cursor.write_u32(entry.instance_id);
            cursor.write_u32(entry.type_id);
            cursor.write_u32(entry.hash);
            slots.push(cursor.tell());
            cursor.write_u32(0);
            cursor.write_u64(0);
        }

        for (slot, entry) in slots.iter().zip(entries.iter()) {
            cursor.align_write(16);
            let blob_start = cursor.tell();
            match &entry.stream {
                Some(stream) => {
                    stream.write(cursor, registry, false, false)?;
                }
                None => cursor.write_bytes(&entry.raw),
            }
            let blob_size = u32::try_from(cursor.tell() - blob_start)?;
            cursor.write_u32_at(*slot, blob_size)?;
            cursor.write_u64_at(*slot + 4, blob_start - rsz_start)?;
        }

        Ok(())
    }

    fn write_instance_data(&self, cursor: &mut BinaryCursor, registry: &TypeRegistry) -> Result<()> {
        let codec = ObjectStreamCodec::new(registry);

        for index in 1..self.graph.len() as u32 {
            if self.graph.userdata_instances.contains(&index) {
                continue;
            }
            let info = self.graph.instance_infos[index as usize];
            let Some(type_info) = registry.get(info.type_id) else {
                continue;
            };
            codec.encode_instance(
                cursor,
                &type_info.fields,
                &self.graph.fields[index as usize],
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    fn registry() -> TypeRegistry {
        TypeRegistry::from_json_str(
            r#"{
                "10": {"crc": 3, "name": "app.Holder", "fields": [
                    {"name": "child", "type": "Object", "size": 4, "align": 4}
                ]},
                "11": {"crc": 4, "name": "app.Leaf", "fields": [
                    {"name": "v", "type": "U32", "size": 4, "align": 4}
                ]}
            }"#,
        )
        .unwrap()
    }

    /// A stream with a null sentinel, a leaf and a holder whose first
    /// field references the leaf.
    fn sample_stream_bytes() -> Vec<u8> {
        let mut cursor = BinaryCursor::new(Vec::new());
        let header = RszHeader {
            magic: RSZ_MAGIC,
            version: 16,
            object_count: 1,
            instance_count: 3,
            userdata_count: 0,
            reserved: 0,
            instance_offset: 52,
            data_offset: 80,
            userdata_offset: 80,
        };
        header.write(&mut cursor);
        cursor.write_i32(2); // object table: the holder is the root

        // instance infos
        cursor.write_u32(0);
        cursor.write_u32(0);
        cursor.write_u32(0x11);
        cursor.write_u32(4);
        cursor.write_u32(0x10);
        cursor.write_u32(3);
        cursor.align_write(16);

        // leaf payload, then holder payload referencing instance 1
        cursor.write_u32(7);
        cursor.write_u32(1);
        cursor.into_inner()
    }

    #[test]
    fn test_backward_reference_builds_hierarchy() {
        let registry = registry();
        let bytes = sample_stream_bytes();
        let mut cursor = BinaryCursor::new(bytes);
        let mut warnings = Vec::new();

        let options = StreamReadOptions {
            userdata_layout: UserDataLayout::Standard,
            gameobject_ids: &[],
            folder_ids: &[],
            skip_data: false,
        };
        let stream =
            ObjectStream::read(&mut cursor, &registry, 0, &options, &mut warnings).unwrap();

        assert!(warnings.is_empty());
        assert_eq!(stream.graph.len(), 3);
        assert_eq!(
            stream.graph.fields[2].get("child"),
            Some(&FieldValue::Object(1))
        );
        assert_eq!(stream.graph.hierarchy[2].parent, Some(1));
        assert_eq!(stream.graph.hierarchy[1].children, vec![2]);
    }

    #[test]
    fn test_stream_round_trip_is_byte_exact() {
        let registry = registry();
        let bytes = sample_stream_bytes();
        let mut cursor = BinaryCursor::new(bytes.clone());
        let mut warnings = Vec::new();

        let options = StreamReadOptions {
            userdata_layout: UserDataLayout::Standard,
            gameobject_ids: &[],
            folder_ids: &[],
            skip_data: false,
        };
        let stream =
            ObjectStream::read(&mut cursor, &registry, 0, &options, &mut warnings).unwrap();

        let mut out = BinaryCursor::new(Vec::new());
        stream.write(&mut out, &registry, false, false).unwrap();
        assert_eq!(out.into_inner(), bytes);
    }

    #[test]
    fn test_unknown_type_instances_are_carried_forward() {
        let registry = registry();
        let mut bytes = sample_stream_bytes();
        // point the leaf at a type id the registry does not know
        bytes[52 + 8] = 0x99;

        let mut cursor = BinaryCursor::new(bytes);
        let mut warnings = Vec::new();
        let options = StreamReadOptions {
            userdata_layout: UserDataLayout::Standard,
            gameobject_ids: &[],
            folder_ids: &[],
            skip_data: false,
        };
        let stream =
            ObjectStream::read(&mut cursor, &registry, 0, &options, &mut warnings).unwrap();

        assert_eq!(
            warnings,
            vec![crate::error::Warning::UnknownType {
                type_id: 0x99,
                instance: 1,
            }]
        );
        assert!(stream.graph.fields[1].is_empty());
        assert_eq!(stream.graph.instance_infos[1].type_id, 0x99);
    }

    /// Pre-v4 streams store 16-byte instance entries, no userdata table,
    /// and start the payload unaligned right after the instance table.
    /// Alignment inside the payload still follows the absolute file
    /// position.
    #[test]
    fn test_v3_stream_payload_alignment() {
        let registry = TypeRegistry::from_json_str(
            r#"{
                "20": {"crc": 5, "name": "app.Pair", "fields": [
                    {"name": "a", "type": "F32", "size": 4, "align": 4},
                    {"name": "b", "type": "F64", "size": 8, "align": 8}
                ]}
            }"#,
        )
        .unwrap();

        let mut cursor = BinaryCursor::new(Vec::new());
        let header = RszHeader {
            magic: RSZ_MAGIC,
            version: 3,
            object_count: 2,
            instance_count: 2,
            userdata_count: 0,
            reserved: 0,
            instance_offset: 40,
            data_offset: 72,
            userdata_offset: 0,
        };
        header.write(&mut cursor);
        assert_eq!(cursor.tell(), 32);
        cursor.write_i32(1);
        cursor.write_i32(1);

        // 16-byte entries: type id, crc, 8 bytes of padding
        cursor.write_u32(0);
        cursor.write_u32(0);
        cursor.write_bytes(&[0u8; 8]);
        cursor.write_u32(0x20);
        cursor.write_u32(5);
        cursor.write_bytes(&[0u8; 8]);
        assert_eq!(cursor.tell(), 72);

        // payload at absolute 72: f32, then 4 pad bytes so the double
        // sits at absolute 80
        cursor.write_f32(1.5);
        cursor.write_bytes(&[0u8; 4]);
        cursor.write_f64(2.5);
        let bytes = cursor.into_inner();

        let mut read_cursor = BinaryCursor::new(bytes.clone());
        let mut warnings = Vec::new();
        let options = StreamReadOptions {
            userdata_layout: UserDataLayout::Standard,
            gameobject_ids: &[],
            folder_ids: &[],
            skip_data: false,
        };
        let stream =
            ObjectStream::read(&mut read_cursor, &registry, 0, &options, &mut warnings).unwrap();

        assert_eq!(stream.data_origin, 72);
        assert_eq!(stream.alignment_base(), 8);
        assert_eq!(
            stream.graph.fields[1].get("b"),
            Some(&FieldValue::F64(2.5))
        );

        let mut out = BinaryCursor::new(Vec::new());
        stream.write(&mut out, &registry, false, false).unwrap();
        assert_eq!(out.into_inner(), bytes);
    }

    #[test]
    fn test_userdata_strings_share_heap_storage() {
        let registry = registry();

        let mut stream = ObjectStream::new();
        stream.object_table = vec![1];
        stream.graph.reset(vec![
            RszInstanceInfo::default(),
            RszInstanceInfo {
                type_id: 0x11,
                crc: 4,
            },
            RszInstanceInfo {
                type_id: 0x11,
                crc: 4,
            },
        ]);
        stream.graph.userdata_instances.insert(1);
        stream.graph.userdata_instances.insert(2);
        stream.userdata = UserDataBlock::Standard(vec![
            RszUserDataInfo {
                instance_id: 1,
                hash: 7,
                string_offset: 0,
                path: "shared.user".to_owned(),
            },
            RszUserDataInfo {
                instance_id: 2,
                hash: 8,
                string_offset: 0,
                path: "shared.user".to_owned(),
            },
        ]);

        let mut out = BinaryCursor::new(Vec::new());
        stream.write(&mut out, &registry, false, false).unwrap();
        let bytes = out.into_inner();

        // both entry slots point at the one emitted copy
        let mut cursor = BinaryCursor::new(bytes.clone());
        cursor.seek(88).unwrap();
        let first = cursor.read_u64().unwrap();
        cursor.seek(104).unwrap();
        let second = cursor.read_u64().unwrap();
        assert_eq!(first, second);

        let mut warnings = Vec::new();
        let options = StreamReadOptions {
            userdata_layout: UserDataLayout::Standard,
            gameobject_ids: &[],
            folder_ids: &[],
            skip_data: false,
        };
        let parsed =
            ObjectStream::read(&mut cursor, &registry, 0, &options, &mut warnings).unwrap();
        let UserDataBlock::Standard(entries) = &parsed.userdata else {
            panic!("expected standard userdata");
        };
        assert_eq!(entries[0].path, "shared.user");
        assert_eq!(entries[1].path, "shared.user");
        assert_eq!(parsed.data_origin, 144);

        let mut out = BinaryCursor::new(Vec::new());
        parsed.write(&mut out, &registry, false, false).unwrap();
        assert_eq!(out.into_inner(), bytes);
    }

    #[test]
    fn test_skip_data_leaves_fields_undecoded() {
        let registry = registry();
        let bytes = sample_stream_bytes();
        let mut cursor = BinaryCursor::new(bytes);
        let mut warnings = Vec::new();

        let options = StreamReadOptions {
            userdata_layout: UserDataLayout::Standard,
            gameobject_ids: &[],
            folder_ids: &[],
            skip_data: true,
        };
        let stream =
            ObjectStream::read(&mut cursor, &registry, 0, &options, &mut warnings).unwrap();

        assert_eq!(stream.graph.len(), 3);
        assert!(stream.graph.fields.iter().all(|map| map.is_empty()));
    }
}
