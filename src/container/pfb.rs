use super::scn::align_up;
use super::{
    resolve_heap_string, Format, GameObjectRefInfo, InlineResourceInfo, ResourceInfo,
    StringHeapPlanner, UserDataInfo, PFB_MAGIC,
};
use crate::cursor::BinaryCursor;
use crate::error::{Result, Warning};
use crate::harvest::ResourceHarvester;
use crate::macros::impl_default;
use crate::registry::TypeRegistry;
use crate::rsz::{ObjectStream, StreamReadOptions, UserDataLayout};

/// Prefab header. The modern revision is 56 bytes; the `.16` revision
/// drops the userdata table and reserved word, storing 40.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PfbHeader {
    pub signature: [u8; 4],
    pub info_count: u32,
    pub resource_count: u32,
    pub gameobject_ref_info_count: u32,
    pub userdata_count: u32,
    pub reserved: u32,
    pub gameobject_ref_info_tbl: u64,
    pub resource_info_tbl: u64,
    pub userdata_info_tbl: u64,
    pub data_offset: u64,
}

impl PfbHeader {
    pub fn new() -> Self {
        Self {
            signature: PFB_MAGIC,
            info_count: 0,
            resource_count: 0,
            gameobject_ref_info_count: 0,
            userdata_count: 0,
            reserved: 0,
            gameobject_ref_info_tbl: 0,
            resource_info_tbl: 0,
            userdata_info_tbl: 0,
            data_offset: 0,
        }
    }

    pub fn size(format: Format) -> u64 {
        match format {
            Format::Prefab16 => 40,
            _ => 56,
        }
    }

    pub fn read(cursor: &mut BinaryCursor, format: Format) -> Result<Self> {
        let mut header = Self::new();
        let mut signature = [0u8; 4];
        signature.copy_from_slice(&cursor.read_bytes(4)?);
        header.signature = signature;

        header.info_count = cursor.read_u32()?;
        header.resource_count = cursor.read_u32()?;
        header.gameobject_ref_info_count = cursor.read_u32()?;
        if format != Format::Prefab16 {
            header.userdata_count = cursor.read_u32()?;
            header.reserved = cursor.read_u32()?;
        }

        header.gameobject_ref_info_tbl = cursor.read_u64()?;
        header.resource_info_tbl = cursor.read_u64()?;
        if format != Format::Prefab16 {
            header.userdata_info_tbl = cursor.read_u64()?;
        }
        header.data_offset = cursor.read_u64()?;

        Ok(header)
    }

    pub fn write(&self, cursor: &mut BinaryCursor, format: Format) {
        cursor.write_bytes(&self.signature);
        cursor.write_u32(self.info_count);
        cursor.write_u32(self.resource_count);
        cursor.write_u32(self.gameobject_ref_info_count);
        if format != Format::Prefab16 {
            cursor.write_u32(self.userdata_count);
            cursor.write_u32(self.reserved);
        }
        cursor.write_u64(self.gameobject_ref_info_tbl);
        cursor.write_u64(self.resource_info_tbl);
        if format != Format::Prefab16 {
            cursor.write_u64(self.userdata_info_tbl);
        }
        cursor.write_u64(self.data_offset);
    }
}

impl_default!(PfbHeader);

/// A 12-byte prefab gameobject record. No GUID, unlike scenes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PfbGameObject {
    pub id: i32,
    pub parent_id: i32,
    pub component_count: i32,
}

impl PfbGameObject {
    pub fn read(cursor: &mut BinaryCursor) -> Result<Self> {
        Ok(Self {
            id: cursor.read_i32()?,
            parent_id: cursor.read_i32()?,
            component_count: cursor.read_i32()?,
        })
    }

    pub fn write(&self, cursor: &mut BinaryCursor) {
        cursor.write_i32(self.id);
        cursor.write_i32(self.parent_id);
        cursor.write_i32(self.component_count);
    }
}

/// Resource storage differs between the prefab revisions: descriptors
/// into a heap, or inline terminated strings.
#[derive(Debug)]
pub enum PrefabResources {
    Table(Vec<ResourceInfo>),
    Inline(Vec<InlineResourceInfo>),
}

impl PrefabResources {
    pub fn len(&self) -> usize {
        match self {
            Self::Table(infos) => infos.len(),
            Self::Inline(infos) => infos.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::Table(infos) => infos.iter().map(|i| i.path.as_str()).collect(),
            Self::Inline(infos) => infos.iter().map(|i| i.string_value.as_str()).collect(),
        }
    }
}

/// A parsed prefab container.
#[derive(Debug)]
pub struct PrefabFile {
    pub format: Format,
    pub header: PfbHeader,
    pub gameobjects: Vec<PfbGameObject>,
    pub gameobject_ref_infos: Vec<GameObjectRefInfo>,
    pub resources: PrefabResources,
    pub userdata_infos: Vec<UserDataInfo>,
    pub stream: ObjectStream,
    pub warnings: Vec<Warning>,
    pub auto_resource_management: bool,
}

impl PrefabFile {
    pub fn read(
        data: Vec<u8>,
        format: Format,
        registry: &TypeRegistry,
        skip_data: bool,
    ) -> Result<Self> {
        let mut cursor = BinaryCursor::new(data);
        let mut warnings = Vec::new();

        let header = PfbHeader::read(&mut cursor, format)?;
        log::debug!(
            "prefab header: {} gameobject(s), {} ref info(s), {} resource(s), {} userdata",
            header.info_count,
            header.gameobject_ref_info_count,
            header.resource_count,
            header.userdata_count
        );

        let mut gameobjects = Vec::with_capacity(header.info_count as usize);
        for _ in 0..header.info_count {
            gameobjects.push(PfbGameObject::read(&mut cursor)?);
        }

        let mut gameobject_ref_infos =
            Vec::with_capacity(header.gameobject_ref_info_count as usize);
        for _ in 0..header.gameobject_ref_info_count {
            gameobject_ref_infos.push(GameObjectRefInfo::read(&mut cursor)?);
        }
        cursor.align(16);

        let resources = match format {
            Format::Prefab16 => {
                cursor.seek(header.resource_info_tbl)?;
                let mut infos = Vec::with_capacity(header.resource_count as usize);
                for _ in 0..header.resource_count {
                    infos.push(InlineResourceInfo {
                        string_value: cursor.read_wstring()?,
                    });
                }
                PrefabResources::Inline(infos)
            }
            _ => {
                cursor.seek(header.resource_info_tbl)?;
                let mut infos = Vec::with_capacity(header.resource_count as usize);
                for _ in 0..header.resource_count {
                    infos.push(ResourceInfo::read(&mut cursor)?);
                }
                for info in infos.iter_mut() {
                    info.path = resolve_heap_string(
                        &mut cursor,
                        u64::from(info.string_offset),
                        &mut warnings,
                    );
                }
                PrefabResources::Table(infos)
            }
        };

        let mut userdata_infos = Vec::new();
        if format != Format::Prefab16 {
            cursor.seek(header.userdata_info_tbl)?;
            for _ in 0..header.userdata_count {
                userdata_infos.push(UserDataInfo::read(&mut cursor)?);
            }
            for info in userdata_infos.iter_mut() {
                info.path = resolve_heap_string(&mut cursor, info.string_offset, &mut warnings);
            }
        }

        let gameobject_ids: Vec<i32> = gameobjects.iter().map(|go| go.id).collect();
        let options = StreamReadOptions {
            userdata_layout: if format == Format::Prefab16 {
                UserDataLayout::Embedded
            } else {
                UserDataLayout::Standard
            },
            gameobject_ids: &gameobject_ids,
            folder_ids: &[],
            skip_data,
        };
        let stream = ObjectStream::read(
            &mut cursor,
            registry,
            header.data_offset,
            &options,
            &mut warnings,
        )?;

        Ok(Self {
            format,
            header,
            gameobjects,
            gameobject_ref_infos,
            resources,
            userdata_infos,
            stream,
            warnings,
            auto_resource_management: false,
        })
    }

    pub fn rebuild_resources(&mut self, registry: &TypeRegistry) {
        let paths = ResourceHarvester::new(registry).harvest(&self.stream);
        self.resources = match self.format {
            Format::Prefab16 => PrefabResources::Inline(
                paths
                    .into_iter()
                    .map(|string_value| InlineResourceInfo { string_value })
                    .collect(),
            ),
            _ => PrefabResources::Table(
                paths
                    .into_iter()
                    .map(|path| ResourceInfo {
                        string_offset: 0,
                        reserved: 0,
                        path,
                    })
                    .collect(),
            ),
        };
    }

    pub fn build(&mut self, registry: &TypeRegistry, special_align: bool) -> Result<Vec<u8>> {
        if self.auto_resource_management {
            self.rebuild_resources(registry);
        }

        self.header.info_count = u32::try_from(self.gameobjects.len())?;
        self.header.resource_count = u32::try_from(self.resources.len())?;
        self.header.gameobject_ref_info_count = u32::try_from(self.gameobject_ref_infos.len())?;
        if self.format != Format::Prefab16 {
            self.header.userdata_count = u32::try_from(self.userdata_infos.len())?;
        }

        match self.format {
            Format::Prefab16 => self.build_inline(registry, special_align),
            _ => self.build_standard(registry, special_align),
        }
    }

    fn build_standard(&mut self, registry: &TypeRegistry, special_align: bool) -> Result<Vec<u8>> {
        let mut out = BinaryCursor::new(Vec::new());
        self.header.write(&mut out, self.format);

        for go in &self.gameobjects {
            go.write(&mut out);
        }

        let gameobject_ref_info_tbl = out.tell();
        for gori in &self.gameobject_ref_infos {
            gori.write(&mut out);
        }

        let PrefabResources::Table(resource_infos) = &mut self.resources else {
            unreachable!("modern prefabs always carry a resource table");
        };

        let resource_info_tbl = align_up(out.tell(), 16);
        let userdata_info_tbl = align_up(
            resource_info_tbl + 8 * resource_infos.len() as u64,
            16,
        );
        let heap_start = align_up(
            userdata_info_tbl + 16 * self.userdata_infos.len() as u64,
            16,
        );
        let mut planner = StringHeapPlanner::new(heap_start);
        for info in resource_infos.iter_mut() {
            info.string_offset = u32::try_from(planner.assign(&info.path))?;
        }
        for info in self.userdata_infos.iter_mut() {
            info.string_offset = planner.assign(&info.path);
        }

        out.align_write(16);
        for info in resource_infos.iter() {
            out.write_u32(info.string_offset);
            out.write_u32(info.reserved);
        }

        out.align_write(16);
        for info in &self.userdata_infos {
            out.write_u32(info.hash);
            out.write_u32(info.crc);
            out.write_u64(info.string_offset);
        }

        planner.write_heap(&mut out);

        if special_align {
            out.align_write(16);
        }
        let rsz_start = self.stream.write(&mut out, registry, false, false)?;

        self.header.gameobject_ref_info_tbl = gameobject_ref_info_tbl;
        self.header.resource_info_tbl = resource_info_tbl;
        self.header.userdata_info_tbl = userdata_info_tbl;
        self.header.data_offset = rsz_start;
        out.seek(0)?;
        self.header.write(&mut out, self.format);

        Ok(out.into_inner())
    }

    fn build_inline(&mut self, registry: &TypeRegistry, special_align: bool) -> Result<Vec<u8>> {
        let mut out = BinaryCursor::new(Vec::new());
        self.header.write(&mut out, Format::Prefab16);

        for go in &self.gameobjects {
            go.write(&mut out);
        }

        let gameobject_ref_info_tbl = out.tell();
        for gori in &self.gameobject_ref_infos {
            gori.write(&mut out);
        }

        let PrefabResources::Inline(resources) = &self.resources else {
            unreachable!("legacy prefabs always carry inline resources");
        };

        let resource_info_tbl = out.tell();
        for info in resources {
            out.write_wstring(info.string_value.trim_end_matches('\0'));
        }

        if special_align {
            out.align_write(16);
        }
        let rsz_start = self.stream.write(&mut out, registry, false, false)?;

        self.header.gameobject_ref_info_tbl = gameobject_ref_info_tbl;
        self.header.resource_info_tbl = resource_info_tbl;
        self.header.data_offset = rsz_start;
        out.seek(0)?;
        self.header.write(&mut out, Format::Prefab16);

        Ok(out.into_inner())
    }
}
