use super::{
    resolve_heap_string, FolderInfo, Format, PrefabInfo, ResourceInfo, StringHeapPlanner,
    UserDataInfo, SCN_MAGIC,
};
use crate::cursor::BinaryCursor;
use crate::error::{Result, Warning};
use crate::harvest::ResourceHarvester;
use crate::macros::impl_default;
use crate::registry::TypeRegistry;
use crate::rsz::{ObjectStream, StreamReadOptions, UserDataLayout};

/// Scene header. The modern revision stores five table offsets in 64
/// bytes; the `.18`/`.19` revisions drop the userdata table and store 56,
/// with `.18` swapping the order of `userdata_count` and `prefab_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScnHeader {
    pub signature: [u8; 4],
    pub info_count: u32,
    pub resource_count: u32,
    pub folder_count: u32,
    pub prefab_count: u32,
    pub userdata_count: u32,
    pub folder_tbl: u64,
    pub resource_info_tbl: u64,
    pub prefab_info_tbl: u64,
    pub userdata_info_tbl: u64,
    pub data_offset: u64,
}

impl ScnHeader {
    pub fn new() -> Self {
        Self {
            signature: SCN_MAGIC,
            info_count: 0,
            resource_count: 0,
            folder_count: 0,
            prefab_count: 0,
            userdata_count: 0,
            folder_tbl: 0,
            resource_info_tbl: 0,
            prefab_info_tbl: 0,
            userdata_info_tbl: 0,
            data_offset: 0,
        }
    }

    pub fn size(format: Format) -> u64 {
        match format {
            Format::Scene => 64,
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
        header.folder_count = cursor.read_u32()?;
        match format {
            Format::Scene18 => {
                header.userdata_count = cursor.read_u32()?;
                header.prefab_count = cursor.read_u32()?;
            }
            _ => {
                header.prefab_count = cursor.read_u32()?;
                header.userdata_count = cursor.read_u32()?;
            }
        }

        header.folder_tbl = cursor.read_u64()?;
        header.resource_info_tbl = cursor.read_u64()?;
        header.prefab_info_tbl = cursor.read_u64()?;
        if format == Format::Scene {
            header.userdata_info_tbl = cursor.read_u64()?;
        }
        header.data_offset = cursor.read_u64()?;

        Ok(header)
    }

    pub fn write(&self, cursor: &mut BinaryCursor, format: Format) {
        cursor.write_bytes(&self.signature);
        cursor.write_u32(self.info_count);
        cursor.write_u32(self.resource_count);
        cursor.write_u32(self.folder_count);
        match format {
            Format::Scene18 => {
                cursor.write_u32(self.userdata_count);
                cursor.write_u32(self.prefab_count);
            }
            _ => {
                cursor.write_u32(self.prefab_count);
                cursor.write_u32(self.userdata_count);
            }
        }
        cursor.write_u64(self.folder_tbl);
        cursor.write_u64(self.resource_info_tbl);
        cursor.write_u64(self.prefab_info_tbl);
        if format == Format::Scene {
            cursor.write_u64(self.userdata_info_tbl);
        }
        cursor.write_u64(self.data_offset);
    }
}

impl_default!(ScnHeader);

/// A 32-byte gameobject record. The legacy revisions store the trailing
/// `prefab_id`/`ukn` pair in swapped widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScnGameObject {
    pub guid: [u8; 16],
    pub id: i32,
    pub parent_id: i32,
    pub component_count: u16,
    pub ukn: i32,
    pub prefab_id: i32,
}

impl ScnGameObject {
    pub fn new() -> Self {
        Self {
            guid: [0u8; 16],
            id: 0,
            parent_id: 0,
            component_count: 0,
            ukn: 0,
            prefab_id: 0,
        }
    }

    pub fn read(cursor: &mut BinaryCursor, legacy: bool) -> Result<Self> {
        let mut go = Self::new();
        go.guid = cursor.read_guid()?;
        go.id = cursor.read_i32()?;
        go.parent_id = cursor.read_i32()?;
        go.component_count = cursor.read_u16()?;
        if legacy {
            go.prefab_id = i32::from(cursor.read_i16()?);
            go.ukn = cursor.read_i32()?;
        } else {
            go.ukn = i32::from(cursor.read_i16()?);
            go.prefab_id = cursor.read_i32()?;
        }
        Ok(go)
    }

    pub fn write(&self, cursor: &mut BinaryCursor, legacy: bool) {
        cursor.write_guid(&self.guid);
        cursor.write_i32(self.id);
        cursor.write_i32(self.parent_id);
        cursor.write_u16(self.component_count);
        if legacy {
            cursor.write_i16(self.prefab_id as i16);
            cursor.write_i32(self.ukn);
        } else {
            cursor.write_i16(self.ukn as i16);
            cursor.write_i32(self.prefab_id);
        }
    }
}

impl_default!(ScnGameObject);

/// A parsed scene container.
#[derive(Debug)]
pub struct SceneFile {
    pub format: Format,
    pub header: ScnHeader,
    pub gameobjects: Vec<ScnGameObject>,
    pub folder_infos: Vec<FolderInfo>,
    pub resource_infos: Vec<ResourceInfo>,
    pub prefab_infos: Vec<PrefabInfo>,
    pub userdata_infos: Vec<UserDataInfo>,
    pub stream: ObjectStream,
    pub warnings: Vec<Warning>,
    pub auto_resource_management: bool,
}

impl SceneFile {
    fn legacy(&self) -> bool {
        self.format != Format::Scene
    }

    pub fn read(
        data: Vec<u8>,
        format: Format,
        registry: &TypeRegistry,
        skip_data: bool,
    ) -> Result<Self> {
        let mut cursor = BinaryCursor::new(data);
        let mut warnings = Vec::new();

        let header = ScnHeader::read(&mut cursor, format)?;
        log::debug!(
            "scene header: {} gameobject(s), {} folder(s), {} resource(s), {} prefab(s), {} userdata",
            header.info_count,
            header.resource_count,
            header.folder_count,
            header.prefab_count,
            header.userdata_count
        );

        let legacy = format != Format::Scene;
        let mut gameobjects = Vec::with_capacity(header.info_count as usize);
        for _ in 0..header.info_count {
            gameobjects.push(ScnGameObject::read(&mut cursor, legacy)?);
        }

        let mut folder_infos = Vec::with_capacity(header.folder_count as usize);
        for _ in 0..header.folder_count {
            folder_infos.push(FolderInfo::read(&mut cursor)?);
        }
        if format == Format::Scene18 {
            cursor.skip(16);
        } else {
            cursor.align(16);
        }

        let resource_infos = match format {
            Format::Scene18 => {
                // inline strings directly after the folder table
                let mut infos = Vec::with_capacity(header.resource_count as usize);
                for _ in 0..header.resource_count {
                    let path = cursor.read_wstring()?;
                    infos.push(ResourceInfo {
                        string_offset: 0,
                        reserved: 0,
                        path,
                    });
                }
                infos
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
                infos
            }
        };

        cursor.seek(header.prefab_info_tbl)?;
        let mut prefab_infos = Vec::with_capacity(header.prefab_count as usize);
        for _ in 0..header.prefab_count {
            prefab_infos.push(PrefabInfo::read(&mut cursor)?);
        }
        for info in prefab_infos.iter_mut() {
            info.path =
                resolve_heap_string(&mut cursor, u64::from(info.string_offset), &mut warnings);
        }

        let mut userdata_infos = Vec::new();
        if format == Format::Scene {
            cursor.seek(header.userdata_info_tbl)?;
            for _ in 0..header.userdata_count {
                userdata_infos.push(UserDataInfo::read(&mut cursor)?);
            }
            for info in userdata_infos.iter_mut() {
                info.path = resolve_heap_string(&mut cursor, info.string_offset, &mut warnings);
            }
        }

        let gameobject_ids: Vec<i32> = gameobjects.iter().map(|go| go.id).collect();
        let folder_ids: Vec<i32> = folder_infos.iter().map(|fi| fi.id).collect();
        let options = StreamReadOptions {
            userdata_layout: if legacy {
                UserDataLayout::Embedded
            } else {
                UserDataLayout::Standard
            },
            gameobject_ids: &gameobject_ids,
            folder_ids: &folder_ids,
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
            folder_infos,
            resource_infos,
            prefab_infos,
            userdata_infos,
            stream,
            warnings,
            auto_resource_management: false,
        })
    }

    /// Regenerates the resource table from decoded fields.
    pub fn rebuild_resources(&mut self, registry: &TypeRegistry) {
        let paths = ResourceHarvester::new(registry).harvest(&self.stream);
        self.resource_infos = paths
            .into_iter()
            .map(|path| ResourceInfo {
                string_offset: 0,
                reserved: 0,
                path,
            })
            .collect();
    }

    pub fn build(&mut self, registry: &TypeRegistry, special_align: bool) -> Result<Vec<u8>> {
        if self.auto_resource_management {
            self.rebuild_resources(registry);
        }

        self.header.info_count = u32::try_from(self.gameobjects.len())?;
        self.header.folder_count = u32::try_from(self.folder_infos.len())?;
        self.header.resource_count = u32::try_from(self.resource_infos.len())?;
        self.header.prefab_count = u32::try_from(self.prefab_infos.len())?;
        self.header.userdata_count = if self.format == Format::Scene {
            u32::try_from(self.userdata_infos.len())?
        } else {
            0
        };

        match self.format {
            Format::Scene18 => self.build_scene18(registry, special_align),
            _ => self.build_standard(registry, special_align),
        }
    }

    fn build_standard(&mut self, registry: &TypeRegistry, special_align: bool) -> Result<Vec<u8>> {
        let format = self.format;
        let mut out = BinaryCursor::new(Vec::new());
        self.header.write(&mut out, format);

        let legacy = self.legacy();
        for go in &self.gameobjects {
            go.write(&mut out, legacy);
        }

        out.align_write(16);
        let folder_tbl = out.tell();
        for fi in &self.folder_infos {
            fi.write(&mut out);
        }

        out.align_write(16);
        let resource_info_tbl = out.tell();

        // plan heap offsets before any table lands
        let mut heap_start = align_up(
            resource_info_tbl + 8 * self.resource_infos.len() as u64,
            16,
        );
        heap_start = align_up(heap_start + 8 * self.prefab_infos.len() as u64, 16);
        heap_start += 16 * self.userdata_infos.len() as u64;
        let mut planner = StringHeapPlanner::new(heap_start);

        for info in self.resource_infos.iter_mut() {
            info.string_offset = u32::try_from(planner.assign(&info.path))?;
        }
        for info in self.prefab_infos.iter_mut() {
            info.string_offset = u32::try_from(planner.assign(&info.path))?;
        }
        for info in self.userdata_infos.iter_mut() {
            info.string_offset = planner.assign(&info.path);
        }

        for info in &self.resource_infos {
            out.write_u32(info.string_offset);
            out.write_u32(info.reserved);
        }

        out.align_write(16);
        let prefab_info_tbl = out.tell();
        for info in &self.prefab_infos {
            out.write_u32(info.string_offset);
            out.write_u32(info.parent_id);
        }

        let mut userdata_info_tbl = 0;
        if format == Format::Scene {
            out.align_write(16);
            userdata_info_tbl = out.tell();
            for info in &self.userdata_infos {
                out.write_u32(info.hash);
                out.write_u32(info.crc);
                out.write_u64(info.string_offset);
            }
        }

        planner.write_heap(&mut out);

        if special_align {
            out.align_write(16);
        }
        let rsz_start = self
            .stream
            .write(&mut out, registry, special_align, format == Format::Scene)?;

        self.header.folder_tbl = folder_tbl;
        self.header.resource_info_tbl = resource_info_tbl;
        self.header.prefab_info_tbl = prefab_info_tbl;
        self.header.userdata_info_tbl = userdata_info_tbl;
        self.header.data_offset = rsz_start;
        out.seek(0)?;
        self.header.write(&mut out, format);

        Ok(out.into_inner())
    }

    fn build_scene18(&mut self, registry: &TypeRegistry, special_align: bool) -> Result<Vec<u8>> {
        let mut out = BinaryCursor::new(Vec::new());
        self.header.write(&mut out, Format::Scene18);

        for go in &self.gameobjects {
            go.write(&mut out, true);
        }

        let folder_tbl = out.tell();
        for fi in &self.folder_infos {
            fi.write(&mut out);
        }
        out.write_bytes(&[0u8; 16]);

        let resource_info_tbl = out.tell();
        for info in &self.resource_infos {
            out.write_wstring(&info.path);
        }

        let prefab_info_tbl = out.tell();
        let mut planner =
            StringHeapPlanner::new(prefab_info_tbl + 8 * self.prefab_infos.len() as u64);
        for info in self.prefab_infos.iter_mut() {
            info.string_offset = u32::try_from(planner.assign(&info.path))?;
        }
        for info in &self.prefab_infos {
            out.write_u32(info.string_offset);
            out.write_u32(info.parent_id);
        }
        planner.write_heap(&mut out);

        if special_align {
            out.align_write(16);
        }
        let rsz_start = self.stream.write(&mut out, registry, false, false)?;

        self.header.folder_tbl = folder_tbl;
        self.header.resource_info_tbl = resource_info_tbl;
        self.header.prefab_info_tbl = prefab_info_tbl;
        self.header.userdata_info_tbl = 0;
        self.header.data_offset = rsz_start;
        out.seek(0)?;
        self.header.write(&mut out, Format::Scene18);

        Ok(out.into_inner())
    }
}

pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    let rem = value % alignment;
    if rem == 0 { value } else { value + alignment - rem }
}
