use super::scn::align_up;
use super::{resolve_heap_string, ResourceInfo, StringHeapPlanner, UserDataInfo, USR_MAGIC};
use crate::cursor::BinaryCursor;
use crate::error::{Result, Warning};
use crate::harvest::ResourceHarvester;
use crate::macros::impl_default;
use crate::registry::TypeRegistry;
use crate::rsz::{ObjectStream, StreamReadOptions, UserDataLayout};

/// User-root header, 48 bytes. No gameobjects or folders; the Object
/// Table addresses the root instances directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsrHeader {
    pub signature: [u8; 4],
    pub resource_count: u32,
    pub userdata_count: u32,
    pub info_count: u32,
    pub resource_info_tbl: u64,
    pub userdata_info_tbl: u64,
    pub data_offset: u64,
    pub reserved: u64,
}

impl UsrHeader {
    pub const SIZE: u64 = 48;

    pub fn new() -> Self {
        Self {
            signature: USR_MAGIC,
            resource_count: 0,
            userdata_count: 0,
            info_count: 0,
            resource_info_tbl: 0,
            userdata_info_tbl: 0,
            data_offset: 0,
            reserved: 0,
        }
    }

    pub fn read(cursor: &mut BinaryCursor) -> Result<Self> {
        let mut header = Self::new();
        let mut signature = [0u8; 4];
        signature.copy_from_slice(&cursor.read_bytes(4)?);
        header.signature = signature;

        header.resource_count = cursor.read_u32()?;
        header.userdata_count = cursor.read_u32()?;
        header.info_count = cursor.read_u32()?;
        header.resource_info_tbl = cursor.read_u64()?;
        header.userdata_info_tbl = cursor.read_u64()?;
        header.data_offset = cursor.read_u64()?;
        header.reserved = cursor.read_u64()?;

        Ok(header)
    }

    pub fn write(&self, cursor: &mut BinaryCursor) {
        cursor.write_bytes(&self.signature);
        cursor.write_u32(self.resource_count);
        cursor.write_u32(self.userdata_count);
        cursor.write_u32(self.info_count);
        cursor.write_u64(self.resource_info_tbl);
        cursor.write_u64(self.userdata_info_tbl);
        cursor.write_u64(self.data_offset);
        cursor.write_u64(self.reserved);
    }
}

impl_default!(UsrHeader);

/// A parsed user-root container.
#[derive(Debug)]
pub struct UserFile {
    pub header: UsrHeader,
    pub resource_infos: Vec<ResourceInfo>,
    pub userdata_infos: Vec<UserDataInfo>,
    pub stream: ObjectStream,
    pub warnings: Vec<Warning>,
    pub auto_resource_management: bool,
}

impl UserFile {
    pub fn read(data: Vec<u8>, registry: &TypeRegistry, skip_data: bool) -> Result<Self> {
        let mut cursor = BinaryCursor::new(data);
        let mut warnings = Vec::new();

        let header = UsrHeader::read(&mut cursor)?;
        log::debug!(
            "user-root header: {} resource(s), {} userdata, {} root object(s)",
            header.resource_count,
            header.userdata_count,
            header.info_count
        );

        cursor.seek(header.resource_info_tbl)?;
        let mut resource_infos = Vec::with_capacity(header.resource_count as usize);
        for _ in 0..header.resource_count {
            resource_infos.push(ResourceInfo::read(&mut cursor)?);
        }
        for info in resource_infos.iter_mut() {
            info.path =
                resolve_heap_string(&mut cursor, u64::from(info.string_offset), &mut warnings);
        }

        cursor.seek(header.userdata_info_tbl)?;
        let mut userdata_infos = Vec::with_capacity(header.userdata_count as usize);
        for _ in 0..header.userdata_count {
            userdata_infos.push(UserDataInfo::read(&mut cursor)?);
        }
        for info in userdata_infos.iter_mut() {
            info.path = resolve_heap_string(&mut cursor, info.string_offset, &mut warnings);
        }

        let options = StreamReadOptions {
            userdata_layout: UserDataLayout::Standard,
            gameobject_ids: &[],
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
            header,
            resource_infos,
            userdata_infos,
            stream,
            warnings,
            auto_resource_management: false,
        })
    }

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

        self.header.resource_count = u32::try_from(self.resource_infos.len())?;
        self.header.userdata_count = u32::try_from(self.userdata_infos.len())?;

        let mut out = BinaryCursor::new(Vec::new());
        self.header.write(&mut out);

        let resource_info_tbl = align_up(out.tell(), 16);
        let userdata_info_tbl = align_up(
            resource_info_tbl + 8 * self.resource_infos.len() as u64,
            16,
        );
        let heap_start = align_up(
            userdata_info_tbl + 16 * self.userdata_infos.len() as u64,
            16,
        );
        let mut planner = StringHeapPlanner::new(heap_start);
        for info in self.resource_infos.iter_mut() {
            info.string_offset = u32::try_from(planner.assign(&info.path))?;
        }
        for info in self.userdata_infos.iter_mut() {
            info.string_offset = planner.assign(&info.path);
        }

        out.align_write(16);
        for info in &self.resource_infos {
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

        self.header.resource_info_tbl = resource_info_tbl;
        self.header.userdata_info_tbl = userdata_info_tbl;
        self.header.data_offset = rsz_start;
        out.seek(0)?;
        self.header.write(&mut out);

        Ok(out.into_inner())
    }
}
