mod manager;
mod patcher;

pub use self::manager::*;
pub use self::patcher::*;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Field type tags understood by the object-stream codec.
///
/// The registry stores these as strings; anything unrecognized decodes as
/// an uninterpreted byte window of the field's declared size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    S8,
    U8,
    S16,
    U16,
    S32,
    U32,
    S64,
    U64,
    F32,
    F64,
    Vec2,
    Vec3,
    Vec3Color,
    Vec4,
    Float2,
    Float3,
    Float4,
    Position,
    Quaternion,
    Color,
    Mat4,
    Obb,
    Aabb,
    Capsule,
    Sphere,
    Cylinder,
    Cone,
    LineSegment,
    Point,
    Size,
    Rect,
    Area,
    Range,
    RangeI,
    Int2,
    Int3,
    Int4,
    Uint2,
    Uint3,
    String,
    Resource,
    RuntimeType,
    Guid,
    GameObjectRef,
    Object,
    UserData,
    Struct,
    Data,
    Unknown,
}

impl TypeTag {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "bool" => Self::Bool,
            "s8" => Self::S8,
            "u8" => Self::U8,
            "s16" => Self::S16,
            "u16" => Self::U16,
            "s32" => Self::S32,
            "u32" => Self::U32,
            "s64" => Self::S64,
            "u64" => Self::U64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec3color" => Self::Vec3Color,
            "vec4" => Self::Vec4,
            "float2" => Self::Float2,
            "float3" => Self::Float3,
            "float4" => Self::Float4,
            "position" => Self::Position,
            "quaternion" => Self::Quaternion,
            "color" => Self::Color,
            "mat4" => Self::Mat4,
            "obb" => Self::Obb,
            "aabb" => Self::Aabb,
            "capsule" => Self::Capsule,
            "sphere" => Self::Sphere,
            "cylinder" => Self::Cylinder,
            "cone" => Self::Cone,
            "linesegment" => Self::LineSegment,
            "point" => Self::Point,
            "size" => Self::Size,
            "rect" => Self::Rect,
            "area" => Self::Area,
            "range" => Self::Range,
            "rangei" => Self::RangeI,
            "int2" => Self::Int2,
            "int3" => Self::Int3,
            "int4" => Self::Int4,
            "uint2" => Self::Uint2,
            "uint3" => Self::Uint3,
            "string" => Self::String,
            "resource" => Self::Resource,
            "runtimetype" => Self::RuntimeType,
            "guid" => Self::Guid,
            "gameobjectref" => Self::GameObjectRef,
            "object" => Self::Object,
            "userdata" => Self::UserData,
            "struct" => Self::Struct,
            "data" => Self::Data,
            _ => Self::Unknown,
        }
    }
}

/// One field of a registered type, in on-disk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub tag: TypeTag,
    pub size: u32,
    pub align: u32,
    pub is_array: bool,
    pub is_native: bool,
    pub original_type: String,
}

impl FieldDef {
    /// True for the polymorphic u32 slots whose runtime meaning is
    /// "object reference or plain integer". The registry marks them as a
    /// native 4-byte scalar that still names a managed `original_type`.
    pub fn is_maybe_object(&self) -> bool {
        self.is_native
            && self.size == 4
            && !self.original_type.is_empty()
            && matches!(self.tag, TypeTag::S32 | TypeTag::U32)
    }
}

/// A registered type: identity plus its ordered field layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_id: u32,
    pub crc: u32,
    pub name: String,
    pub parent: Option<String>,
    pub fields: Vec<FieldDef>,
}

/// Registry-level metadata flags carried by some dumps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub resources_identified: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RawFieldDef {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: String,
    #[serde(default = "default_field_size")]
    pub size: u32,
    #[serde(default = "default_field_align")]
    pub align: u32,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub native: bool,
    #[serde(default)]
    pub original_type: String,
}

fn default_field_size() -> u32 {
    4
}

fn default_field_align() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RawTypeInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub crc: Value,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub fields: Vec<RawFieldDef>,
}

impl RawTypeInfo {
    fn crc_value(&self) -> u32 {
        match &self.crc {
            Value::Number(n) => n.as_u64().unwrap_or(0) as u32,
            Value::String(s) => u32::from_str_radix(s.trim_start_matches("0x"), 16).unwrap_or(0),
            _ => 0,
        }
    }
}

/// Read-only lookup from type id to [`TypeInfo`], loaded from a JSON dump
/// keyed by hexadecimal type id.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<u32, TypeInfo>,
    name_index: HashMap<String, u32>,
    pub metadata: RegistryMetadata,
}

impl TypeRegistry {
    /// Loads and patches a registry dump, going through the on-disk patch
    /// cache when one is valid for the file's current mtime.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let patcher = RegistryPatcher::new(path);
        let raw = patcher.load_patched()?;
        Ok(Self::from_raw(raw))
    }

    /// Builds a registry from a JSON string, bypassing the patch cache.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut raw = parse_raw_registry(json).map_err(|reason| Error::InvalidRegistry {
            path: "<inline>".to_owned(),
            reason,
        })?;
        patch_duplicate_field_names(&mut raw);
        Ok(Self::from_raw(raw))
    }

    pub(crate) fn from_raw(raw: RawRegistry) -> Self {
        let mut types = HashMap::with_capacity(raw.types.len());
        let mut name_index = HashMap::with_capacity(raw.types.len());

        for (type_id, info) in raw.types {
            let fields = info
                .fields
                .iter()
                .map(|field| FieldDef {
                    name: field.name.clone(),
                    tag: TypeTag::from_name(&field.type_name),
                    size: field.size,
                    align: field.align.max(1),
                    is_array: field.array,
                    is_native: field.native,
                    original_type: field.original_type.clone(),
                })
                .collect();

            let type_info = TypeInfo {
                type_id,
                crc: info.crc_value(),
                name: info.name.clone(),
                parent: info.parent.clone(),
                fields,
            };

            if !type_info.name.is_empty() {
                name_index.insert(type_info.name.clone(), type_id);
            }
            types.insert(type_id, type_info);
        }

        Self {
            types,
            name_index,
            metadata: raw.metadata,
        }
    }

    pub fn get(&self, type_id: u32) -> Option<&TypeInfo> {
        self.types.get(&type_id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<(&TypeInfo, u32)> {
        let type_id = *self.name_index.get(name)?;
        self.types.get(&type_id).map(|info| (info, type_id))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Ordered list of ancestor names starting at the immediate parent.
    /// Stops on an unresolvable name or a cycle.
    pub fn parent_chain(&self, type_name: &str) -> Vec<String> {
        let mut parents = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = type_name;

        loop {
            let Some((info, _)) = self.find_by_name(current) else {
                break;
            };
            let Some(parent) = info.parent.as_deref() else {
                break;
            };
            if parent.is_empty() || !seen.insert(parent.to_owned()) {
                break;
            }
            parents.push(parent.to_owned());
            current = parent;
        }

        parents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "metadata": {"complete": true},
        "deadbeef": {
            "crc": "11223344",
            "name": "via.Transform",
            "parent": "via.Component",
            "fields": [
                {"name": "v0", "type": "Vec3", "size": 16, "align": 16},
                {"name": "v0", "type": "Vec3", "size": 16, "align": 16},
                {"name": "v0", "type": "Vec3", "size": 16, "align": 16}
            ]
        },
        "cafe0001": {
            "crc": 7,
            "name": "via.Component",
            "parent": "via.Object",
            "fields": []
        },
        "cafe0002": {
            "crc": 8,
            "name": "via.Object",
            "fields": []
        }
    }"#;

    #[test]
    fn test_lookup_by_id_and_name() {
        let registry = TypeRegistry::from_json_str(SAMPLE).unwrap();

        let info = registry.get(0xDEADBEEF).unwrap();
        assert_eq!(info.name, "via.Transform");
        assert_eq!(info.crc, 0x11223344);

        let (info, type_id) = registry.find_by_name("via.Component").unwrap();
        assert_eq!(type_id, 0xCAFE0001);
        assert_eq!(info.crc, 7);

        assert!(registry.metadata.complete);
        assert!(!registry.metadata.resources_identified);
    }

    #[test]
    fn test_parent_chain_walks_to_the_root() {
        let registry = TypeRegistry::from_json_str(SAMPLE).unwrap();
        assert_eq!(
            registry.parent_chain("via.Transform"),
            ["via.Component", "via.Object"]
        );
        assert!(registry.parent_chain("via.Object").is_empty());
        assert!(registry.parent_chain("no.such.Type").is_empty());
    }

    #[test]
    fn test_duplicate_field_names_are_patched_in_order() {
        let registry = TypeRegistry::from_json_str(SAMPLE).unwrap();
        let info = registry.get(0xDEADBEEF).unwrap();
        let names: Vec<&str> = info.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["v0", "v0_2", "v0_3"]);
    }

    #[test]
    fn test_parent_chain_stops_on_cycle() {
        let cyclic = r#"{
            "1": {"crc": 0, "name": "a", "parent": "b", "fields": []},
            "2": {"crc": 0, "name": "b", "parent": "a", "fields": []}
        }"#;
        let registry = TypeRegistry::from_json_str(cyclic).unwrap();
        assert_eq!(registry.parent_chain("a"), ["b", "a"]);
    }

    #[test]
    fn test_maybe_object_classification() {
        let field = FieldDef {
            name: "ref".to_owned(),
            tag: TypeTag::S32,
            size: 4,
            align: 4,
            is_array: false,
            is_native: true,
            original_type: "app.SomeManagedType".to_owned(),
        };
        assert!(field.is_maybe_object());

        let plain = FieldDef {
            original_type: String::new(),
            ..field.clone()
        };
        assert!(!plain.is_maybe_object());
    }
}
