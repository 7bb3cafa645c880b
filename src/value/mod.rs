mod geometry;

pub use self::geometry::*;

use linked_hash_map::LinkedHashMap;

/// Decoded fields of one instance, keyed by registry field name in
/// on-disk order.
pub type FieldMap = LinkedHashMap<String, FieldValue>;

/// A resolved userdata slot: the instance index it points at plus the
/// path string joined from the userdata table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDataRef {
    pub index: u32,
    pub path: String,
}

/// A nested struct field: zero or more element maps laid out with the
/// field layout of `type_name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructValue {
    pub type_name: String,
    pub entries: Vec<FieldMap>,
}

/// An uninterpreted byte window. Used for unknown field tags and for the
/// scalar branch of polymorphic reference slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBytes {
    pub bytes: Vec<u8>,
    pub declared_size: u32,
}

/// Every value a decoded field can hold. Closed set; the codec
/// dispatches per variant with no dynamic typing involved.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    S8(i8),
    U8(u8),
    S16(i16),
    U16(u16),
    S32(i32),
    U32(u32),
    S64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec3Color(Vec3),
    Vec4(Vec4),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Position(Position),
    Quaternion(Vec4),
    Color(Color),
    Mat4(Mat4),
    Obb(Obb),
    Aabb(Aabb),
    Capsule(Capsule),
    Sphere(Sphere),
    Cylinder(Cylinder),
    Cone(Cone),
    LineSegment(LineSegment),
    Point(Vec2),
    Size(SizeValue),
    Rect(Rect),
    Area(Area),
    AreaOld(Area),
    Range(Range),
    RangeI(RangeI),
    Int2(Int2),
    Int3(Int3),
    Int4(Int4),
    Uint2(Uint2),
    Uint3(Uint3),
    /// UTF-16 payload kept verbatim, terminator included.
    String(String),
    Resource(String),
    /// UTF-8 payload kept verbatim, terminator included.
    RuntimeType(String),
    Guid(Guid),
    GameObjectRef(Guid),
    /// Reference to an earlier instance by index.
    Object(u32),
    UserData(UserDataRef),
    Struct(StructValue),
    Array(Vec<FieldValue>),
    RawBytes(RawBytes),
}

impl FieldValue {
    /// Variant name, used in type-mismatch diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::S8(_) => "S8",
            Self::U8(_) => "U8",
            Self::S16(_) => "S16",
            Self::U16(_) => "U16",
            Self::S32(_) => "S32",
            Self::U32(_) => "U32",
            Self::S64(_) => "S64",
            Self::U64(_) => "U64",
            Self::F32(_) => "F32",
            Self::F64(_) => "F64",
            Self::Vec2(_) => "Vec2",
            Self::Vec3(_) => "Vec3",
            Self::Vec3Color(_) => "Vec3Color",
            Self::Vec4(_) => "Vec4",
            Self::Float2(_) => "Float2",
            Self::Float3(_) => "Float3",
            Self::Float4(_) => "Float4",
            Self::Position(_) => "Position",
            Self::Quaternion(_) => "Quaternion",
            Self::Color(_) => "Color",
            Self::Mat4(_) => "Mat4",
            Self::Obb(_) => "OBB",
            Self::Aabb(_) => "AABB",
            Self::Capsule(_) => "Capsule",
            Self::Sphere(_) => "Sphere",
            Self::Cylinder(_) => "Cylinder",
            Self::Cone(_) => "Cone",
            Self::LineSegment(_) => "LineSegment",
            Self::Point(_) => "Point",
            Self::Size(_) => "Size",
            Self::Rect(_) => "Rect",
            Self::Area(_) => "Area",
            Self::AreaOld(_) => "AreaOld",
            Self::Range(_) => "Range",
            Self::RangeI(_) => "RangeI",
            Self::Int2(_) => "Int2",
            Self::Int3(_) => "Int3",
            Self::Int4(_) => "Int4",
            Self::Uint2(_) => "Uint2",
            Self::Uint3(_) => "Uint3",
            Self::String(_) => "String",
            Self::Resource(_) => "Resource",
            Self::RuntimeType(_) => "RuntimeType",
            Self::Guid(_) => "Guid",
            Self::GameObjectRef(_) => "GameObjectRef",
            Self::Object(_) => "Object",
            Self::UserData(_) => "UserData",
            Self::Struct(_) => "Struct",
            Self::Array(_) => "Array",
            Self::RawBytes(_) => "RawBytes",
        }
    }

    /// String payload with trailing NULs removed, for display and for
    /// resource harvesting. Stored values keep their terminators so a
    /// rebuild reproduces the original bytes.
    pub fn as_trimmed_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Resource(s) | Self::RuntimeType(s) => {
                Some(s.trim_end_matches('\0'))
            }
            _ => None,
        }
    }

    /// The instance index a reference-like value points at, if any.
    pub fn as_instance_index(&self) -> Option<u32> {
        match self {
            Self::Object(index) => Some(*index),
            Self::UserData(ud) => Some(ud.index),
            _ => None,
        }
    }
}
