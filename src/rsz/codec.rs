use std::collections::HashMap;

use super::InstanceGraph;
use crate::cursor::BinaryCursor;
use crate::error::{Error, Result};
use crate::registry::{FieldDef, TypeRegistry, TypeTag};
use crate::value::{
    Aabb, Area, Capsule, Color, Cone, Cylinder, FieldMap, FieldValue, Guid, Int2, Int3, Int4,
    LineSegment, Mat4, Obb, Position, Range, RangeI, RawBytes, Rect, SizeValue, Sphere,
    StructValue, Uint2, Uint3, UserDataRef, Vec2, Vec3, Vec4,
};

/// Decode-side context for one instance: who is being decoded, where
/// hierarchy edges land, and how userdata indices resolve to strings.
pub struct DecodeContext<'a> {
    pub index: u32,
    pub graph: &'a mut InstanceGraph,
    pub userdata_paths: &'a HashMap<u32, String>,
}

/// Field-sequence decoder/encoder for one instance, driven entirely by
/// the registry's field layout.
///
/// Alignment is relative to the absolute file position; the cursor's
/// `align_base` carries the data region's origin when the codec runs
/// over a carved-out buffer instead of the whole file.
pub struct ObjectStreamCodec<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> ObjectStreamCodec<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    /// Decodes one instance's field sequence. On failure the cursor is
    /// left where the error occurred and no partial map is returned.
    pub fn decode_instance(
        &self,
        cursor: &mut BinaryCursor,
        fields: &[FieldDef],
        ctx: &mut DecodeContext,
    ) -> Result<FieldMap> {
        let mut map = FieldMap::new();
        for def in fields {
            let value = self.decode_field(cursor, def, ctx)?;
            map.insert(def.name.clone(), value);
        }
        Ok(map)
    }

    /// Encodes one instance's field sequence; the reciprocal of
    /// [`Self::decode_instance`]. A value whose variant does not match
    /// the registry layout is fatal.
    pub fn encode_instance(
        &self,
        cursor: &mut BinaryCursor,
        fields: &[FieldDef],
        map: &FieldMap,
    ) -> Result<()> {
        for def in fields {
            match map.get(&def.name) {
                Some(value) => self.encode_field(cursor, def, value)?,
                None => log::warn!("field {:?} missing from parsed map, skipped", def.name),
            }
        }
        Ok(())
    }

    fn decode_field(
        &self,
        cursor: &mut BinaryCursor,
        def: &FieldDef,
        ctx: &mut DecodeContext,
    ) -> Result<FieldValue> {
        // struct fields are count-prefixed whether or not the registry
        // flags them as arrays
        if def.tag == TypeTag::Struct {
            return self.decode_struct(cursor, def, ctx);
        }

        if def.is_array {
            return self.decode_array(cursor, def, ctx);
        }

        cursor.align(u64::from(def.align));
        if def.is_maybe_object() {
            return self.decode_maybe_object(cursor, ctx);
        }
        self.decode_scalar(cursor, def, ctx)
    }

    fn decode_struct(
        &self,
        cursor: &mut BinaryCursor,
        def: &FieldDef,
        ctx: &mut DecodeContext,
    ) -> Result<FieldValue> {
        cursor.align(4);
        let count = cursor.read_u32()?;

        let mut entries = Vec::new();
        if count > 0 {
            match self.registry.find_by_name(&def.original_type) {
                Some((info, _)) => {
                    let struct_fields = info.fields.clone();
                    cursor.align(u64::from(def.align));
                    for _ in 0..count {
                        entries.push(self.decode_instance(cursor, &struct_fields, ctx)?);
                    }
                }
                None => {
                    log::warn!(
                        "struct field {:?} names unregistered type {:?}",
                        def.name,
                        def.original_type
                    );
                }
            }
        }

        Ok(FieldValue::Struct(StructValue {
            type_name: def.original_type.clone(),
            entries,
        }))
    }

    fn decode_array(
        &self,
        cursor: &mut BinaryCursor,
        def: &FieldDef,
        ctx: &mut DecodeContext,
    ) -> Result<FieldValue> {
        cursor.align(4);
        let count = cursor.read_u32()?;

        if def.is_maybe_object() {
            return self.decode_maybe_object_array(cursor, def, count, ctx);
        }

        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            cursor.align(u64::from(def.align));
            values.push(self.decode_scalar(cursor, def, ctx)?);
        }
        Ok(FieldValue::Array(values))
    }

    /// The first element decides: a valid backward reference commits the
    /// whole array to references, anything else commits it to raw bytes.
    /// Mixed arrays do not occur.
    fn decode_maybe_object_array(
        &self,
        cursor: &mut BinaryCursor,
        def: &FieldDef,
        count: u32,
        ctx: &mut DecodeContext,
    ) -> Result<FieldValue> {
        let mut values = Vec::with_capacity(count as usize);
        let mut as_references = false;

        for i in 0..count {
            cursor.align(u64::from(def.align));
            let candidate = cursor.read_u32()?;

            if i == 0 {
                as_references = ctx.graph.is_valid_reference(candidate, ctx.index);
            }

            if as_references {
                if ctx.graph.is_valid_reference(candidate, ctx.index) {
                    ctx.graph.add_edge(candidate, ctx.index);
                }
                values.push(FieldValue::Object(candidate));
            } else {
                values.push(FieldValue::RawBytes(RawBytes {
                    bytes: candidate.to_le_bytes().to_vec(),
                    declared_size: def.size,
                }));
            }
        }

        Ok(FieldValue::Array(values))
    }

    fn decode_maybe_object(
        &self,
        cursor: &mut BinaryCursor,
        ctx: &mut DecodeContext,
    ) -> Result<FieldValue> {
        let candidate = cursor.read_u32()?;
        if ctx.graph.is_valid_reference(candidate, ctx.index) {
            ctx.graph.add_edge(candidate, ctx.index);
            Ok(FieldValue::Object(candidate))
        } else {
            Ok(FieldValue::U32(candidate))
        }
    }

    fn read_vec3(&self, cursor: &mut BinaryCursor) -> Result<Vec3> {
        Ok(Vec3 {
            x: cursor.read_f32()?,
            y: cursor.read_f32()?,
            z: cursor.read_f32()?,
        })
    }

    fn read_padded_vec3(&self, cursor: &mut BinaryCursor) -> Result<Vec3> {
        let v = self.read_vec3(cursor)?;
        cursor.read_f32()?;
        Ok(v)
    }

    fn decode_scalar(
        &self,
        cursor: &mut BinaryCursor,
        def: &FieldDef,
        ctx: &mut DecodeContext,
    ) -> Result<FieldValue> {
        let value = match def.tag {
            TypeTag::Bool => FieldValue::Bool(cursor.read_bool()?),
            TypeTag::S8 => FieldValue::S8(cursor.read_i8()?),
            TypeTag::U8 => FieldValue::U8(cursor.read_u8()?),
            TypeTag::S16 => FieldValue::S16(cursor.read_i16()?),
            TypeTag::U16 => FieldValue::U16(cursor.read_u16()?),
            TypeTag::S32 => FieldValue::S32(cursor.read_i32()?),
            TypeTag::U32 => FieldValue::U32(cursor.read_u32()?),
            TypeTag::S64 => FieldValue::S64(cursor.read_i64()?),
            TypeTag::U64 => FieldValue::U64(cursor.read_u64()?),
            TypeTag::F32 => FieldValue::F32(cursor.read_f32()?),
            TypeTag::F64 => FieldValue::F64(cursor.read_f64()?),

            TypeTag::Vec2 => {
                let x = cursor.read_f32()?;
                let y = cursor.read_f32()?;
                cursor.read_f32()?;
                cursor.read_f32()?;
                FieldValue::Vec2(Vec2 { x, y })
            }
            TypeTag::Vec3 => FieldValue::Vec3(self.read_padded_vec3(cursor)?),
            TypeTag::Vec3Color => FieldValue::Vec3Color(self.read_padded_vec3(cursor)?),
            TypeTag::Vec4 => FieldValue::Vec4(self.read_vec4(cursor)?),
            TypeTag::Quaternion => FieldValue::Quaternion(self.read_vec4(cursor)?),
            TypeTag::Float2 => FieldValue::Float2(Vec2 {
                x: cursor.read_f32()?,
                y: cursor.read_f32()?,
            }),
            TypeTag::Float3 => FieldValue::Float3(self.read_vec3(cursor)?),
            TypeTag::Float4 => FieldValue::Float4(self.read_vec4(cursor)?),
            TypeTag::Position => FieldValue::Position(Position {
                x: cursor.read_f64()?,
                y: cursor.read_f64()?,
                z: cursor.read_f64()?,
            }),
            TypeTag::Int2 => FieldValue::Int2(Int2 {
                x: cursor.read_i32()?,
                y: cursor.read_i32()?,
            }),
            TypeTag::Int3 => FieldValue::Int3(Int3 {
                x: cursor.read_i32()?,
                y: cursor.read_i32()?,
                z: cursor.read_i32()?,
            }),
            TypeTag::Int4 => FieldValue::Int4(Int4 {
                x: cursor.read_i32()?,
                y: cursor.read_i32()?,
                z: cursor.read_i32()?,
                w: cursor.read_i32()?,
            }),
            TypeTag::Uint2 => FieldValue::Uint2(Uint2 {
                x: cursor.read_u32()?,
                y: cursor.read_u32()?,
            }),
            TypeTag::Uint3 => FieldValue::Uint3(Uint3 {
                x: cursor.read_u32()?,
                y: cursor.read_u32()?,
                z: cursor.read_u32()?,
            }),
            TypeTag::Point => FieldValue::Point(Vec2 {
                x: cursor.read_f32()?,
                y: cursor.read_f32()?,
            }),
            TypeTag::Size => FieldValue::Size(SizeValue {
                width: cursor.read_f32()?,
                height: cursor.read_f32()?,
            }),
            TypeTag::Range => FieldValue::Range(Range {
                min: cursor.read_f32()?,
                max: cursor.read_f32()?,
            }),
            TypeTag::RangeI => FieldValue::RangeI(RangeI {
                min: cursor.read_i32()?,
                max: cursor.read_i32()?,
            }),
            TypeTag::Color => FieldValue::Color(Color {
                r: cursor.read_u8()?,
                g: cursor.read_u8()?,
                b: cursor.read_u8()?,
                a: cursor.read_u8()?,
            }),
            TypeTag::Rect => FieldValue::Rect(Rect {
                min_x: cursor.read_f32()?,
                min_y: cursor.read_f32()?,
                max_x: cursor.read_f32()?,
                max_y: cursor.read_f32()?,
            }),
            TypeTag::Mat4 => {
                let mut values = [0f32; 16];
                for value in values.iter_mut() {
                    *value = cursor.read_f32()?;
                }
                FieldValue::Mat4(Mat4 { values })
            }
            TypeTag::Obb => {
                let mut values = [0f32; 20];
                for value in values.iter_mut() {
                    *value = cursor.read_f32()?;
                }
                FieldValue::Obb(Obb { values })
            }
            TypeTag::Aabb => FieldValue::Aabb(Aabb {
                min: self.read_padded_vec3(cursor)?,
                max: self.read_padded_vec3(cursor)?,
            }),
            TypeTag::Sphere => FieldValue::Sphere(Sphere {
                center: self.read_vec3(cursor)?,
                radius: cursor.read_f32()?,
            }),
            TypeTag::Capsule => {
                let start = self.read_padded_vec3(cursor)?;
                let end = self.read_padded_vec3(cursor)?;
                let radius = cursor.read_f32()?;
                cursor.skip_padding(12)?;
                FieldValue::Capsule(Capsule { start, end, radius })
            }
            TypeTag::Cylinder => {
                let p0 = self.read_padded_vec3(cursor)?;
                let p1 = self.read_padded_vec3(cursor)?;
                let radius = cursor.read_f32()?;
                cursor.skip_padding(12)?;
                FieldValue::Cylinder(Cylinder { p0, p1, radius })
            }
            TypeTag::Cone => {
                let apex = self.read_padded_vec3(cursor)?;
                let direction = self.read_padded_vec3(cursor)?;
                let angle = cursor.read_f32()?;
                let distance = cursor.read_f32()?;
                cursor.skip_padding(8)?;
                FieldValue::Cone(Cone {
                    apex,
                    direction,
                    angle,
                    distance,
                })
            }
            TypeTag::LineSegment => FieldValue::LineSegment(LineSegment {
                start: self.read_padded_vec3(cursor)?,
                end: self.read_padded_vec3(cursor)?,
            }),
            TypeTag::Area => {
                let legacy = def.size >= 80;
                let mut corners = [Vec2::default(); 4];
                for corner in corners.iter_mut() {
                    corner.x = cursor.read_f32()?;
                    corner.y = cursor.read_f32()?;
                    if legacy {
                        cursor.read_f32()?;
                        cursor.read_f32()?;
                    }
                }
                let height = cursor.read_f32()?;
                let bottom = cursor.read_f32()?;
                cursor.skip_padding(8)?;
                let area = Area {
                    p0: corners[0],
                    p1: corners[1],
                    p2: corners[2],
                    p3: corners[3],
                    height,
                    bottom,
                };
                if legacy {
                    FieldValue::AreaOld(area)
                } else {
                    FieldValue::Area(area)
                }
            }

            TypeTag::String => {
                cursor.align(4);
                FieldValue::String(cursor.read_prefixed_utf16()?)
            }
            TypeTag::Resource => {
                cursor.align(4);
                FieldValue::Resource(cursor.read_prefixed_utf16()?)
            }
            TypeTag::RuntimeType => {
                cursor.align(4);
                FieldValue::RuntimeType(cursor.read_prefixed_utf8()?)
            }
            TypeTag::Guid => FieldValue::Guid(Guid::new(cursor.read_guid()?)),
            TypeTag::GameObjectRef => FieldValue::GameObjectRef(Guid::new(cursor.read_guid()?)),

            TypeTag::Object => {
                let index = cursor.read_u32()?;
                if ctx.graph.is_valid_reference(index, ctx.index) {
                    ctx.graph.add_edge(index, ctx.index);
                }
                FieldValue::Object(index)
            }
            TypeTag::UserData => {
                let index = cursor.read_u32()?;
                if ctx.graph.is_valid_reference(index, ctx.index) {
                    ctx.graph.add_edge(index, ctx.index);
                }
                let path = ctx.userdata_paths.get(&index).cloned().unwrap_or_default();
                FieldValue::UserData(UserDataRef { index, path })
            }

            TypeTag::Struct => unreachable!("struct fields are handled before scalar dispatch"),
            TypeTag::Data | TypeTag::Unknown => FieldValue::RawBytes(RawBytes {
                bytes: cursor.read_bytes(def.size as usize)?,
                declared_size: def.size,
            }),
        };

        Ok(value)
    }

    fn read_vec4(&self, cursor: &mut BinaryCursor) -> Result<Vec4> {
        Ok(Vec4 {
            x: cursor.read_f32()?,
            y: cursor.read_f32()?,
            z: cursor.read_f32()?,
            w: cursor.read_f32()?,
        })
    }

    fn encode_field(
        &self,
        cursor: &mut BinaryCursor,
        def: &FieldDef,
        value: &FieldValue,
    ) -> Result<()> {
        if def.tag == TypeTag::Struct {
            return self.encode_struct(cursor, def, value);
        }

        if def.is_array {
            let FieldValue::Array(values) = value else {
                return Err(mismatch(def, "Array", value));
            };
            cursor.align_write(4);
            cursor.write_u32(u32::try_from(values.len())?);
            for element in values {
                cursor.align_write(u64::from(def.align));
                self.encode_scalar(cursor, def, element)?;
            }
            return Ok(());
        }

        cursor.align_write(u64::from(def.align));
        self.encode_scalar(cursor, def, value)
    }

    fn encode_struct(
        &self,
        cursor: &mut BinaryCursor,
        def: &FieldDef,
        value: &FieldValue,
    ) -> Result<()> {
        let FieldValue::Struct(entry) = value else {
            return Err(mismatch(def, "Struct", value));
        };

        cursor.align_write(4);
        cursor.write_u32(u32::try_from(entry.entries.len())?);
        if entry.entries.is_empty() {
            return Ok(());
        }

        let type_name = if entry.type_name.is_empty() {
            def.original_type.as_str()
        } else {
            entry.type_name.as_str()
        };
        let Some((info, _)) = self.registry.find_by_name(type_name) else {
            log::warn!(
                "struct field {:?} names unregistered type {:?}, entries dropped",
                def.name,
                type_name
            );
            return Ok(());
        };

        let struct_fields = info.fields.clone();
        cursor.align_write(u64::from(def.align));
        for map in &entry.entries {
            self.encode_instance(cursor, &struct_fields, map)?;
        }
        Ok(())
    }

    fn encode_scalar(
        &self,
        cursor: &mut BinaryCursor,
        def: &FieldDef,
        value: &FieldValue,
    ) -> Result<()> {
        if def.is_maybe_object() {
            return match value {
                FieldValue::Object(index) => {
                    cursor.write_u32(*index);
                    Ok(())
                }
                FieldValue::U32(v) => {
                    cursor.write_u32(*v);
                    Ok(())
                }
                FieldValue::RawBytes(raw) => self.write_raw(cursor, def, raw),
                other => Err(mismatch(def, "Object | U32 | RawBytes", other)),
            };
        }

        match (def.tag, value) {
            (TypeTag::Bool, FieldValue::Bool(v)) => cursor.write_bool(*v),
            (TypeTag::S8, FieldValue::S8(v)) => cursor.write_i8(*v),
            (TypeTag::U8, FieldValue::U8(v)) => cursor.write_u8(*v),
            (TypeTag::S16, FieldValue::S16(v)) => cursor.write_i16(*v),
            (TypeTag::U16, FieldValue::U16(v)) => cursor.write_u16(*v),
            (TypeTag::S32, FieldValue::S32(v)) => cursor.write_i32(*v),
            (TypeTag::U32, FieldValue::U32(v)) => cursor.write_u32(*v),
            (TypeTag::S64, FieldValue::S64(v)) => cursor.write_i64(*v),
            (TypeTag::U64, FieldValue::U64(v)) => cursor.write_u64(*v),
            (TypeTag::F32, FieldValue::F32(v)) => cursor.write_f32(*v),
            (TypeTag::F64, FieldValue::F64(v)) => cursor.write_f64(*v),

            (TypeTag::Vec2, FieldValue::Vec2(v)) => {
                cursor.write_f32(v.x);
                cursor.write_f32(v.y);
                cursor.write_f32(0.0);
                cursor.write_f32(0.0);
            }
            (TypeTag::Vec3, FieldValue::Vec3(v))
            | (TypeTag::Vec3Color, FieldValue::Vec3Color(v)) => {
                self.write_padded_vec3(cursor, v);
            }
            (TypeTag::Vec4, FieldValue::Vec4(v)) | (TypeTag::Quaternion, FieldValue::Quaternion(v)) => {
                cursor.write_f32(v.x);
                cursor.write_f32(v.y);
                cursor.write_f32(v.z);
                cursor.write_f32(v.w);
            }
            (TypeTag::Float2, FieldValue::Float2(v)) => {
                cursor.write_f32(v.x);
                cursor.write_f32(v.y);
            }
            (TypeTag::Float3, FieldValue::Float3(v)) => {
                cursor.write_f32(v.x);
                cursor.write_f32(v.y);
                cursor.write_f32(v.z);
            }
            (TypeTag::Float4, FieldValue::Float4(v)) => {
                cursor.write_f32(v.x);
                cursor.write_f32(v.y);
                cursor.write_f32(v.z);
                cursor.write_f32(v.w);
            }
            (TypeTag::Position, FieldValue::Position(v)) => {
                cursor.write_f64(v.x);
                cursor.write_f64(v.y);
                cursor.write_f64(v.z);
            }
            (TypeTag::Int2, FieldValue::Int2(v)) => {
                cursor.write_i32(v.x);
                cursor.write_i32(v.y);
            }
            (TypeTag::Int3, FieldValue::Int3(v)) => {
                cursor.write_i32(v.x);
                cursor.write_i32(v.y);
                cursor.write_i32(v.z);
            }
            (TypeTag::Int4, FieldValue::Int4(v)) => {
                cursor.write_i32(v.x);
                cursor.write_i32(v.y);
                cursor.write_i32(v.z);
                cursor.write_i32(v.w);
            }
            (TypeTag::Uint2, FieldValue::Uint2(v)) => {
                cursor.write_u32(v.x);
                cursor.write_u32(v.y);
            }
            (TypeTag::Uint3, FieldValue::Uint3(v)) => {
                cursor.write_u32(v.x);
                cursor.write_u32(v.y);
                cursor.write_u32(v.z);
            }
            (TypeTag::Point, FieldValue::Point(v)) => {
                cursor.write_f32(v.x);
                cursor.write_f32(v.y);
            }
            (TypeTag::Size, FieldValue::Size(v)) => {
                cursor.write_f32(v.width);
                cursor.write_f32(v.height);
            }
            (TypeTag::Range, FieldValue::Range(v)) => {
                cursor.write_f32(v.min);
                cursor.write_f32(v.max);
            }
            (TypeTag::RangeI, FieldValue::RangeI(v)) => {
                cursor.write_i32(v.min);
                cursor.write_i32(v.max);
            }
            (TypeTag::Color, FieldValue::Color(v)) => {
                cursor.write_u8(v.r);
                cursor.write_u8(v.g);
                cursor.write_u8(v.b);
                cursor.write_u8(v.a);
            }
            (TypeTag::Rect, FieldValue::Rect(v)) => {
                cursor.write_f32(v.min_x);
                cursor.write_f32(v.min_y);
                cursor.write_f32(v.max_x);
                cursor.write_f32(v.max_y);
            }
            (TypeTag::Mat4, FieldValue::Mat4(v)) => {
                for value in v.values {
                    cursor.write_f32(value);
                }
            }
            (TypeTag::Obb, FieldValue::Obb(v)) => {
                for value in v.values {
                    cursor.write_f32(value);
                }
            }
            (TypeTag::Aabb, FieldValue::Aabb(v)) => {
                self.write_padded_vec3(cursor, &v.min);
                self.write_padded_vec3(cursor, &v.max);
            }
            (TypeTag::Sphere, FieldValue::Sphere(v)) => {
                cursor.write_f32(v.center.x);
                cursor.write_f32(v.center.y);
                cursor.write_f32(v.center.z);
                cursor.write_f32(v.radius);
            }
            (TypeTag::Capsule, FieldValue::Capsule(v)) => {
                self.write_padded_vec3(cursor, &v.start);
                self.write_padded_vec3(cursor, &v.end);
                cursor.write_f32(v.radius);
                cursor.write_bytes(&[0u8; 12]);
            }
            (TypeTag::Cylinder, FieldValue::Cylinder(v)) => {
                self.write_padded_vec3(cursor, &v.p0);
                self.write_padded_vec3(cursor, &v.p1);
                cursor.write_f32(v.radius);
                cursor.write_bytes(&[0u8; 12]);
            }
            (TypeTag::Cone, FieldValue::Cone(v)) => {
                self.write_padded_vec3(cursor, &v.apex);
                self.write_padded_vec3(cursor, &v.direction);
                cursor.write_f32(v.angle);
                cursor.write_f32(v.distance);
                cursor.write_bytes(&[0u8; 8]);
            }
            (TypeTag::LineSegment, FieldValue::LineSegment(v)) => {
                self.write_padded_vec3(cursor, &v.start);
                self.write_padded_vec3(cursor, &v.end);
            }
            (TypeTag::Area, FieldValue::Area(v)) => {
                for corner in [v.p0, v.p1, v.p2, v.p3] {
                    cursor.write_f32(corner.x);
                    cursor.write_f32(corner.y);
                }
                cursor.write_f32(v.height);
                cursor.write_f32(v.bottom);
                cursor.write_bytes(&[0u8; 8]);
            }
            (TypeTag::Area, FieldValue::AreaOld(v)) => {
                for corner in [v.p0, v.p1, v.p2, v.p3] {
                    cursor.write_f32(corner.x);
                    cursor.write_f32(corner.y);
                    cursor.write_f32(0.0);
                    cursor.write_f32(0.0);
                }
                cursor.write_f32(v.height);
                cursor.write_f32(v.bottom);
                cursor.write_bytes(&[0u8; 8]);
            }

            (TypeTag::String, FieldValue::String(s))
            | (TypeTag::Resource, FieldValue::Resource(s)) => {
                cursor.align_write(4);
                self.write_utf16_field(cursor, s);
            }
            (TypeTag::RuntimeType, FieldValue::RuntimeType(s)) => {
                cursor.align_write(4);
                self.write_utf8_field(cursor, s);
            }
            (TypeTag::Guid, FieldValue::Guid(guid))
            | (TypeTag::GameObjectRef, FieldValue::GameObjectRef(guid)) => {
                cursor.write_guid(&guid.raw);
            }
            (TypeTag::Object, FieldValue::Object(index)) => cursor.write_u32(*index),
            (TypeTag::UserData, FieldValue::UserData(ud)) => cursor.write_u32(ud.index),

            // raw payloads stand in for any field the codec could not
            // interpret on decode
            (_, FieldValue::RawBytes(raw)) => self.write_raw(cursor, def, raw)?,

            (_, other) => return Err(mismatch(def, tag_name(def.tag), other)),
        }

        Ok(())
    }

    fn write_padded_vec3(&self, cursor: &mut BinaryCursor, v: &Vec3) {
        cursor.write_f32(v.x);
        cursor.write_f32(v.y);
        cursor.write_f32(v.z);
        cursor.write_f32(0.0);
    }

    fn write_utf16_field(&self, cursor: &mut BinaryCursor, value: &str) {
        if value.is_empty() {
            cursor.write_u32(0);
            return;
        }
        let mut units: Vec<u16> = value.encode_utf16().collect();
        if units.last() != Some(&0) {
            units.push(0);
        }
        cursor.write_u32(u32::try_from(units.len()).unwrap_or(0));
        for unit in units {
            cursor.write_u16(unit);
        }
    }

    fn write_utf8_field(&self, cursor: &mut BinaryCursor, value: &str) {
        if value.is_empty() {
            cursor.write_u32(0);
            return;
        }
        let bytes = value.as_bytes();
        if bytes.ends_with(b"\0") {
            cursor.write_u32(u32::try_from(bytes.len()).unwrap_or(0));
            cursor.write_bytes(bytes);
        } else {
            cursor.write_u32(u32::try_from(bytes.len() + 1).unwrap_or(0));
            cursor.write_bytes(bytes);
            cursor.write_bytes(&[0, 0]);
        }
    }

    /// Raw payloads are padded up to the declared size; one that exceeds
    /// it would shift every following field off its alignment.
    fn write_raw(&self, cursor: &mut BinaryCursor, def: &FieldDef, raw: &RawBytes) -> Result<()> {
        if raw.bytes.len() > def.size as usize {
            return Err(Error::AlignmentViolation {
                field: def.name.clone(),
                offset: cursor.tell(),
                alignment: def.align,
            });
        }
        cursor.write_bytes(&raw.bytes);
        if raw.bytes.len() < def.size as usize {
            cursor.write_bytes(&vec![0u8; def.size as usize - raw.bytes.len()]);
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsz::RszInstanceInfo;

    fn registry_with(fields_json: &str) -> TypeRegistry {
        let json = format!(
            r#"{{"1001": {{"crc": 1, "name": "app.TestType", "fields": {}}}}}"#,
            fields_json
        );
        TypeRegistry::from_json_str(&json).unwrap()
    }

    fn graph_with(count: usize) -> InstanceGraph {
        let mut graph = InstanceGraph::new();
        graph.reset(vec![RszInstanceInfo::default(); count]);
        graph
    }

    fn decode_one(
        registry: &TypeRegistry,
        graph: &mut InstanceGraph,
        index: u32,
        cursor: &mut BinaryCursor,
    ) -> FieldMap {
        let codec = ObjectStreamCodec::new(registry);
        let userdata_paths = HashMap::new();
        let mut ctx = DecodeContext {
            index,
            graph,
            userdata_paths: &userdata_paths,
        };
        let fields = registry.get(0x1001).unwrap().fields.clone();
        codec.decode_instance(cursor, &fields, &mut ctx).unwrap()
    }

    fn encode_one(registry: &TypeRegistry, map: &FieldMap, align_base: u64) -> Vec<u8> {
        let codec = ObjectStreamCodec::new(registry);
        let mut cursor = BinaryCursor::with_align_base(Vec::new(), align_base);
        let fields = &registry.get(0x1001).unwrap().fields;
        codec.encode_instance(&mut cursor, fields, map).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_alignment_spillover_round_trip() {
        let registry = registry_with(
            r#"[
                {"name": "a", "type": "F32", "size": 4, "align": 4},
                {"name": "b", "type": "F64", "size": 8, "align": 8}
            ]"#,
        );

        // f32 ends at offset 4; the double pre-pads 4 bytes to reach 8
        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_f32(1.0);
        cursor.write_bytes(&[0u8; 4]);
        cursor.write_f64(2.0);
        let bytes = cursor.into_inner();
        assert_eq!(bytes.len(), 16);

        let mut graph = graph_with(2);
        let mut cursor = BinaryCursor::new(bytes.clone());
        let map = decode_one(&registry, &mut graph, 1, &mut cursor);
        assert_eq!(map.get("a"), Some(&FieldValue::F32(1.0)));
        assert_eq!(map.get("b"), Some(&FieldValue::F64(2.0)));

        assert_eq!(encode_one(&registry, &map, 0), bytes);
    }

    #[test]
    fn test_alignment_base_shifts_padding() {
        let registry = registry_with(
            r#"[
                {"name": "a", "type": "F32", "size": 4, "align": 4},
                {"name": "b", "type": "F64", "size": 8, "align": 8}
            ]"#,
        );

        // with the data origin at absolute offset 4 the double is already
        // 8-aligned after the f32, so no padding appears
        let mut cursor = BinaryCursor::with_align_base(Vec::new(), 4);
        cursor.write_f32(1.0);
        cursor.write_f64(2.0);
        let bytes = cursor.into_inner();
        assert_eq!(bytes.len(), 12);

        let mut graph = graph_with(2);
        let mut cursor = BinaryCursor::with_align_base(bytes.clone(), 4);
        let map = decode_one(&registry, &mut graph, 1, &mut cursor);
        assert_eq!(map.get("b"), Some(&FieldValue::F64(2.0)));

        assert_eq!(encode_one(&registry, &map, 4), bytes);
    }

    #[test]
    fn test_maybe_object_array_commits_to_references() {
        let registry = registry_with(
            r#"[{"name": "refs", "type": "S32", "size": 4, "align": 4,
                 "array": true, "native": true, "original_type": "app.Managed"}]"#,
        );

        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_u32(3);
        cursor.write_u32(2);
        cursor.write_u32(3);
        cursor.write_u32(4);
        let bytes = cursor.into_inner();

        let mut graph = graph_with(6);
        let mut cursor = BinaryCursor::new(bytes.clone());
        let map = decode_one(&registry, &mut graph, 5, &mut cursor);

        let Some(FieldValue::Array(values)) = map.get("refs") else {
            panic!("expected array");
        };
        assert_eq!(
            values,
            &[
                FieldValue::Object(2),
                FieldValue::Object(3),
                FieldValue::Object(4)
            ]
        );
        for target in [2usize, 3, 4] {
            assert_eq!(graph.hierarchy[target].children, vec![5]);
        }

        assert_eq!(encode_one(&registry, &map, 0), bytes);
    }

    #[test]
    fn test_maybe_object_array_commits_to_raw_bytes() {
        let registry = registry_with(
            r#"[{"name": "refs", "type": "S32", "size": 4, "align": 4,
                 "array": true, "native": true, "original_type": "app.Managed"}]"#,
        );

        // first element is not a valid backward reference, so the whole
        // array stays scalar
        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_u32(2);
        cursor.write_u32(9);
        cursor.write_u32(2);
        let bytes = cursor.into_inner();

        let mut graph = graph_with(6);
        let mut cursor = BinaryCursor::new(bytes.clone());
        let map = decode_one(&registry, &mut graph, 1, &mut cursor);

        let Some(FieldValue::Array(values)) = map.get("refs") else {
            panic!("expected array");
        };
        assert!(values
            .iter()
            .all(|v| matches!(v, FieldValue::RawBytes(_))));
        assert!(graph.hierarchy[1].children.is_empty());

        assert_eq!(encode_one(&registry, &map, 0), bytes);
    }

    #[test]
    fn test_invalid_scalar_reference_stays_plain() {
        let registry = registry_with(
            r#"[{"name": "slot", "type": "U32", "size": 4, "align": 4,
                 "native": true, "original_type": "app.Managed"}]"#,
        );

        let mut cursor = BinaryCursor::new(7u32.to_le_bytes().to_vec());
        let mut graph = graph_with(3);
        let map = decode_one(&registry, &mut graph, 2, &mut cursor);
        assert_eq!(map.get("slot"), Some(&FieldValue::U32(7)));
        assert!(graph.hierarchy[2].children.is_empty());
    }

    #[test]
    fn test_string_field_round_trip_keeps_terminator() {
        let registry = registry_with(
            r#"[{"name": "name", "type": "String", "size": 4, "align": 4}]"#,
        );

        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_u32(3);
        for unit in "hi\0".encode_utf16() {
            cursor.write_u16(unit);
        }
        let bytes = cursor.into_inner();

        let mut graph = graph_with(2);
        let mut cursor = BinaryCursor::new(bytes.clone());
        let map = decode_one(&registry, &mut graph, 1, &mut cursor);
        assert_eq!(map.get("name"), Some(&FieldValue::String("hi\0".to_owned())));
        assert_eq!(
            map.get("name").unwrap().as_trimmed_str(),
            Some("hi")
        );

        assert_eq!(encode_one(&registry, &map, 0), bytes);
    }

    #[test]
    fn test_struct_field_round_trip() {
        let json = r#"{
            "1001": {"crc": 1, "name": "app.TestType", "fields": [
                {"name": "entries", "type": "Struct", "size": 8, "align": 4,
                 "array": true, "original_type": "app.Entry"}
            ]},
            "2002": {"crc": 2, "name": "app.Entry", "fields": [
                {"name": "k", "type": "U32", "size": 4, "align": 4},
                {"name": "v", "type": "F32", "size": 4, "align": 4}
            ]}
        }"#;
        let registry = TypeRegistry::from_json_str(json).unwrap();

        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_u32(2);
        cursor.write_u32(10);
        cursor.write_f32(0.5);
        cursor.write_u32(20);
        cursor.write_f32(1.5);
        let bytes = cursor.into_inner();

        let codec = ObjectStreamCodec::new(&registry);
        let mut graph = graph_with(2);
        let userdata_paths = HashMap::new();
        let mut ctx = DecodeContext {
            index: 1,
            graph: &mut graph,
            userdata_paths: &userdata_paths,
        };
        let fields = registry.get(0x1001).unwrap().fields.clone();
        let mut read_cursor = BinaryCursor::new(bytes.clone());
        let map = codec
            .decode_instance(&mut read_cursor, &fields, &mut ctx)
            .unwrap();

        let Some(FieldValue::Struct(entry)) = map.get("entries") else {
            panic!("expected struct");
        };
        assert_eq!(entry.entries.len(), 2);
        assert_eq!(entry.entries[1].get("k"), Some(&FieldValue::U32(20)));

        let mut out = BinaryCursor::new(Vec::new());
        codec.encode_instance(&mut out, &fields, &map).unwrap();
        assert_eq!(out.into_inner(), bytes);
    }

    #[test]
    fn test_unknown_tag_falls_back_to_raw_bytes() {
        let registry = registry_with(
            r#"[{"name": "blob", "type": "MysteryThing", "size": 6, "align": 2}]"#,
        );

        let bytes = vec![1, 2, 3, 4, 5, 6];
        let mut graph = graph_with(2);
        let mut cursor = BinaryCursor::new(bytes.clone());
        let map = decode_one(&registry, &mut graph, 1, &mut cursor);
        assert_eq!(
            map.get("blob"),
            Some(&FieldValue::RawBytes(RawBytes {
                bytes: bytes.clone(),
                declared_size: 6,
            }))
        );

        assert_eq!(encode_one(&registry, &map, 0), bytes);
    }

    #[test]
    fn test_type_value_mismatch_is_fatal_on_write() {
        let registry =
            registry_with(r#"[{"name": "x", "type": "F32", "size": 4, "align": 4}]"#);

        let codec = ObjectStreamCodec::new(&registry);
        let mut map = FieldMap::new();
        map.insert("x".to_owned(), FieldValue::Bool(true));

        let mut cursor = BinaryCursor::new(Vec::new());
        let fields = &registry.get(0x1001).unwrap().fields;
        match codec.encode_instance(&mut cursor, fields, &map) {
            Err(Error::TypeValueMismatch { field, .. }) => assert_eq!(field, "x"),
            other => panic!("expected TypeValueMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_raw_payload_is_fatal_on_write() {
        let registry = registry_with(
            r#"[{"name": "blob", "type": "MysteryThing", "size": 4, "align": 4}]"#,
        );

        let codec = ObjectStreamCodec::new(&registry);
        let mut map = FieldMap::new();
        map.insert(
            "blob".to_owned(),
            FieldValue::RawBytes(RawBytes {
                bytes: vec![0u8; 8],
                declared_size: 4,
            }),
        );

        let mut cursor = BinaryCursor::new(Vec::new());
        let fields = &registry.get(0x1001).unwrap().fields;
        match codec.encode_instance(&mut cursor, fields, &map) {
            Err(Error::AlignmentViolation { field, .. }) => assert_eq!(field, "blob"),
            other => panic!("expected AlignmentViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_runtime_type_round_trip() {
        let registry = registry_with(
            r#"[{"name": "rt", "type": "RuntimeType", "size": 4, "align": 4}]"#,
        );

        // UTF-8 payload whose count includes the single terminator
        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_u32(12);
        cursor.write_bytes(b"app.Foo.Bar\0");
        let bytes = cursor.into_inner();

        let mut graph = graph_with(2);
        let mut cursor = BinaryCursor::new(bytes.clone());
        let map = decode_one(&registry, &mut graph, 1, &mut cursor);
        assert_eq!(
            map.get("rt"),
            Some(&FieldValue::RuntimeType("app.Foo.Bar\0".to_owned()))
        );

        assert_eq!(encode_one(&registry, &map, 0), bytes);
    }

    #[test]
    fn test_geometry_round_trip() {
        let registry = registry_with(
            r#"[
                {"name": "bounds", "type": "AABB", "size": 32, "align": 16},
                {"name": "pill", "type": "Capsule", "size": 48, "align": 16},
                {"name": "tint", "type": "Color", "size": 4, "align": 4}
            ]"#,
        );

        let mut cursor = BinaryCursor::new(Vec::new());
        // aabb: two padded corners
        for v in [1.0f32, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0] {
            cursor.write_f32(v);
        }
        // capsule: padded endpoints, radius, 12 bytes padding
        for v in [0.0f32, 1.0, 0.0, 0.0, 0.0, 9.0, 0.0, 0.0, 0.25] {
            cursor.write_f32(v);
        }
        cursor.write_bytes(&[0u8; 12]);
        cursor.write_bytes(&[10, 20, 30, 255]);
        let bytes = cursor.into_inner();

        let mut graph = graph_with(2);
        let mut cursor = BinaryCursor::new(bytes.clone());
        let map = decode_one(&registry, &mut graph, 1, &mut cursor);

        let Some(FieldValue::Aabb(aabb)) = map.get("bounds") else {
            panic!("expected aabb");
        };
        assert_eq!(aabb.max.z, 6.0);
        let Some(FieldValue::Capsule(pill)) = map.get("pill") else {
            panic!("expected capsule");
        };
        assert_eq!(pill.radius, 0.25);

        assert_eq!(encode_one(&registry, &map, 0), bytes);
    }
}

fn mismatch(def: &FieldDef, expected: &'static str, found: &FieldValue) -> Error {
    Error::TypeValueMismatch {
        field: def.name.clone(),
        expected,
        found: found.kind_name(),
    }
}

fn tag_name(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::Bool => "Bool",
        TypeTag::S8 => "S8",
        TypeTag::U8 => "U8",
        TypeTag::S16 => "S16",
        TypeTag::U16 => "U16",
        TypeTag::S32 => "S32",
        TypeTag::U32 => "U32",
        TypeTag::S64 => "S64",
        TypeTag::U64 => "U64",
        TypeTag::F32 => "F32",
        TypeTag::F64 => "F64",
        TypeTag::Vec2 => "Vec2",
        TypeTag::Vec3 => "Vec3",
        TypeTag::Vec3Color => "Vec3Color",
        TypeTag::Vec4 => "Vec4",
        TypeTag::Float2 => "Float2",
        TypeTag::Float3 => "Float3",
        TypeTag::Float4 => "Float4",
        TypeTag::Position => "Position",
        TypeTag::Quaternion => "Quaternion",
        TypeTag::Color => "Color",
        TypeTag::Mat4 => "Mat4",
        TypeTag::Obb => "OBB",
        TypeTag::Aabb => "AABB",
        TypeTag::Capsule => "Capsule",
        TypeTag::Sphere => "Sphere",
        TypeTag::Cylinder => "Cylinder",
        TypeTag::Cone => "Cone",
        TypeTag::LineSegment => "LineSegment",
        TypeTag::Point => "Point",
        TypeTag::Size => "Size",
        TypeTag::Rect => "Rect",
        TypeTag::Area => "Area",
        TypeTag::Range => "Range",
        TypeTag::RangeI => "RangeI",
        TypeTag::Int2 => "Int2",
        TypeTag::Int3 => "Int3",
        TypeTag::Int4 => "Int4",
        TypeTag::Uint2 => "Uint2",
        TypeTag::Uint3 => "Uint3",
        TypeTag::String => "String",
        TypeTag::Resource => "Resource",
        TypeTag::RuntimeType => "RuntimeType",
        TypeTag::Guid => "Guid",
        TypeTag::GameObjectRef => "GameObjectRef",
        TypeTag::Object => "Object",
        TypeTag::UserData => "UserData",
        TypeTag::Struct => "Struct",
        TypeTag::Data => "Data",
        TypeTag::Unknown => "Unknown",
    }
}
