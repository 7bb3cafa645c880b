//! Collects every resource path referenced by decoded instances, used
//! when a file owner opts into auto-managed resource tables.

use crate::registry::{TypeInfo, TypeRegistry, TypeTag};
use crate::rsz::{ObjectStream, UserDataBlock};
use crate::value::{FieldMap, FieldValue};

/// Types whose resource contribution is positional rather than tagged:
/// an enable flag gating a path field.
const PREFAB_TYPES: [&str; 2] = ["via.Prefab", "app.global.ResourcePrefab"];
const FOLDER_TYPE: &str = "via.Folder";

/// Walks a stream's decoded instances and gathers referenced resource
/// paths, first occurrence first, duplicates removed. Harvesting is
/// idempotent: the same graph always yields the same ordered set.
pub struct ResourceHarvester<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> ResourceHarvester<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    pub fn harvest(&self, stream: &ObjectStream) -> Vec<String> {
        let mut paths = Vec::new();
        self.harvest_into(stream, &mut paths);
        paths
    }

    fn harvest_into(&self, stream: &ObjectStream, paths: &mut Vec<String>) {
        let embedded_by_instance: Vec<(u32, &ObjectStream)> = match &stream.userdata {
            UserDataBlock::Embedded(entries) => entries
                .iter()
                .filter_map(|e| e.stream.as_deref().map(|s| (e.instance_id, s)))
                .collect(),
            _ => Vec::new(),
        };

        for index in 0..stream.graph.len() as u32 {
            let info = stream.graph.instance_infos[index as usize];
            let map = &stream.graph.fields[index as usize];

            if let Some(type_info) = self.registry.get(info.type_id) {
                if PREFAB_TYPES.contains(&type_info.name.as_str()) {
                    self.collect_flagged(type_info, map, 0, 1, paths);
                } else if type_info.name == FOLDER_TYPE {
                    self.collect_flagged(type_info, map, 4, 5, paths);
                } else {
                    self.collect_fields(type_info, map, paths);
                }
            }

            for (_, nested) in embedded_by_instance.iter().filter(|(id, _)| *id == index) {
                self.harvest_into(nested, paths);
            }
        }
    }

    /// Positional form: field `flag` enables the path held by `path`.
    fn collect_flagged(
        &self,
        type_info: &TypeInfo,
        map: &FieldMap,
        flag: usize,
        path: usize,
        paths: &mut Vec<String>,
    ) {
        let (Some(flag_def), Some(path_def)) =
            (type_info.fields.get(flag), type_info.fields.get(path))
        else {
            return;
        };
        let enabled = matches!(map.get(&flag_def.name), Some(FieldValue::Bool(true)));
        if !enabled {
            return;
        }
        if let Some(value) = map.get(&path_def.name) {
            if let Some(path) = value.as_trimmed_str() {
                add_path(paths, path);
            }
        }
    }

    fn collect_fields(&self, type_info: &TypeInfo, map: &FieldMap, paths: &mut Vec<String>) {
        for def in &type_info.fields {
            let Some(value) = map.get(&def.name) else {
                continue;
            };
            match def.tag {
                TypeTag::Resource => self.collect_resource_value(value, paths),
                TypeTag::Struct => self.collect_struct_value(value, paths),
                _ => {}
            }
        }
    }

    fn collect_resource_value(&self, value: &FieldValue, paths: &mut Vec<String>) {
        match value {
            FieldValue::Resource(_) => {
                if let Some(path) = value.as_trimmed_str() {
                    add_path(paths, path);
                }
            }
            FieldValue::Array(values) => {
                for element in values {
                    self.collect_resource_value(element, paths);
                }
            }
            _ => {}
        }
    }

    fn collect_struct_value(&self, value: &FieldValue, paths: &mut Vec<String>) {
        let FieldValue::Struct(entry) = value else {
            return;
        };
        let Some((struct_info, _)) = self.registry.find_by_name(&entry.type_name) else {
            return;
        };
        for map in &entry.entries {
            self.collect_fields(struct_info, map, paths);
        }
    }
}

fn add_path(paths: &mut Vec<String>, path: &str) {
    if path.is_empty() {
        return;
    }
    if !paths.iter().any(|existing| existing == path) {
        paths.push(path.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use crate::rsz::{ObjectStream, RszInstanceInfo};
    use crate::value::{FieldMap, StructValue};

    fn registry() -> TypeRegistry {
        TypeRegistry::from_json_str(
            r#"{
                "2001": {"crc": 1, "name": "via.Prefab", "fields": [
                    {"name": "Enabled", "type": "Bool", "size": 1, "align": 1},
                    {"name": "Path", "type": "String", "size": 4, "align": 4}
                ]},
                "2002": {"crc": 2, "name": "app.Model", "fields": [
                    {"name": "Mesh", "type": "Resource", "size": 4, "align": 4},
                    {"name": "Parts", "type": "Struct", "size": 8, "align": 4,
                     "array": true, "original_type": "app.Part"}
                ]},
                "2003": {"crc": 3, "name": "app.Part", "fields": [
                    {"name": "Material", "type": "Resource", "size": 4, "align": 4}
                ]}
            }"#,
        )
        .unwrap()
    }

    fn stream() -> ObjectStream {
        let mut stream = ObjectStream::new();
        stream.graph.reset(vec![
            RszInstanceInfo::default(),
            RszInstanceInfo {
                type_id: 0x2001,
                crc: 1,
            },
            RszInstanceInfo {
                type_id: 0x2002,
                crc: 2,
            },
            RszInstanceInfo {
                type_id: 0x2002,
                crc: 2,
            },
        ]);

        stream.graph.fields[1].insert("Enabled".to_owned(), FieldValue::Bool(true));
        stream.graph.fields[1]
            .insert("Path".to_owned(), FieldValue::String("p/x.pfb\0".to_owned()));

        let mut part = FieldMap::new();
        part.insert(
            "Material".to_owned(),
            FieldValue::Resource("mats/skin.mdf\0".to_owned()),
        );
        stream.graph.fields[2].insert(
            "Mesh".to_owned(),
            FieldValue::Resource("meshes/a.mesh\0".to_owned()),
        );
        stream.graph.fields[2].insert(
            "Parts".to_owned(),
            FieldValue::Struct(StructValue {
                type_name: "app.Part".to_owned(),
                entries: vec![part],
            }),
        );

        // duplicate resource in another instance
        stream.graph.fields[3].insert(
            "Mesh".to_owned(),
            FieldValue::Resource("meshes/a.mesh\0".to_owned()),
        );

        stream
    }

    #[test]
    fn test_harvest_collects_in_first_occurrence_order() {
        let registry = registry();
        let paths = ResourceHarvester::new(&registry).harvest(&stream());
        assert_eq!(paths, ["p/x.pfb", "meshes/a.mesh", "mats/skin.mdf"]);
    }

    #[test]
    fn test_harvest_is_idempotent() {
        let registry = registry();
        let harvester = ResourceHarvester::new(&registry);
        let stream = stream();
        assert_eq!(harvester.harvest(&stream), harvester.harvest(&stream));
    }

    #[test]
    fn test_disabled_prefab_contributes_nothing() {
        let registry = registry();
        let mut stream = stream();
        stream.graph.fields[1].insert("Enabled".to_owned(), FieldValue::Bool(false));

        let paths = ResourceHarvester::new(&registry).harvest(&stream);
        assert_eq!(paths, ["meshes/a.mesh", "mats/skin.mdf"]);
    }
}
