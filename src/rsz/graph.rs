use std::collections::{HashMap, HashSet};

use super::RszInstanceInfo;
use crate::value::{FieldMap, FieldValue};

/// Parent/child links of one instance within the stream's forest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceNode {
    pub parent: Option<u32>,
    pub children: Vec<u32>,
}

/// Stable identifiers for host-side editing, independent of the in-file
/// instance order. Not thread-safe; confine to the owning graph.
#[derive(Debug, Default)]
pub struct InstanceIdManager {
    next: u64,
    by_id: HashMap<u64, u32>,
    by_index: HashMap<u32, u64>,
}

impl InstanceIdManager {
    pub fn register(&mut self, index: u32) -> u64 {
        if let Some(id) = self.by_index.get(&index) {
            return *id;
        }
        self.next += 1;
        let id = self.next;
        self.by_id.insert(id, index);
        self.by_index.insert(index, id);
        id
    }

    pub fn index_of(&self, id: u64) -> Option<u32> {
        self.by_id.get(&id).copied()
    }

    pub fn id_of(&self, index: u32) -> Option<u64> {
        self.by_index.get(&index).copied()
    }

    fn shift_from(&mut self, at: u32) {
        for index in self.by_id.values_mut() {
            if *index >= at {
                *index += 1;
            }
        }
        self.by_index = self.by_id.iter().map(|(id, index)| (*index, *id)).collect();
    }
}

/// The decoded instance collection: per-instance type identity, parsed
/// field maps, hierarchy edges and root classification.
///
/// Index 0 is the NULL sentinel; it never carries fields and is never a
/// valid reference target. References always point backward, so the
/// hierarchy is a forest and needs no cycle handling.
#[derive(Debug, Default)]
pub struct InstanceGraph {
    pub instance_infos: Vec<RszInstanceInfo>,
    pub fields: Vec<FieldMap>,
    pub hierarchy: Vec<InstanceNode>,
    pub gameobject_instances: HashSet<u32>,
    pub folder_instances: HashSet<u32>,
    pub userdata_instances: HashSet<u32>,
    pub ids: InstanceIdManager,
}

impl InstanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instance_infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_infos.is_empty()
    }

    /// Resets parsed state for `infos.len()` instances.
    pub fn reset(&mut self, infos: Vec<RszInstanceInfo>) {
        let count = infos.len();
        self.instance_infos = infos;
        self.fields = vec![FieldMap::new(); count];
        self.hierarchy = vec![InstanceNode::default(); count];
        self.gameobject_instances.clear();
        self.folder_instances.clear();
        self.userdata_instances.clear();
        self.ids = InstanceIdManager::default();
        for index in 0..count as u32 {
            self.ids.register(index);
        }
    }

    /// Whether `candidate` may be referenced from instance `current`:
    /// non-null, strictly backward, and not a root addressed through the
    /// Object Table.
    pub fn is_valid_reference(&self, candidate: u32, current: u32) -> bool {
        candidate > 0
            && candidate < current
            && !self.gameobject_instances.contains(&candidate)
            && !self.folder_instances.contains(&candidate)
    }

    pub fn is_root(&self, index: u32) -> bool {
        self.gameobject_instances.contains(&index) || self.folder_instances.contains(&index)
    }

    pub fn add_edge(&mut self, parent: u32, child: u32) {
        if (child as usize) < self.hierarchy.len() {
            self.hierarchy[child as usize].parent = Some(parent);
        } else {
            log::warn!("invalid instance index {} (parent: {})", child, parent);
            return;
        }
        if (parent as usize) < self.hierarchy.len() {
            self.hierarchy[parent as usize].children.push(child);
        }
    }

    /// Inserts `info` at `at`, shifting trailing instances and rewriting
    /// every decoded reference, hierarchy edge, classification entry and
    /// stable id that pointed at or past the insertion point.
    pub fn insert_instance_and_update_references(&mut self, at: u32, info: RszInstanceInfo) {
        let at_usize = at as usize;
        assert!(at_usize <= self.instance_infos.len());

        for map in self.fields.iter_mut() {
            shift_references_in_map(map, at);
        }

        for node in self.hierarchy.iter_mut() {
            if let Some(parent) = node.parent.as_mut() {
                if *parent >= at {
                    *parent += 1;
                }
            }
            for child in node.children.iter_mut() {
                if *child >= at {
                    *child += 1;
                }
            }
        }

        self.gameobject_instances = shift_set(&self.gameobject_instances, at);
        self.folder_instances = shift_set(&self.folder_instances, at);
        self.userdata_instances = shift_set(&self.userdata_instances, at);
        self.ids.shift_from(at);

        self.instance_infos.insert(at_usize, info);
        self.fields.insert(at_usize, FieldMap::new());
        self.hierarchy.insert(at_usize, InstanceNode::default());
        self.ids.register(at);
    }

    /// Transitive object-reference closure under `root`, excluding
    /// indices addressed through the Object Table. Depth-first, each
    /// index reported once.
    pub fn find_nested_objects(&self, root: u32, object_table: &[i32]) -> Vec<u32> {
        let table: HashSet<u32> = object_table
            .iter()
            .filter(|id| **id >= 0)
            .map(|id| *id as u32)
            .collect();

        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];

        while let Some(index) = stack.pop() {
            let Some(map) = self.fields.get(index as usize) else {
                continue;
            };
            let mut referenced = Vec::new();
            collect_object_refs(map, &mut referenced);
            for child in referenced {
                if table.contains(&child) || !seen.insert(child) {
                    continue;
                }
                found.push(child);
                stack.push(child);
            }
        }

        found
    }

    /// Userdata indices referenced from `root` or any of its nested
    /// objects.
    pub fn find_userdata_references(&self, root: u32, object_table: &[i32]) -> Vec<u32> {
        let mut scope = vec![root];
        scope.extend(self.find_nested_objects(root, object_table));

        let mut found = Vec::new();
        let mut seen = HashSet::new();
        for index in scope {
            let Some(map) = self.fields.get(index as usize) else {
                continue;
            };
            let mut refs = Vec::new();
            collect_userdata_refs(map, &mut refs);
            for ud in refs {
                if seen.insert(ud) {
                    found.push(ud);
                }
            }
        }
        found
    }
}

fn shift_set(set: &HashSet<u32>, at: u32) -> HashSet<u32> {
    set.iter()
        .map(|index| if *index >= at { *index + 1 } else { *index })
        .collect()
}

fn shift_references_in_map(map: &mut FieldMap, at: u32) {
    for (_, value) in map.iter_mut() {
        shift_references_in_value(value, at);
    }
}

fn shift_references_in_value(value: &mut FieldValue, at: u32) {
    match value {
        FieldValue::Object(index) => {
            if *index >= at {
                *index += 1;
            }
        }
        FieldValue::UserData(ud) => {
            if ud.index >= at {
                ud.index += 1;
            }
        }
        FieldValue::Array(values) => {
            for element in values.iter_mut() {
                shift_references_in_value(element, at);
            }
        }
        FieldValue::Struct(entry) => {
            for map in entry.entries.iter_mut() {
                shift_references_in_map(map, at);
            }
        }
        _ => {}
    }
}

fn collect_object_refs(map: &FieldMap, out: &mut Vec<u32>) {
    for (_, value) in map.iter() {
        collect_object_refs_in_value(value, out);
    }
}

fn collect_object_refs_in_value(value: &FieldValue, out: &mut Vec<u32>) {
    match value {
        FieldValue::Object(index) if *index > 0 => out.push(*index),
        FieldValue::Array(values) => {
            for element in values {
                collect_object_refs_in_value(element, out);
            }
        }
        FieldValue::Struct(entry) => {
            for map in &entry.entries {
                collect_object_refs(map, out);
            }
        }
        _ => {}
    }
}

fn collect_userdata_refs(map: &FieldMap, out: &mut Vec<u32>) {
    for (_, value) in map.iter() {
        collect_userdata_refs_in_value(value, out);
    }
}

fn collect_userdata_refs_in_value(value: &FieldValue, out: &mut Vec<u32>) {
    match value {
        FieldValue::UserData(ud) if ud.index > 0 => out.push(ud.index),
        FieldValue::Array(values) => {
            for element in values {
                collect_userdata_refs_in_value(element, out);
            }
        }
        FieldValue::Struct(entry) => {
            for map in &entry.entries {
                collect_userdata_refs(map, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::UserDataRef;

    fn graph_with(count: usize) -> InstanceGraph {
        let mut graph = InstanceGraph::new();
        graph.reset(vec![RszInstanceInfo::default(); count]);
        graph
    }

    #[test]
    fn test_reference_validity() {
        let mut graph = graph_with(6);
        graph.gameobject_instances.insert(3);

        assert!(graph.is_valid_reference(2, 5));
        assert!(!graph.is_valid_reference(0, 5)); // null sentinel
        assert!(!graph.is_valid_reference(5, 5)); // not backward
        assert!(!graph.is_valid_reference(3, 5)); // gameobject root
    }

    #[test]
    fn test_insert_shifts_references() {
        let mut graph = graph_with(4);
        graph.fields[3].insert("target".to_owned(), FieldValue::Object(2));
        graph.fields[3].insert(
            "ud".to_owned(),
            FieldValue::UserData(UserDataRef {
                index: 1,
                path: String::new(),
            }),
        );
        graph.add_edge(3, 2);
        graph.folder_instances.insert(2);

        graph.insert_instance_and_update_references(2, RszInstanceInfo::default());

        assert_eq!(graph.len(), 5);
        assert_eq!(graph.fields[4].get("target"), Some(&FieldValue::Object(3)));
        assert_eq!(
            graph.fields[4].get("ud"),
            Some(&FieldValue::UserData(UserDataRef {
                index: 1,
                path: String::new(),
            }))
        );
        assert_eq!(graph.hierarchy[3].parent, Some(4));
        assert_eq!(graph.hierarchy[4].children, vec![3]);
        assert!(graph.folder_instances.contains(&3));
    }

    #[test]
    fn test_find_nested_objects_skips_object_table() {
        let mut graph = graph_with(6);
        graph.fields[5].insert("a".to_owned(), FieldValue::Object(4));
        graph.fields[5].insert("b".to_owned(), FieldValue::Object(3));
        graph.fields[4].insert("c".to_owned(), FieldValue::Object(2));

        let nested = graph.find_nested_objects(5, &[3]);
        assert!(nested.contains(&4));
        assert!(nested.contains(&2));
        assert!(!nested.contains(&3));
    }

    #[test]
    fn test_stable_ids_survive_insert() {
        let mut graph = graph_with(3);
        let id = graph.ids.id_of(2).unwrap();
        graph.insert_instance_and_update_references(1, RszInstanceInfo::default());
        assert_eq!(graph.ids.index_of(id), Some(3));
    }
}
