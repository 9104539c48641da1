//! Continuous id regeneration

use std::collections::HashMap;

use crate::error::Result;
use crate::package::{DataObjectPackage, DataObjectRef, FIRST_GENERATED_ID};

use super::verify_references;

/// Old id to new id assignment, in visiting order
struct Renumbering {
    map: HashMap<String, String>,
    next: u64,
}

impl Renumbering {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            next: FIRST_GENERATED_ID,
        }
    }

    /// Assign the next id to `old`, returning false if it already had one
    fn assign(&mut self, old: &str) -> bool {
        if self.map.contains_key(old) {
            return false;
        }
        self.map.insert(old.to_string(), format!("ID{}", self.next));
        self.next += 1;
        true
    }

    fn assign_group(&mut self, pkg: &DataObjectPackage, group_id: &str) {
        if !self.assign(group_id) {
            return;
        }
        if let Some(group) = pkg.get_group(group_id) {
            for member in group.member_ids() {
                self.assign(member);
            }
        }
    }

    fn visit_unit(&mut self, pkg: &DataObjectPackage, unit_id: &str) {
        if !self.assign(unit_id) {
            return;
        }
        let Some(unit) = pkg.get_unit(unit_id) else {
            return;
        };
        for object_id in unit.data_objects().iter() {
            match pkg.data_object(object_id) {
                Some(DataObjectRef::Group(group)) => self.assign_group(pkg, group.id()),
                Some(_) => {
                    self.assign(object_id);
                }
                None => {}
            }
        }
        for child in unit.children().iter() {
            self.visit_unit(pkg, child);
        }
    }
}

/// Renumber every node `ID10`, `ID11`... in a deterministic order: units
/// depth-first from the roots, each followed by its groups and their
/// members, then its directly referenced objects. Nodes unreachable from
/// the roots follow in natural id order. The id counter restarts after the
/// last assigned id.
pub fn regenerate_continuous_ids(pkg: &mut DataObjectPackage) -> Result<()> {
    verify_references(pkg)?;

    let mut renumbering = Renumbering::new();
    for root in pkg.roots() {
        renumbering.visit_unit(pkg, root);
    }
    for unit_id in pkg.sorted_unit_ids() {
        renumbering.visit_unit(pkg, &unit_id);
    }
    for group_id in pkg.sorted_group_ids() {
        renumbering.assign_group(pkg, &group_id);
    }
    for object_id in pkg
        .sorted_binary_ids()
        .into_iter()
        .chain(pkg.sorted_physical_ids())
    {
        renumbering.assign(&object_id);
    }

    let Renumbering { map, next } = renumbering;
    let rename = |old: &str| map.get(old).cloned().unwrap_or_else(|| old.to_string());

    let mut nodes = pkg.take_nodes();
    nodes.units = nodes
        .units
        .into_values()
        .map(|mut unit| {
            unit.id = rename(&unit.id);
            unit.children.rename_all(&map);
            unit.data_objects.rename_all(&map);
            (unit.id.clone(), unit)
        })
        .collect();
    nodes.groups = nodes
        .groups
        .into_values()
        .map(|mut group| {
            group.id = rename(&group.id);
            group.binaries.rename_all(&map);
            group.physicals.rename_all(&map);
            (group.id.clone(), group)
        })
        .collect();
    nodes.binaries = nodes
        .binaries
        .into_values()
        .map(|mut binary| {
            binary.id = rename(&binary.id);
            binary.group = binary.group.as_deref().map(rename);
            (binary.id.clone(), binary)
        })
        .collect();
    nodes.physicals = nodes
        .physicals
        .into_values()
        .map(|mut physical| {
            physical.id = rename(&physical.id);
            physical.group = physical.group.as_deref().map(rename);
            (physical.id.clone(), physical)
        })
        .collect();
    nodes.roots.rename_all(&map);

    pkg.put_nodes(nodes);
    pkg.set_id_counter(next);
    tracing::debug!(nodes = map.len(), "ids regenerated");
    Ok(())
}
