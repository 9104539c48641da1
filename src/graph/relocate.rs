//! Moving a unit subtree between packages

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SedaError};
use crate::package::{natural_id_cmp, DataObjectPackage, DataObjectRef};

/// Nodes of a subtree, collected before anything is moved
#[derive(Default)]
struct Subtree {
    units: Vec<String>,
    groups: Vec<String>,
    binaries: Vec<String>,
    physicals: Vec<String>,
}

impl Subtree {
    fn contains_unit(&self, id: &str) -> bool {
        self.units.iter().any(|unit| unit == id)
    }

    fn contains_group(&self, id: &str) -> bool {
        self.groups.iter().any(|group| group == id)
    }
}

fn collect(pkg: &DataObjectPackage, top: &str) -> Result<Subtree> {
    let mut subtree = Subtree::default();
    let mut seen = HashSet::new();
    let mut stack = vec![top.to_string()];

    while let Some(unit_id) = stack.pop() {
        if !seen.insert(unit_id.clone()) {
            continue;
        }
        for object in pkg.unit_data_objects(&unit_id)? {
            let id = object.id().to_string();
            match object {
                DataObjectRef::Group(group) => {
                    if !subtree.contains_group(&id) {
                        subtree.groups.push(id);
                        subtree.binaries.extend(group.binaries().iter().map(str::to_string));
                        subtree.physicals.extend(group.physicals().iter().map(str::to_string));
                    }
                }
                DataObjectRef::Binary(_) => subtree.binaries.push(id),
                DataObjectRef::Physical(_) => subtree.physicals.push(id),
            }
        }
        let children = pkg.child_units(&unit_id)?;
        stack.extend(children.iter().rev().map(|child| child.id().to_string()));
        subtree.units.push(unit_id);
    }

    subtree.binaries.sort_by(|a, b| natural_id_cmp(a, b));
    subtree.binaries.dedup();
    subtree.physicals.sort_by(|a, b| natural_id_cmp(a, b));
    subtree.physicals.dedup();
    Ok(subtree)
}

/// Everything in the subtree must be referenced from inside it only
fn verify_detachable(pkg: &DataObjectPackage, top: &str, subtree: &Subtree) -> Result<()> {
    for unit_id in subtree.units.iter().filter(|id| *id != top) {
        for parent in pkg.parents_of(unit_id) {
            if !subtree.contains_unit(&parent) {
                return Err(SedaError::StillReferenced {
                    id: unit_id.clone(),
                    by: parent,
                });
            }
        }
    }

    let objects = subtree
        .groups
        .iter()
        .chain(&subtree.binaries)
        .chain(&subtree.physicals);
    for object_id in objects {
        for unit in pkg.referencing_units(object_id) {
            if !subtree.contains_unit(&unit) {
                return Err(SedaError::StillReferenced {
                    id: object_id.clone(),
                    by: unit,
                });
            }
        }
        let group = pkg.data_object(object_id).and_then(|o| match o {
            DataObjectRef::Group(_) => None,
            other => other.owning_group(),
        });
        if let Some(group) = group {
            if !subtree.contains_group(group) {
                return Err(SedaError::StillReferenced {
                    id: object_id.clone(),
                    by: group.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Move `unit_id` and everything below it from `src` to `dest`, under
/// `dest_parent` or as a new root. Nodes get fresh ids from the
/// destination counter. Fails without changing either package if a node
/// of the subtree is also referenced from outside it. Returns the new id
/// of the moved unit.
pub fn move_unit_tree(
    src: &mut DataObjectPackage,
    dest: &mut DataObjectPackage,
    unit_id: &str,
    dest_parent: Option<&str>,
) -> Result<String> {
    src.unit_or_err(unit_id)?;
    if let Some(parent) = dest_parent {
        dest.unit_or_err(parent)?;
    }
    let subtree = collect(src, unit_id)?;
    verify_detachable(src, unit_id, &subtree)?;

    let old_ids = subtree
        .units
        .iter()
        .chain(&subtree.groups)
        .chain(&subtree.binaries)
        .chain(&subtree.physicals);
    let map: HashMap<String, String> = old_ids
        .map(|old| (old.clone(), dest.allocate_id()))
        .collect();

    for parent in src.parents_of(unit_id) {
        if parent == "root" {
            src.unlink_root(unit_id);
        } else {
            src.unlink_child(&parent, unit_id)?;
        }
    }

    for old in &subtree.groups {
        if let Some(mut group) = src.take_group(old) {
            group.id = map[old].clone();
            group.binaries.clear();
            group.physicals.clear();
            dest.add_group(group)?;
        }
    }
    for old in &subtree.binaries {
        if let Some(mut binary) = src.take_binary(old) {
            let group = binary.group.take();
            binary.id = map[old].clone();
            let new_id = dest.add_binary(binary)?;
            if let Some(group) = group {
                dest.add_binary_to_group(&map[&group], &new_id)?;
            }
        }
    }
    for old in &subtree.physicals {
        if let Some(mut physical) = src.take_physical(old) {
            let group = physical.group.take();
            physical.id = map[old].clone();
            let new_id = dest.add_physical(physical)?;
            if let Some(group) = group {
                dest.add_physical_to_group(&map[&group], &new_id)?;
            }
        }
    }
    for old in &subtree.units {
        if let Some(mut unit) = src.take_unit(old) {
            unit.id = map[old].clone();
            unit.children.rename_all(&map);
            unit.data_objects.rename_all(&map);
            dest.add_unit(unit)?;
        }
    }

    let new_id = map[unit_id].clone();
    match dest_parent {
        Some(parent) => dest.add_child(parent, &new_id)?,
        None => dest.add_root(&new_id)?,
    }
    tracing::debug!(unit = unit_id, new_id = %new_id, units = subtree.units.len(), "unit tree moved");
    Ok(new_id)
}
