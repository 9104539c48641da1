//! Data object group unification
//!
//! After normalization every unit references its data objects through
//! exactly one group. Runs in three passes: count how many distinct units
//! reference each group or object, verify that every unit needing a merge
//! only touches nodes it owns alone, then rewrite.

use crate::error::{Result, SedaError};
use crate::package::{DataObjectPackage, DataObjectRef};
use crate::progress::{ProgressLevel, ProgressLogger};

/// A unit needs a fresh group when it references several nodes, or a single
/// node that is not a group
fn needs_normalization(pkg: &DataObjectPackage, unit_id: &str) -> Result<bool> {
    let objects = pkg.unit_data_objects(unit_id)?;
    Ok(match objects.as_slice() {
        [] => false,
        [single] => !single.is_group(),
        _ => true,
    })
}

fn count_references(pkg: &DataObjectPackage) {
    pkg.reset_touched();
    for unit in pkg.units() {
        for id in unit.data_objects().iter() {
            pkg.increment_touched(id);
        }
    }
}

fn verify_unit(pkg: &DataObjectPackage, unit_id: &str) -> Result<()> {
    let impossible = |object: &str| SedaError::ImpossibleMerge {
        unit: unit_id.to_string(),
        object: object.to_string(),
    };
    let unit = pkg
        .get_unit(unit_id)
        .ok_or_else(|| SedaError::UnknownNode(unit_id.to_string()))?;

    for object in pkg.unit_data_objects(unit_id)? {
        if pkg.touched_count(object.id()) > 1 {
            return Err(impossible(object.id()));
        }
        // A grouped object can only leave its group along with the group
        if let DataObjectRef::Binary(_) | DataObjectRef::Physical(_) = object {
            if let Some(group) = object.owning_group() {
                if !unit.data_objects().contains(group) {
                    return Err(impossible(object.id()));
                }
            }
        }
    }
    Ok(())
}

/// Units that normalization would rewrite, in natural id order, after
/// checking that each of them can be rewritten safely
pub fn verify_groups_mergeable(pkg: &DataObjectPackage) -> Result<Vec<String>> {
    count_references(pkg);
    let mut pending = Vec::new();
    for unit_id in pkg.sorted_unit_ids() {
        if needs_normalization(pkg, &unit_id)? {
            verify_unit(pkg, &unit_id)?;
            pending.push(unit_id);
        }
    }
    Ok(pending)
}

/// Give every unit a single data object group, merging the groups and
/// objects it references into a new one. Returns the number of units
/// rewritten. Nothing is changed when verification fails.
pub fn normalize_unique_data_object_groups(
    pkg: &mut DataObjectPackage,
    progress: &ProgressLogger,
) -> Result<usize> {
    progress.log(ProgressLevel::Step, "verifying data object groups", 0);
    let pending = verify_groups_mergeable(pkg)?;

    for (done, unit_id) in pending.iter().enumerate() {
        progress.node(done as u64 + 1, "units normalized")?;

        let references: Vec<String> = pkg
            .get_unit(unit_id)
            .map(|unit| unit.data_objects().ids().to_vec())
            .unwrap_or_default();
        let new_group = pkg.create_group();

        for id in &references {
            if pkg.get_group(id).is_some() {
                pkg.merge_group_into(id, &new_group)?;
            } else if pkg.get_binary(id).is_some() {
                pkg.add_binary_to_group(&new_group, id)?;
            } else {
                pkg.add_physical_to_group(&new_group, id)?;
            }
        }

        let unit = pkg.unit_mut_or_err(unit_id)?;
        unit.data_objects.clear();
        unit.data_objects.add(new_group);
    }

    progress.log(
        ProgressLevel::Step,
        "data object groups normalized",
        pending.len() as u64,
    );
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{BinaryDataObject, PhysicalDataObject};

    #[test]
    fn test_units_with_single_group_are_left_alone() {
        let mut pkg = DataObjectPackage::new();
        let unit = pkg.create_unit();
        let group = pkg.create_group();
        pkg.add_data_object_reference(&unit, &group).unwrap();
        let before = pkg.clone();
        assert_eq!(
            normalize_unique_data_object_groups(&mut pkg, &ProgressLogger::new()).unwrap(),
            0
        );
        assert_eq!(pkg, before);
    }

    #[test]
    fn test_mixed_references_merge_into_one_group() {
        let mut pkg = DataObjectPackage::new();
        let unit = pkg.create_unit();
        let group = pkg.create_group();
        let grouped = pkg.add_binary(BinaryDataObject::new()).unwrap();
        let loose = pkg.add_physical(PhysicalDataObject::new()).unwrap();
        pkg.add_binary_to_group(&group, &grouped).unwrap();
        pkg.add_data_object_reference(&unit, &group).unwrap();
        pkg.add_data_object_reference(&unit, &loose).unwrap();

        normalize_unique_data_object_groups(&mut pkg, &ProgressLogger::new()).unwrap();

        assert_eq!(pkg.group_count(), 1);
        let refs = pkg.get_unit(&unit).unwrap().data_objects().ids().to_vec();
        assert_eq!(refs.len(), 1);
        let new_group = pkg.get_group(&refs[0]).unwrap();
        assert_eq!(new_group.binaries().ids(), &[grouped.clone()]);
        assert_eq!(new_group.physicals().ids(), &[loose.clone()]);
        assert_eq!(pkg.get_physical(&loose).unwrap().group(), Some(refs[0].as_str()));
        assert!(crate::graph::verify_references(&pkg).is_ok());
    }

    #[test]
    fn test_object_taken_from_foreign_group_is_refused() {
        let mut pkg = DataObjectPackage::new();
        let owner = pkg.create_unit();
        let thief = pkg.create_unit();
        let group = pkg.create_group();
        let first = pkg.add_binary(BinaryDataObject::new()).unwrap();
        let second = pkg.add_binary(BinaryDataObject::new()).unwrap();
        pkg.add_binary_to_group(&group, &first).unwrap();
        pkg.add_binary_to_group(&group, &second).unwrap();
        pkg.add_data_object_reference(&owner, &group).unwrap();
        pkg.add_data_object_reference(&thief, &second).unwrap();

        let err = verify_groups_mergeable(&pkg).unwrap_err();
        assert!(matches!(err, SedaError::ImpossibleMerge { ref unit, .. } if *unit == thief));
    }

    #[test]
    fn test_loose_object_shared_by_two_units_is_refused() {
        let mut pkg = DataObjectPackage::new();
        let first = pkg.create_unit();
        let second = pkg.create_unit();
        let shared = pkg.add_binary(BinaryDataObject::new()).unwrap();
        pkg.add_data_object_reference(&first, &shared).unwrap();
        pkg.add_data_object_reference(&second, &shared).unwrap();
        let before = pkg.clone();

        let err = normalize_unique_data_object_groups(&mut pkg, &ProgressLogger::new())
            .unwrap_err();
        assert!(matches!(
            err,
            SedaError::ImpossibleMerge { ref unit, ref object } if *unit == first && *object == shared
        ));
        assert_eq!(pkg, before);
        assert_eq!(pkg.group_count(), 0);
    }

    #[test]
    fn test_cancellation_stops_normalization() {
        let mut pkg = DataObjectPackage::new();
        let unit = pkg.create_unit();
        let binary = pkg.add_binary(BinaryDataObject::new()).unwrap();
        pkg.add_data_object_reference(&unit, &binary).unwrap();

        let progress = ProgressLogger::new();
        progress.token().cancel();
        let err = normalize_unique_data_object_groups(&mut pkg, &progress).unwrap_err();
        assert!(err.is_cancelled());
    }
}
