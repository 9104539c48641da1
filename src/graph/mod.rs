//! Graph algorithms over a [`DataObjectPackage`]
//!
//! Every algorithm that rewrites the package runs its verification pass to
//! completion first and only then mutates, so a failed call leaves the
//! package exactly as it was.

pub mod analysis;
pub mod cycles;
pub mod normalize;
pub mod regenerate;
pub mod relocate;

pub use analysis::{cycle_groups, statistics, PackageStatistics};
pub use cycles::check_cycles;
pub use normalize::{normalize_unique_data_object_groups, verify_groups_mergeable};
pub use regenerate::regenerate_continuous_ids;
pub use relocate::move_unit_tree;

use crate::error::{Result, SedaError};
use crate::package::DataObjectPackage;

/// Check that every stored id resolves and that group membership is
/// recorded consistently on both sides
pub fn verify_references(pkg: &DataObjectPackage) -> Result<()> {
    pkg.root_units()?;

    for unit_id in pkg.sorted_unit_ids() {
        pkg.child_units(&unit_id)?;
        pkg.unit_data_objects(&unit_id)?;
    }

    for group_id in pkg.sorted_group_ids() {
        for binary in pkg.group_binaries(&group_id)? {
            if binary.group() != Some(group_id.as_str()) {
                return Err(SedaError::DanglingReference {
                    from: binary.id().to_string(),
                    to: group_id.clone(),
                });
            }
        }
        for physical in pkg.group_physicals(&group_id)? {
            if physical.group() != Some(group_id.as_str()) {
                return Err(SedaError::DanglingReference {
                    from: physical.id().to_string(),
                    to: group_id.clone(),
                });
            }
        }
    }

    let members = pkg
        .binaries()
        .map(|b| (b.id(), b.group()))
        .chain(pkg.physicals().map(|p| (p.id(), p.group())));
    for (id, group) in members {
        if let Some(group_id) = group {
            let listed = pkg
                .get_group(group_id)
                .map(|g| g.binaries().contains(id) || g.physicals().contains(id))
                .unwrap_or(false);
            if !listed {
                return Err(SedaError::DanglingReference {
                    from: id.to_string(),
                    to: group_id.to_string(),
                });
            }
        }
    }
    Ok(())
}
