//! Cycle detection in the unit tree

use crate::error::{Result, SedaError};
use crate::package::DataObjectPackage;

/// Depth-first walk from the roots. Fails on the first unit met again
/// while still on the current path, reporting the chain of ids from that
/// unit back to itself. Fully explored units are skipped through the
/// touched map. Does not modify the graph.
pub fn check_cycles(pkg: &DataObjectPackage) -> Result<()> {
    pkg.reset_touched();
    let mut path: Vec<String> = Vec::new();
    for root in pkg.roots() {
        visit(pkg, root, "root", &mut path)?;
    }
    tracing::debug!(units = pkg.unit_count(), "no cycle in unit tree");
    Ok(())
}

fn visit(pkg: &DataObjectPackage, id: &str, parent: &str, path: &mut Vec<String>) -> Result<()> {
    if let Some(start) = path.iter().position(|on_path| on_path == id) {
        let mut chain = path[start..].to_vec();
        chain.push(id.to_string());
        return Err(SedaError::Cycle {
            path: chain.join(" -> "),
        });
    }
    if pkg.is_touched(id) {
        return Ok(());
    }
    let unit = pkg.get_unit(id).ok_or_else(|| SedaError::DanglingReference {
        from: parent.to_string(),
        to: id.to_string(),
    })?;

    path.push(id.to_string());
    for child in unit.children().iter() {
        visit(pkg, child, id, path)?;
    }
    path.pop();
    pkg.touch(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(pkg: &mut DataObjectPackage, length: usize) -> Vec<String> {
        let ids: Vec<String> = (0..length).map(|_| pkg.create_unit()).collect();
        pkg.add_root(&ids[0]).unwrap();
        for pair in ids.windows(2) {
            pkg.add_child(&pair[0], &pair[1]).unwrap();
        }
        ids
    }

    #[test]
    fn test_acyclic_with_shared_child() {
        let mut pkg = DataObjectPackage::new();
        let ids = chain(&mut pkg, 3);
        let other = pkg.create_unit();
        pkg.add_root(&other).unwrap();
        pkg.add_child(&other, &ids[2]).unwrap();
        assert!(check_cycles(&pkg).is_ok());
    }

    #[test]
    fn test_back_edge_reports_path() {
        let mut pkg = DataObjectPackage::new();
        let ids = chain(&mut pkg, 3);
        pkg.add_child(&ids[2], &ids[1]).unwrap();
        let err = check_cycles(&pkg).unwrap_err();
        match err {
            SedaError::Cycle { path } => {
                assert_eq!(path, format!("{0} -> {1} -> {0}", ids[1], ids[2]));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_check_does_not_modify_graph() {
        let mut pkg = DataObjectPackage::new();
        let ids = chain(&mut pkg, 2);
        pkg.add_child(&ids[1], &ids[0]).unwrap();
        let units_before: Vec<_> = pkg.sorted_unit_ids();
        assert!(check_cycles(&pkg).is_err());
        assert_eq!(pkg.sorted_unit_ids(), units_before);
        assert_eq!(pkg.get_unit(&ids[1]).unwrap().children().ids(), &[ids[0].clone()]);
    }
}
