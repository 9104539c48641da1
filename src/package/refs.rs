//! Ordered id lists linking units to children and data objects

use std::collections::HashMap;

use crate::error::{Result, SedaError};

/// Ordered list of node ids.
///
/// Lists only ever store ids. The node view is computed on demand by
/// [`ReferenceList::resolve`] against the owning package, so an id that
/// points nowhere is only reported when it is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceList {
    ids: Vec<String>,
}

impl ReferenceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().collect()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
        self.ids.iter().map(String::as_str)
    }

    /// Append an id, ignoring it when already present
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Insert an id at `index` (clamped to the list length)
    pub fn insert(&mut self, index: usize, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            return false;
        }
        let index = index.min(self.ids.len());
        self.ids.insert(index, id);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        before != self.ids.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Replace `old` by `new` in place. When `new` is already listed the
    /// old entry is dropped instead, so the list stays duplicate free.
    pub fn replace(&mut self, old: &str, new: &str) -> bool {
        let Some(position) = self.ids.iter().position(|id| id == old) else {
            return false;
        };
        if old != new && self.contains(new) {
            self.ids.remove(position);
        } else {
            self.ids[position] = new.to_string();
        }
        true
    }

    /// Rewrite every id through `map`, keeping ids the map does not know
    pub fn rename_all(&mut self, map: &HashMap<String, String>) {
        for id in &mut self.ids {
            if let Some(new) = map.get(id.as_str()) {
                *id = new.clone();
            }
        }
    }

    /// Object view of the list: look every id up, failing on the first
    /// dangling one.
    pub fn resolve<T, F>(&self, owner: &str, lookup: F) -> Result<Vec<T>>
    where
        F: Fn(&str) -> Option<T>,
    {
        self.ids
            .iter()
            .map(|id| {
                lookup(id).ok_or_else(|| SedaError::DanglingReference {
                    from: owner.to_string(),
                    to: id.clone(),
                })
            })
            .collect()
    }
}

/// Collecting drops repeated ids, keeping the first occurrence
impl<S: Into<String>> FromIterator<S> for ReferenceList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        for id in iter {
            list.add(id);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_order_without_duplicates() {
        let mut list = ReferenceList::new();
        assert!(list.add("ID12"));
        assert!(list.add("ID10"));
        assert!(!list.add("ID12"));
        list.insert(0, "ID11");
        assert_eq!(list.ids(), &["ID11", "ID12", "ID10"]);
        assert_eq!(list.count(), 3);
    }

    #[test]
    fn test_collect_drops_repeated_ids() {
        let list: ReferenceList = ["ID4", "ID2", "ID4", "ID3", "ID2"].into_iter().collect();
        assert_eq!(list.ids(), &["ID4", "ID2", "ID3"]);
        assert_eq!(ReferenceList::from_ids(["ID1", "ID1"]).count(), 1);
    }

    #[test]
    fn test_iter_runs_both_ways() {
        let list: ReferenceList = ["ID1", "ID2", "ID3"].into_iter().collect();
        let reversed: Vec<&str> = list.iter().rev().collect();
        assert_eq!(reversed, vec!["ID3", "ID2", "ID1"]);
    }

    #[test]
    fn test_replace_and_remove() {
        let mut list: ReferenceList = ["ID1", "ID2", "ID3"].into_iter().collect();
        assert!(list.replace("ID2", "ID9"));
        assert_eq!(list.ids(), &["ID1", "ID9", "ID3"]);
        // Replacing by an id already present drops the old entry
        assert!(list.replace("ID1", "ID3"));
        assert_eq!(list.ids(), &["ID9", "ID3"]);
        assert!(list.remove("ID9"));
        assert!(!list.remove("ID9"));
    }

    #[test]
    fn test_resolve_reports_dangling_id() {
        let list: ReferenceList = ["ID1", "ID2"].into_iter().collect();
        let known: HashMap<&str, u32> = HashMap::from([("ID1", 1)]);
        let err = list
            .resolve("ID10", |id| known.get(id).copied())
            .unwrap_err();
        assert!(matches!(err, SedaError::DanglingReference { ref to, .. } if to == "ID2"));

        let ok: ReferenceList = ["ID1"].into_iter().collect();
        assert_eq!(ok.resolve("ID10", |id| known.get(id).copied()).unwrap(), vec![1]);
    }

    #[test]
    fn test_ids_survive_object_round_trip() {
        let list: ReferenceList = ["ID3", "ID1", "ID2"].into_iter().collect();
        let nodes: HashMap<String, String> = list
            .iter()
            .map(|id| (id.to_string(), format!("node {}", id)))
            .collect();
        let objects = list.resolve("root", |id| nodes.get_key_value(id)).unwrap();
        let back: ReferenceList = objects.into_iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(back, list);
    }
}
