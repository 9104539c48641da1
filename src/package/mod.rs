//! Package graph
//!
//! [`DataObjectPackage`] owns every node of a transfer package in four maps
//! keyed by id (units, groups, binary objects, physical objects). Nodes link
//! to each other by id only, through [`ReferenceList`]s, and the package
//! resolves those ids on demand. A virtual ghost root unit, never addressable
//! by id, lists the top-level units.
//!
//! Identifiers are unique across the four maps. Generated ids have the form
//! `ID<n>` with `n` starting at [`FIRST_GENERATED_ID`], the lower values
//! being reserved for header elements.

pub mod objects;
pub mod refs;
pub mod unit;

pub use objects::{
    BinaryDataObject, DataObjectGroup, FileInfo, FormatIdentification, GroupLink,
    PhysicalDataObject,
};
pub use refs::ReferenceList;
pub use unit::{ArchiveUnit, MetadataSlot};

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{Result, SedaError};

/// First numeric suffix used for generated ids; `ID0`..`ID9` are reserved
pub const FIRST_GENERATED_ID: u64 = 10;

/// Prefix of export-scoped reference ids
pub const REF_ID_PREFIX: &str = "REFID";

/// Compare ids by alphabetic prefix, then numerically by their digit suffix,
/// so that `ID9` sorts before `ID10`
pub fn natural_id_cmp(a: &str, b: &str) -> Ordering {
    fn split(id: &str) -> (&str, Option<u64>) {
        let digits = id.len() - id.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (prefix, number) = id.split_at(id.len() - digits);
        (prefix, number.parse().ok())
    }
    let (prefix_a, number_a) = split(a);
    let (prefix_b, number_b) = split(b);
    prefix_a
        .cmp(prefix_b)
        .then(number_a.cmp(&number_b))
        .then_with(|| a.cmp(b))
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort_by(|a, b| natural_id_cmp(a, b));
    keys
}

/// Borrowed view of any data object node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataObjectRef<'p> {
    Group(&'p DataObjectGroup),
    Binary(&'p BinaryDataObject),
    Physical(&'p PhysicalDataObject),
}

impl<'p> DataObjectRef<'p> {
    pub fn id(&self) -> &'p str {
        match self {
            DataObjectRef::Group(group) => group.id(),
            DataObjectRef::Binary(binary) => binary.id(),
            DataObjectRef::Physical(physical) => physical.id(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, DataObjectRef::Group(_))
    }

    /// Group the object belongs to; a group belongs to itself
    pub fn owning_group(&self) -> Option<&'p str> {
        match self {
            DataObjectRef::Group(group) => Some(group.id()),
            DataObjectRef::Binary(binary) => binary.group(),
            DataObjectRef::Physical(physical) => physical.group(),
        }
    }
}

/// The node graph of a transfer package
#[derive(Debug, Clone)]
pub struct DataObjectPackage {
    units: HashMap<String, ArchiveUnit>,
    groups: HashMap<String, DataObjectGroup>,
    binaries: HashMap<String, BinaryDataObject>,
    physicals: HashMap<String, PhysicalDataObject>,
    ghost_root: ArchiveUnit,
    id_counter: u64,
    ref_id_counter: Cell<u64>,
    in_out_counter: Cell<u64>,
    touched: RefCell<HashMap<String, usize>>,
    management_metadata_xml: Option<String>,
}

/// Compares graph content only; traversal and export counters are ignored
impl PartialEq for DataObjectPackage {
    fn eq(&self, other: &Self) -> bool {
        self.units == other.units
            && self.groups == other.groups
            && self.binaries == other.binaries
            && self.physicals == other.physicals
            && self.ghost_root == other.ghost_root
            && self.id_counter == other.id_counter
            && self.management_metadata_xml == other.management_metadata_xml
    }
}

impl Default for DataObjectPackage {
    fn default() -> Self {
        Self::new()
    }
}

impl DataObjectPackage {
    pub fn new() -> Self {
        Self {
            units: HashMap::new(),
            groups: HashMap::new(),
            binaries: HashMap::new(),
            physicals: HashMap::new(),
            ghost_root: ArchiveUnit::new(),
            id_counter: FIRST_GENERATED_ID,
            ref_id_counter: Cell::new(0),
            in_out_counter: Cell::new(0),
            touched: RefCell::new(HashMap::new()),
            management_metadata_xml: None,
        }
    }

    // ========== Ids ==========

    /// True if any node of any kind holds this id
    pub fn contains_id(&self, id: &str) -> bool {
        self.units.contains_key(id)
            || self.groups.contains_key(id)
            || self.binaries.contains_key(id)
            || self.physicals.contains_key(id)
    }

    /// Next free generated id
    pub(crate) fn allocate_id(&mut self) -> String {
        loop {
            let id = format!("ID{}", self.id_counter);
            self.id_counter += 1;
            if !self.contains_id(&id) {
                return id;
            }
        }
    }

    /// Keep a caller-supplied id after checking it is free, or allocate one
    fn claim_id(&mut self, id: &str) -> Result<String> {
        if id.is_empty() {
            Ok(self.allocate_id())
        } else if self.contains_id(id) {
            Err(SedaError::DuplicateId(id.to_string()))
        } else {
            Ok(id.to_string())
        }
    }

    pub fn id_counter(&self) -> u64 {
        self.id_counter
    }

    pub(crate) fn set_id_counter(&mut self, next: u64) {
        self.id_counter = next.max(FIRST_GENERATED_ID);
    }

    /// Next export-scoped reference id (`REFID<n>`)
    pub fn next_ref_id(&self) -> String {
        let next = self.ref_id_counter.get() + 1;
        self.ref_id_counter.set(next);
        format!("{}{}", REF_ID_PREFIX, next)
    }

    pub fn reset_ref_ids(&self) {
        self.ref_id_counter.set(0);
    }

    // ========== In/out progress counter ==========

    pub fn in_out_counter(&self) -> u64 {
        self.in_out_counter.get()
    }

    pub fn increment_in_out_counter(&self) -> u64 {
        let next = self.in_out_counter.get() + 1;
        self.in_out_counter.set(next);
        next
    }

    pub fn reset_in_out_counter(&self) {
        self.in_out_counter.set(0);
    }

    // ========== Touched map ==========

    /// Clear the touched map before a traversal
    pub fn reset_touched(&self) {
        self.touched.borrow_mut().clear();
    }

    /// Mark a node visited, returning false if it already was
    pub fn touch(&self, id: &str) -> bool {
        let mut touched = self.touched.borrow_mut();
        if touched.contains_key(id) {
            return false;
        }
        touched.insert(id.to_string(), 1);
        true
    }

    /// Increment the reference count of a node, returning the new count
    pub fn increment_touched(&self, id: &str) -> usize {
        let mut touched = self.touched.borrow_mut();
        let count = touched.entry(id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn touched_count(&self, id: &str) -> usize {
        self.touched.borrow().get(id).copied().unwrap_or(0)
    }

    pub fn is_touched(&self, id: &str) -> bool {
        self.touched.borrow().contains_key(id)
    }

    // ========== Adding nodes ==========

    /// Register a unit, allocating its id when empty. Returns the id.
    pub fn add_unit(&mut self, mut unit: ArchiveUnit) -> Result<String> {
        let id = self.claim_id(&unit.id)?;
        unit.id = id.clone();
        self.units.insert(id.clone(), unit);
        Ok(id)
    }

    pub fn add_group(&mut self, mut group: DataObjectGroup) -> Result<String> {
        let id = self.claim_id(&group.id)?;
        group.id = id.clone();
        self.groups.insert(id.clone(), group);
        Ok(id)
    }

    /// Register a binary object. Its group link is dropped; attach it with
    /// [`add_binary_to_group`](Self::add_binary_to_group).
    pub fn add_binary(&mut self, mut binary: BinaryDataObject) -> Result<String> {
        let id = self.claim_id(&binary.id)?;
        binary.id = id.clone();
        binary.group = None;
        self.binaries.insert(id.clone(), binary);
        Ok(id)
    }

    pub fn add_physical(&mut self, mut physical: PhysicalDataObject) -> Result<String> {
        let id = self.claim_id(&physical.id)?;
        physical.id = id.clone();
        physical.group = None;
        self.physicals.insert(id.clone(), physical);
        Ok(id)
    }

    /// New empty unit with a generated id
    pub fn create_unit(&mut self) -> String {
        let id = self.allocate_id();
        self.units.insert(id.clone(), ArchiveUnit::with_id(id.clone()));
        id
    }

    /// New empty group with a generated id
    pub fn create_group(&mut self) -> String {
        let id = self.allocate_id();
        self.groups
            .insert(id.clone(), DataObjectGroup::with_id(id.clone()));
        id
    }

    // ========== Lookup ==========

    pub fn get_unit(&self, id: &str) -> Option<&ArchiveUnit> {
        self.units.get(id)
    }

    pub fn get_unit_mut(&mut self, id: &str) -> Option<&mut ArchiveUnit> {
        self.units.get_mut(id)
    }

    pub fn get_group(&self, id: &str) -> Option<&DataObjectGroup> {
        self.groups.get(id)
    }

    pub fn get_group_mut(&mut self, id: &str) -> Option<&mut DataObjectGroup> {
        self.groups.get_mut(id)
    }

    pub fn get_binary(&self, id: &str) -> Option<&BinaryDataObject> {
        self.binaries.get(id)
    }

    pub fn get_binary_mut(&mut self, id: &str) -> Option<&mut BinaryDataObject> {
        self.binaries.get_mut(id)
    }

    pub fn get_physical(&self, id: &str) -> Option<&PhysicalDataObject> {
        self.physicals.get(id)
    }

    pub fn get_physical_mut(&mut self, id: &str) -> Option<&mut PhysicalDataObject> {
        self.physicals.get_mut(id)
    }

    /// Any data object by id, searching groups, then binary, then physical
    pub fn data_object(&self, id: &str) -> Option<DataObjectRef<'_>> {
        if let Some(group) = self.groups.get(id) {
            return Some(DataObjectRef::Group(group));
        }
        if let Some(binary) = self.binaries.get(id) {
            return Some(DataObjectRef::Binary(binary));
        }
        self.physicals.get(id).map(DataObjectRef::Physical)
    }

    pub(crate) fn unit_or_err(&self, id: &str) -> Result<&ArchiveUnit> {
        self.units
            .get(id)
            .ok_or_else(|| SedaError::UnknownNode(id.to_string()))
    }

    pub(crate) fn unit_mut_or_err(&mut self, id: &str) -> Result<&mut ArchiveUnit> {
        self.units
            .get_mut(id)
            .ok_or_else(|| SedaError::UnknownNode(id.to_string()))
    }

    pub fn units(&self) -> impl Iterator<Item = &ArchiveUnit> {
        self.units.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &DataObjectGroup> {
        self.groups.values()
    }

    pub fn binaries(&self) -> impl Iterator<Item = &BinaryDataObject> {
        self.binaries.values()
    }

    pub fn physicals(&self) -> impl Iterator<Item = &PhysicalDataObject> {
        self.physicals.values()
    }

    // ========== Counts and ordering ==========

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn binary_count(&self) -> usize {
        self.binaries.len()
    }

    pub fn physical_count(&self) -> usize {
        self.physicals.len()
    }

    pub fn sorted_unit_ids(&self) -> Vec<String> {
        sorted_keys(&self.units)
    }

    pub fn sorted_group_ids(&self) -> Vec<String> {
        sorted_keys(&self.groups)
    }

    pub fn sorted_binary_ids(&self) -> Vec<String> {
        sorted_keys(&self.binaries)
    }

    pub fn sorted_physical_ids(&self) -> Vec<String> {
        sorted_keys(&self.physicals)
    }

    // ========== Roots and links ==========

    /// The virtual unit whose children are the top-level units
    pub fn ghost_root(&self) -> &ArchiveUnit {
        &self.ghost_root
    }

    pub fn roots(&self) -> &[String] {
        self.ghost_root.children.ids()
    }

    pub fn add_root(&mut self, unit_id: &str) -> Result<()> {
        self.unit_or_err(unit_id)?;
        self.ghost_root.children.add(unit_id);
        Ok(())
    }

    pub fn unlink_root(&mut self, unit_id: &str) -> bool {
        self.ghost_root.children.remove(unit_id)
    }

    pub(crate) fn set_roots(&mut self, roots: ReferenceList) {
        self.ghost_root.children = roots;
    }

    pub fn add_child(&mut self, parent_id: &str, child_id: &str) -> Result<()> {
        self.unit_or_err(child_id)?;
        self.unit_mut_or_err(parent_id)?.children.add(child_id);
        Ok(())
    }

    pub fn unlink_child(&mut self, parent_id: &str, child_id: &str) -> Result<bool> {
        Ok(self.unit_mut_or_err(parent_id)?.children.remove(child_id))
    }

    /// Reference a group or data object from a unit
    pub fn add_data_object_reference(&mut self, unit_id: &str, object_id: &str) -> Result<()> {
        if self.data_object(object_id).is_none() {
            return Err(SedaError::UnknownNode(object_id.to_string()));
        }
        self.unit_mut_or_err(unit_id)?.data_objects.add(object_id);
        Ok(())
    }

    fn detach_from_group(&mut self, object_id: &str, group_id: Option<String>) {
        if let Some(group) = group_id.and_then(|id| self.groups.get_mut(&id)) {
            group.binaries.remove(object_id);
            group.physicals.remove(object_id);
        }
    }

    /// Put a binary object in a group, leaving any previous group
    pub fn add_binary_to_group(&mut self, group_id: &str, binary_id: &str) -> Result<()> {
        if !self.groups.contains_key(group_id) {
            return Err(SedaError::UnknownNode(group_id.to_string()));
        }
        let binary = self
            .binaries
            .get_mut(binary_id)
            .ok_or_else(|| SedaError::UnknownNode(binary_id.to_string()))?;
        let previous = binary.group.replace(group_id.to_string());
        if previous.as_deref() != Some(group_id) {
            self.detach_from_group(binary_id, previous);
        }
        if let Some(group) = self.groups.get_mut(group_id) {
            group.binaries.add(binary_id);
        }
        Ok(())
    }

    pub fn add_physical_to_group(&mut self, group_id: &str, physical_id: &str) -> Result<()> {
        if !self.groups.contains_key(group_id) {
            return Err(SedaError::UnknownNode(group_id.to_string()));
        }
        let physical = self
            .physicals
            .get_mut(physical_id)
            .ok_or_else(|| SedaError::UnknownNode(physical_id.to_string()))?;
        let previous = physical.group.replace(group_id.to_string());
        if previous.as_deref() != Some(group_id) {
            self.detach_from_group(physical_id, previous);
        }
        if let Some(group) = self.groups.get_mut(group_id) {
            group.physicals.add(physical_id);
        }
        Ok(())
    }

    /// Move every member of `absorbed` into `target`, point unit references
    /// at `target` and drop `absorbed` from the package
    pub fn merge_group_into(&mut self, absorbed_id: &str, target_id: &str) -> Result<()> {
        if absorbed_id == target_id {
            return Ok(());
        }
        if !self.groups.contains_key(target_id) {
            return Err(SedaError::UnknownNode(target_id.to_string()));
        }
        let absorbed = self
            .groups
            .remove(absorbed_id)
            .ok_or_else(|| SedaError::UnknownNode(absorbed_id.to_string()))?;

        for binary_id in absorbed.binaries.iter() {
            if let Some(binary) = self.binaries.get_mut(binary_id) {
                binary.group = Some(target_id.to_string());
            }
        }
        for physical_id in absorbed.physicals.iter() {
            if let Some(physical) = self.physicals.get_mut(physical_id) {
                physical.group = Some(target_id.to_string());
            }
        }
        if let Some(target) = self.groups.get_mut(target_id) {
            for binary_id in absorbed.binaries.iter() {
                target.binaries.add(binary_id);
            }
            for physical_id in absorbed.physicals.iter() {
                target.physicals.add(physical_id);
            }
        }
        for unit in self.units.values_mut() {
            unit.data_objects.replace(absorbed_id, target_id);
        }
        Ok(())
    }

    // ========== Removing nodes ==========

    /// Units (or the ghost root, as "root") listing `child_id` as a child
    pub fn parents_of(&self, child_id: &str) -> Vec<String> {
        let mut parents: Vec<String> = self
            .units
            .values()
            .filter(|unit| unit.children.contains(child_id))
            .map(|unit| unit.id.clone())
            .collect();
        parents.sort_by(|a, b| natural_id_cmp(a, b));
        if self.ghost_root.children.contains(child_id) {
            parents.insert(0, "root".to_string());
        }
        parents
    }

    /// Units referencing a data object or group
    pub fn referencing_units(&self, object_id: &str) -> Vec<String> {
        let mut units: Vec<String> = self
            .units
            .values()
            .filter(|unit| unit.data_objects.contains(object_id))
            .map(|unit| unit.id.clone())
            .collect();
        units.sort_by(|a, b| natural_id_cmp(a, b));
        units
    }

    /// Remove an unlinked unit. Fails while any unit or the root lists it.
    pub fn remove_unit(&mut self, id: &str) -> Result<ArchiveUnit> {
        if let Some(by) = self.parents_of(id).into_iter().next() {
            return Err(SedaError::StillReferenced {
                id: id.to_string(),
                by,
            });
        }
        self.units
            .remove(id)
            .ok_or_else(|| SedaError::UnknownNode(id.to_string()))
    }

    /// Remove an unreferenced group; its members become ungrouped
    pub fn remove_group(&mut self, id: &str) -> Result<DataObjectGroup> {
        if let Some(by) = self.referencing_units(id).into_iter().next() {
            return Err(SedaError::StillReferenced {
                id: id.to_string(),
                by,
            });
        }
        let group = self
            .groups
            .remove(id)
            .ok_or_else(|| SedaError::UnknownNode(id.to_string()))?;
        for binary_id in group.binaries.iter() {
            if let Some(binary) = self.binaries.get_mut(binary_id) {
                binary.group = None;
            }
        }
        for physical_id in group.physicals.iter() {
            if let Some(physical) = self.physicals.get_mut(physical_id) {
                physical.group = None;
            }
        }
        Ok(group)
    }

    fn object_holder(&self, id: &str, group: Option<&str>) -> Option<String> {
        group
            .map(str::to_string)
            .or_else(|| self.referencing_units(id).into_iter().next())
    }

    pub fn remove_binary(&mut self, id: &str) -> Result<BinaryDataObject> {
        let binary = self
            .binaries
            .get(id)
            .ok_or_else(|| SedaError::UnknownNode(id.to_string()))?;
        if let Some(by) = self.object_holder(id, binary.group()) {
            return Err(SedaError::StillReferenced {
                id: id.to_string(),
                by,
            });
        }
        self.binaries
            .remove(id)
            .ok_or_else(|| SedaError::UnknownNode(id.to_string()))
    }

    pub fn remove_physical(&mut self, id: &str) -> Result<PhysicalDataObject> {
        let physical = self
            .physicals
            .get(id)
            .ok_or_else(|| SedaError::UnknownNode(id.to_string()))?;
        if let Some(by) = self.object_holder(id, physical.group()) {
            return Err(SedaError::StillReferenced {
                id: id.to_string(),
                by,
            });
        }
        self.physicals
            .remove(id)
            .ok_or_else(|| SedaError::UnknownNode(id.to_string()))
    }

    /// Detach a member from its group so it can be removed
    pub fn ungroup(&mut self, object_id: &str) -> bool {
        let group = if let Some(binary) = self.binaries.get_mut(object_id) {
            binary.group.take()
        } else if let Some(physical) = self.physicals.get_mut(object_id) {
            physical.group.take()
        } else {
            None
        };
        let was_grouped = group.is_some();
        self.detach_from_group(object_id, group);
        was_grouped
    }

    // ========== Object views ==========

    /// Child units of a unit, failing on a dangling child id
    pub fn child_units(&self, unit_id: &str) -> Result<Vec<&ArchiveUnit>> {
        let unit = self.unit_or_err(unit_id)?;
        unit.children.resolve(unit_id, |id| self.units.get(id))
    }

    /// Top-level units
    pub fn root_units(&self) -> Result<Vec<&ArchiveUnit>> {
        self.ghost_root
            .children
            .resolve("root", |id| self.units.get(id))
    }

    /// Data objects referenced by a unit
    pub fn unit_data_objects(&self, unit_id: &str) -> Result<Vec<DataObjectRef<'_>>> {
        let unit = self.unit_or_err(unit_id)?;
        unit.data_objects.resolve(unit_id, |id| self.data_object(id))
    }

    /// Binary members of a group
    pub fn group_binaries(&self, group_id: &str) -> Result<Vec<&BinaryDataObject>> {
        let group = self
            .groups
            .get(group_id)
            .ok_or_else(|| SedaError::UnknownNode(group_id.to_string()))?;
        group.binaries.resolve(group_id, |id| self.binaries.get(id))
    }

    pub fn group_physicals(&self, group_id: &str) -> Result<Vec<&PhysicalDataObject>> {
        let group = self
            .groups
            .get(group_id)
            .ok_or_else(|| SedaError::UnknownNode(group_id.to_string()))?;
        group.physicals.resolve(group_id, |id| self.physicals.get(id))
    }

    // ========== Management metadata ==========

    /// Raw ManagementMetadata block of the package
    pub fn management_metadata_xml(&self) -> Option<&str> {
        self.management_metadata_xml.as_deref()
    }

    pub fn set_management_metadata_xml(&mut self, xml: Option<String>) {
        self.management_metadata_xml = xml;
    }

    // ========== Bulk replacement ==========

    /// Take every node out of the package, leaving it empty but keeping the
    /// id counter and management metadata
    pub(crate) fn take_nodes(&mut self) -> PackageNodes {
        PackageNodes {
            units: std::mem::take(&mut self.units),
            groups: std::mem::take(&mut self.groups),
            binaries: std::mem::take(&mut self.binaries),
            physicals: std::mem::take(&mut self.physicals),
            roots: std::mem::take(&mut self.ghost_root.children),
        }
    }

    /// Put nodes back as-is. Used to replace the node set wholesale once a
    /// computation over it has succeeded.
    pub(crate) fn put_nodes(&mut self, nodes: PackageNodes) {
        self.units = nodes.units;
        self.groups = nodes.groups;
        self.binaries = nodes.binaries;
        self.physicals = nodes.physicals;
        self.ghost_root.children = nodes.roots;
    }
}

impl DataObjectPackage {
    // Unchecked removals, for callers that verified the whole operation first

    pub(crate) fn take_unit(&mut self, id: &str) -> Option<ArchiveUnit> {
        self.units.remove(id)
    }

    pub(crate) fn take_group(&mut self, id: &str) -> Option<DataObjectGroup> {
        self.groups.remove(id)
    }

    pub(crate) fn take_binary(&mut self, id: &str) -> Option<BinaryDataObject> {
        self.binaries.remove(id)
    }

    pub(crate) fn take_physical(&mut self, id: &str) -> Option<PhysicalDataObject> {
        self.physicals.remove(id)
    }
}

/// Node maps moved out of a package for wholesale rewriting
#[derive(Debug, Default)]
pub(crate) struct PackageNodes {
    pub units: HashMap<String, ArchiveUnit>,
    pub groups: HashMap<String, DataObjectGroup>,
    pub binaries: HashMap<String, BinaryDataObject>,
    pub physicals: HashMap<String, PhysicalDataObject>,
    pub roots: ReferenceList,
}
