//! Manifest import

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{Result, SedaError};
use crate::graph::{check_cycles, verify_references};
use crate::metadata::SedaDateTime;
use crate::package::{
    ArchiveUnit, BinaryDataObject, DataObjectGroup, DataObjectPackage, GroupLink, PhysicalDataObject,
    ReferenceList,
};
use crate::progress::{ProgressLevel, ProgressLogger};
use crate::version::SedaVersion;
use crate::xml::SedaXmlReader;

use super::{ArchiveTransfer, GlobalMetadata, ImportOptions};

/// Group link of an object, resolved once the whole object section is read
struct PendingLink {
    object_id: String,
    physical: bool,
    link: GroupLink,
}

/// Reader state shared by the body parsers
struct Importer<'r, 'a> {
    reader: &'r mut SedaXmlReader<'a>,
    pkg: DataObjectPackage,
    progress: &'r ProgressLogger,
}

pub(super) fn read_transfer(xml: &str, options: &ImportOptions, progress: &ProgressLogger) -> Result<ArchiveTransfer> {
    progress.log(ProgressLevel::Global, "import of archive transfer started", 0);
    let mut reader = SedaXmlReader::new(xml);

    let root = reader.next_mandatory_block("ArchiveTransfer")?;
    let declared = root
        .iter()
        .filter(|(key, _)| *key == "xmlns" || key.starts_with("xmlns:"))
        .find_map(|(_, namespace)| SedaVersion::from_namespace(namespace));
    let version = match (options.version, declared) {
        (Some(requested), Some(declared)) if requested != declared => {
            warn!(%requested, %declared, "manifest namespace differs from requested version");
            requested
        }
        (Some(requested), _) => requested,
        (None, Some(declared)) => declared,
        (None, None) => {
            warn!(
                namespace = root.get("xmlns").unwrap_or_default(),
                "unknown manifest namespace, reading as {}",
                SedaVersion::default()
            );
            SedaVersion::default()
        }
    };

    let mut global = read_header_leniently(&mut reader)?;

    let mut importer = Importer {
        reader: &mut reader,
        pkg: DataObjectPackage::new(),
        progress,
    };
    importer.pkg.reset_in_out_counter();
    importer.read_package()?;
    importer.read_footer(&mut global)?;
    let Importer { pkg, .. } = importer;

    reader.end_block_named("ArchiveTransfer")?;
    reader.expect_end_of_document()?;

    verify_references(&pkg)?;
    if options.check_cycles {
        check_cycles(&pkg)?;
    }
    progress.log(
        ProgressLevel::Global,
        "import of archive transfer finished",
        pkg.in_out_counter(),
    );

    Ok(ArchiveTransfer {
        version,
        global_metadata: (!global.is_empty()).then_some(global),
        package: pkg,
    })
}

// =============================================================================
// Header
// =============================================================================

/// Header elements, strictly in manifest order, up to DataObjectPackage
fn read_header(reader: &mut SedaXmlReader<'_>) -> Result<GlobalMetadata> {
    let mut global = GlobalMetadata::default();
    while let Some(comment) = reader.next_value_if_named("Comment")? {
        global.comments.push(comment);
    }
    global.date = reader
        .next_value_if_named("Date")?
        .map(|date| SedaDateTime::parse("Date", &date))
        .transpose()?;
    global.message_identifier = reader.next_value_if_named("MessageIdentifier")?;
    global.signature_xml = reader.next_block_as_string_if_named("Signature")?;
    global.archival_agreement = reader.next_value_if_named("ArchivalAgreement")?;
    global.code_list_versions_xml = reader.next_block_as_string_if_named("CodeListVersions")?;

    match reader.peek_name()? {
        Some("DataObjectPackage") => Ok(global),
        Some(other) => Err(SedaError::UnexpectedElement {
            expected: "<DataObjectPackage> after transfer header".to_string(),
            found: format!("<{}>", other),
        }),
        None => Ok(global),
    }
}

/// Header read that falls back to an empty header, skipping to the package
/// body, when the header is malformed
fn read_header_leniently(reader: &mut SedaXmlReader<'_>) -> Result<GlobalMetadata> {
    let mark = reader.mark();
    match read_header(reader) {
        Ok(global) => Ok(global),
        Err(e) => {
            warn!(error = %e, "transfer header ignored");
            reader.reset(mark);
            while let Some(name) = reader.peek_name()? {
                if name == "DataObjectPackage" {
                    break;
                }
                reader.skip_block()?;
            }
            Ok(GlobalMetadata::default())
        }
    }
}

// =============================================================================
// Package body
// =============================================================================

impl<'r, 'a> Importer<'r, 'a> {
    fn counted(&self, message: &str) -> Result<()> {
        let count = self.pkg.increment_in_out_counter();
        self.progress.node(count, message)
    }

    fn read_package(&mut self) -> Result<()> {
        self.reader.next_mandatory_block("DataObjectPackage")?;

        let pending = self.read_data_objects()?;
        self.resolve_group_links(pending)?;
        self.progress
            .log(ProgressLevel::Step, "data objects imported", self.pkg.in_out_counter());

        if self.reader.next_block_if_named("DescriptiveMetadata")?.is_some() {
            let mut top_level = Vec::new();
            while self.reader.peek_block_if_named("ArchiveUnit")? {
                top_level.push(self.read_unit()?);
            }
            self.reader.end_block_named("DescriptiveMetadata")?;
            self.infer_roots(top_level);
        }
        self.progress
            .log(ProgressLevel::Step, "archive units imported", self.pkg.unit_count() as u64);

        let management = self.reader.next_block_as_string_if_named("ManagementMetadata")?;
        self.pkg.set_management_metadata_xml(management);
        self.reader.end_block_named("DataObjectPackage")
    }

    fn read_data_objects(&mut self) -> Result<Vec<PendingLink>> {
        let mut pending = Vec::new();
        loop {
            match self.reader.peek_name()? {
                Some("DataObjectGroup") => self.read_group()?,
                Some("BinaryDataObject") => {
                    let (id, link) = self.read_binary()?;
                    pending.push(PendingLink {
                        object_id: id,
                        physical: false,
                        link,
                    });
                }
                Some("PhysicalDataObject") => {
                    let (id, link) = self.read_physical()?;
                    pending.push(PendingLink {
                        object_id: id,
                        physical: true,
                        link,
                    });
                }
                _ => return Ok(pending),
            }
        }
    }

    fn read_binary(&mut self) -> Result<(String, GroupLink)> {
        let attributes = self.reader.next_mandatory_block("BinaryDataObject")?;
        let xml_id = attributes.id().unwrap_or_default().to_string();
        let (binary, link) =
            BinaryDataObject::read_body(self.reader, &xml_id).map_err(|e| SedaError::in_node(&xml_id, e))?;
        let id = self.pkg.add_binary(binary)?;
        self.counted("data objects imported")?;
        Ok((id, link))
    }

    fn read_physical(&mut self) -> Result<(String, GroupLink)> {
        let attributes = self.reader.next_mandatory_block("PhysicalDataObject")?;
        let xml_id = attributes.id().unwrap_or_default().to_string();
        let (physical, link) =
            PhysicalDataObject::read_body(self.reader, &xml_id).map_err(|e| SedaError::in_node(&xml_id, e))?;
        let id = self.pkg.add_physical(physical)?;
        self.counted("data objects imported")?;
        Ok((id, link))
    }

    /// A DataObjectGroup element with its members inline
    fn read_group(&mut self) -> Result<()> {
        let attributes = self.reader.next_mandatory_block("DataObjectGroup")?;
        let xml_id = attributes.id().unwrap_or_default().to_string();
        let group_id = self.pkg.add_group(DataObjectGroup::with_id(xml_id))?;
        self.counted("data objects imported")?;

        loop {
            match self.reader.peek_name()? {
                Some("BinaryDataObject") => {
                    let (id, _) = self.read_binary()?;
                    self.pkg.add_binary_to_group(&group_id, &id)?;
                }
                Some("PhysicalDataObject") => {
                    let (id, _) = self.read_physical()?;
                    self.pkg.add_physical_to_group(&group_id, &id)?;
                }
                Some("LogBook") => {
                    let log_book = self.reader.next_block_as_string()?;
                    if let Some(group) = self.pkg.get_group_mut(&group_id) {
                        group.log_book_xml = Some(log_book);
                    }
                }
                _ => break,
            }
        }
        self.reader
            .end_block_named("DataObjectGroup")
            .map_err(|e| SedaError::in_node(&group_id, e))
    }

    /// Attach ungrouped objects to the groups they name. A declaring object
    /// creates its group when no other object did.
    fn resolve_group_links(&mut self, pending: Vec<PendingLink>) -> Result<()> {
        for entry in &pending {
            if let GroupLink::Declared(group_id) = &entry.link {
                if self.pkg.get_group(group_id).is_none() {
                    self.pkg.add_group(DataObjectGroup::with_id(group_id.clone()))?;
                }
            }
        }
        for entry in pending {
            let group_id = match entry.link {
                GroupLink::None => continue,
                GroupLink::Reference(id) | GroupLink::Declared(id) => id,
            };
            if self.pkg.get_group(&group_id).is_none() {
                return Err(SedaError::DanglingReference {
                    from: entry.object_id,
                    to: group_id,
                });
            }
            if entry.physical {
                self.pkg.add_physical_to_group(&group_id, &entry.object_id)?;
            } else {
                self.pkg.add_binary_to_group(&group_id, &entry.object_id)?;
            }
        }
        Ok(())
    }

    /// Read an ArchiveUnit element and everything nested in it. Returns the
    /// id its parent should list: the unit's own id, or the target of an
    /// ArchiveUnitRefId placeholder.
    fn read_unit(&mut self) -> Result<String> {
        let attributes = self.reader.next_mandatory_block("ArchiveUnit")?;
        let xml_id = attributes.id().unwrap_or_default().to_string();
        self.read_unit_body(xml_id.clone())
            .map_err(|e| SedaError::in_node(if xml_id.is_empty() { "ArchiveUnit" } else { xml_id.as_str() }, e))
    }

    fn read_unit_body(&mut self, xml_id: String) -> Result<String> {
        if let Some(target) = self.reader.next_value_if_named("ArchiveUnitRefId")? {
            self.reader.end_block_named("ArchiveUnit")?;
            return Ok(target.trim().to_string());
        }

        let mut unit = ArchiveUnit::with_id(xml_id);
        if let Some(raw) = self.reader.next_block_as_string_if_named("ArchiveUnitProfile")? {
            unit.set_archive_unit_profile_xml(raw);
        }
        if let Some(raw) = self.reader.next_block_as_string_if_named("Management")? {
            unit.set_management_xml(raw);
        }
        if let Some(raw) = self.reader.next_block_as_string_if_named("Content")? {
            unit.set_content_xml(raw);
        }

        loop {
            match self.reader.peek_name()? {
                Some("ArchiveUnit") => {
                    let child = self.read_unit()?;
                    unit.children.add(child);
                }
                Some("DataObjectReference") => {
                    let object = self.read_data_object_reference()?;
                    unit.data_objects.add(object);
                }
                Some(other) => {
                    return Err(SedaError::UnexpectedElement {
                        expected: "<ArchiveUnit> or <DataObjectReference>".to_string(),
                        found: format!("<{}>", other),
                    })
                }
                None => break,
            }
        }
        self.reader.end_block_named("ArchiveUnit")?;

        let id = self.pkg.add_unit(unit)?;
        self.counted("archive units imported")?;
        Ok(id)
    }

    fn read_data_object_reference(&mut self) -> Result<String> {
        self.reader.next_mandatory_block("DataObjectReference")?;
        let target = match self.reader.next_value_if_named("DataObjectReferenceId")? {
            Some(id) => id,
            None => self.reader.next_value_if_named("DataObjectGroupReferenceId")?.ok_or_else(|| {
                SedaError::MissingElement {
                    element: "DataObjectReferenceId".to_string(),
                    context: "DataObjectReference".to_string(),
                }
            })?,
        };
        self.reader.end_block_named("DataObjectReference")?;
        Ok(target.trim().to_string())
    }

    /// Top-level units not listed as a child elsewhere become the roots, in
    /// document order
    fn infer_roots(&mut self, top_level: Vec<String>) {
        let listed: HashSet<&str> = self
            .pkg
            .units()
            .flat_map(|unit| unit.children().iter())
            .collect();
        let roots: ReferenceList = top_level
            .iter()
            .filter(|id| !listed.contains(id.as_str()))
            .map(String::as_str)
            .collect();
        debug!(roots = roots.count(), "roots inferred");
        self.pkg.set_roots(roots);
    }

    // =========================================================================
    // Footer
    // =========================================================================

    fn read_footer(&mut self, global: &mut GlobalMetadata) -> Result<()> {
        while let Some(raw) = self.reader.next_block_as_string_if_named("RelatedTransferReference")? {
            global.related_transfer_references_xml.push(raw);
        }
        global.transfer_request_reply_identifier =
            self.reader.next_value_if_named("TransferRequestReplyIdentifier")?;
        if self.reader.next_block_if_named("ArchivalAgency")?.is_some() {
            let (identifier, descriptive) = self.read_agency("ArchivalAgency")?;
            global.archival_agency_identifier = Some(identifier);
            global.archival_agency_organization_descriptive_metadata_xml = descriptive;
        }
        if self.reader.next_block_if_named("TransferringAgency")?.is_some() {
            let (identifier, descriptive) = self.read_agency("TransferringAgency")?;
            global.transferring_agency_identifier = Some(identifier);
            global.transferring_agency_organization_descriptive_metadata_xml = descriptive;
        }
        Ok(())
    }

    fn read_agency(&mut self, name: &str) -> Result<(String, Option<String>)> {
        let identifier = self.reader.next_mandatory_value("Identifier")?;
        let descriptive = self
            .reader
            .next_block_as_string_if_named("OrganizationDescriptiveMetadata")?;
        self.reader.end_block_named(name)?;
        Ok((identifier.trim().to_string(), descriptive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ArchiveTransfer xmlns="fr:gouv:culture:archivesdefrance:seda:v2.1">
  <Comment>Test transfer</Comment>
  <Date>2024-03-01T10:00:00</Date>
  <MessageIdentifier>MSG-1</MessageIdentifier>
  <ArchivalAgreement>AGR-1</ArchivalAgreement>
  <CodeListVersions><ReplyCodeListVersion>v1</ReplyCodeListVersion></CodeListVersions>
  <DataObjectPackage>
    <DataObjectGroup id="ID4">
      <BinaryDataObject id="ID5"><Uri>content/ID5.pdf</Uri></BinaryDataObject>
    </DataObjectGroup>
    <PhysicalDataObject id="ID6"><DataObjectGroupId>ID7</DataObjectGroupId><PhysicalId>B-12</PhysicalId></PhysicalDataObject>
    <DescriptiveMetadata>
      <ArchiveUnit id="ID1">
        <Content><Title>Root</Title></Content>
        <ArchiveUnit id="ID2">
          <Content><Title>Child</Title></Content>
          <DataObjectReference><DataObjectGroupReferenceId>ID4</DataObjectGroupReferenceId></DataObjectReference>
        </ArchiveUnit>
        <DataObjectReference><DataObjectReferenceId>ID6</DataObjectReferenceId></DataObjectReference>
      </ArchiveUnit>
    </DescriptiveMetadata>
    <ManagementMetadata><OriginatingAgencyIdentifier>ORIG</OriginatingAgencyIdentifier></ManagementMetadata>
  </DataObjectPackage>
  <ArchivalAgency><Identifier>ARCH</Identifier></ArchivalAgency>
  <TransferringAgency><Identifier>TRANS</Identifier></TransferringAgency>
</ArchiveTransfer>"#;

    #[test]
    fn test_read_minimal_transfer() {
        let transfer = read_transfer(MINIMAL, &ImportOptions::default(), &ProgressLogger::new()).unwrap();
        assert_eq!(transfer.version, SedaVersion::V2_1);

        let global = transfer.global_metadata.as_ref().unwrap();
        assert_eq!(global.comments, vec!["Test transfer"]);
        assert_eq!(global.message_identifier.as_deref(), Some("MSG-1"));
        assert_eq!(global.archival_agency_identifier.as_deref(), Some("ARCH"));
        assert_eq!(global.transferring_agency_identifier.as_deref(), Some("TRANS"));

        let pkg = &transfer.package;
        assert_eq!(pkg.roots(), &["ID1"]);
        assert_eq!(pkg.get_unit("ID1").unwrap().children().ids(), &["ID2"]);
        assert_eq!(pkg.get_group("ID4").unwrap().binaries().ids(), &["ID5"]);
        assert_eq!(pkg.get_physical("ID6").unwrap().group(), Some("ID7"));
        assert!(pkg.management_metadata_xml().unwrap().contains("ORIG"));
    }

    #[test]
    fn test_namespace_selects_version() {
        let xml = MINIMAL.replace("seda:v2.1", "seda:v2.2");
        let transfer = read_transfer(&xml, &ImportOptions::default(), &ProgressLogger::new()).unwrap();
        assert_eq!(transfer.version, SedaVersion::V2_2);
    }

    #[test]
    fn test_malformed_header_is_dropped() {
        let xml = MINIMAL.replace("2024-03-01T10:00:00", "yesterday");
        let transfer = read_transfer(&xml, &ImportOptions::default(), &ProgressLogger::new()).unwrap();
        let global = transfer.global_metadata.unwrap();
        assert!(global.comments.is_empty());
        assert!(global.message_identifier.is_none());
        assert_eq!(global.archival_agency_identifier.as_deref(), Some("ARCH"));
        assert_eq!(transfer.package.unit_count(), 2);
    }

    #[test]
    fn test_body_errors_are_fatal() {
        let xml = MINIMAL.replace("<Uri>content/ID5.pdf</Uri>", "<Size>big</Size>");
        let err = read_transfer(&xml, &ImportOptions::default(), &ProgressLogger::new()).unwrap_err();
        assert!(matches!(err.root_cause(), SedaError::InvalidValue { element, .. } if element == "Size"));
    }

    #[test]
    fn test_unknown_group_reference() {
        let xml = MINIMAL.replace(
            "<DataObjectGroupId>ID7</DataObjectGroupId>",
            "<DataObjectGroupReferenceId>ID99</DataObjectGroupReferenceId>",
        );
        let err = read_transfer(&xml, &ImportOptions::default(), &ProgressLogger::new()).unwrap_err();
        assert!(matches!(err, SedaError::DanglingReference { ref to, .. } if to == "ID99"));
    }

    #[test]
    fn test_placeholder_links_existing_unit() {
        let xml = MINIMAL.replace(
            "<DataObjectReference><DataObjectReferenceId>ID6",
            "<ArchiveUnit id=\"REFID1\"><ArchiveUnitRefId>ID2</ArchiveUnitRefId></ArchiveUnit>\
             <DataObjectReference><DataObjectReferenceId>ID6",
        );
        let transfer = read_transfer(&xml, &ImportOptions::default(), &ProgressLogger::new()).unwrap();
        assert_eq!(transfer.package.unit_count(), 2);
        assert_eq!(transfer.package.get_unit("ID1").unwrap().children().ids(), &["ID2"]);
    }

    #[test]
    fn test_repeated_top_level_unit_is_one_root() {
        let xml = MINIMAL.replace(
            "</ArchiveUnit>\n    </DescriptiveMetadata>",
            "</ArchiveUnit>\n      <ArchiveUnit id=\"REFID1\"><ArchiveUnitRefId>ID1</ArchiveUnitRefId></ArchiveUnit>\n    </DescriptiveMetadata>",
        );
        assert!(xml.contains("<ArchiveUnitRefId>ID1</ArchiveUnitRefId>"));
        let transfer = read_transfer(&xml, &ImportOptions::default(), &ProgressLogger::new()).unwrap();
        assert_eq!(transfer.package.roots(), &["ID1"]);
    }

    #[test]
    fn test_long_flat_chain_has_single_root() {
        let count = 3000;
        let mut units = String::new();
        for n in 0..count {
            units.push_str(&format!("<ArchiveUnit id=\"ID{}\">", 100 + n));
            if n + 1 < count {
                units.push_str(&format!(
                    "<ArchiveUnit id=\"REFID{0}\"><ArchiveUnitRefId>ID{1}</ArchiveUnitRefId></ArchiveUnit>",
                    n + 1,
                    101 + n
                ));
            }
            units.push_str("</ArchiveUnit>");
        }
        let xml = format!(
            "<ArchiveTransfer xmlns=\"fr:gouv:culture:archivesdefrance:seda:v2.1\"><DataObjectPackage>\
             <DescriptiveMetadata>{}</DescriptiveMetadata></DataObjectPackage></ArchiveTransfer>",
            units
        );
        let options = ImportOptions {
            check_cycles: false,
            ..ImportOptions::default()
        };
        let transfer = read_transfer(&xml, &options, &ProgressLogger::new()).unwrap();
        assert_eq!(transfer.package.unit_count(), count);
        assert_eq!(transfer.package.roots(), &["ID100"]);
    }
}
