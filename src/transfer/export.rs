//! Manifest export

use crate::error::{Result, SedaError};
use crate::package::{natural_id_cmp, DataObjectPackage, DataObjectRef};
use crate::progress::{ProgressLevel, ProgressLogger};
use crate::xml::SedaXmlWriter;

use super::{ArchiveTransfer, ExportOptions, GlobalMetadata, UnitLayout};

struct Exporter<'p> {
    writer: SedaXmlWriter,
    pkg: &'p DataObjectPackage,
    progress: &'p ProgressLogger,
}

pub(super) fn write_transfer(
    transfer: &ArchiveTransfer,
    options: &ExportOptions,
    progress: &ProgressLogger,
) -> Result<String> {
    let version = options.version.unwrap_or(transfer.version);
    progress.log(ProgressLevel::Global, "export of archive transfer started", 0);

    let pkg = &transfer.package;
    pkg.reset_ref_ids();
    pkg.reset_in_out_counter();

    let mut exporter = Exporter {
        writer: SedaXmlWriter::new(options.indented).with_xml_id_attributes(options.xml_id_attributes),
        pkg,
        progress,
    };
    exporter.writer.write_start_document()?;
    exporter.writer.write_root_start("ArchiveTransfer", version)?;
    if let Some(global) = &transfer.global_metadata {
        exporter.write_header(global)?;
    }
    exporter.write_package(options.layout)?;
    if let Some(global) = &transfer.global_metadata {
        exporter.write_footer(global)?;
    }
    exporter.writer.write_end_element()?;

    progress.log(
        ProgressLevel::Global,
        "export of archive transfer finished",
        pkg.in_out_counter(),
    );
    exporter.writer.finish()
}

impl<'p> Exporter<'p> {
    fn counted(&self, message: &str) -> Result<()> {
        let count = self.pkg.increment_in_out_counter();
        self.progress.node(count, message)
    }

    // ========== Header and footer ==========

    fn write_header(&mut self, global: &GlobalMetadata) -> Result<()> {
        let w = &mut self.writer;
        for comment in &global.comments {
            w.write_element_value("Comment", comment)?;
        }
        if let Some(date) = &global.date {
            w.write_element_value("Date", &date.to_string())?;
        }
        w.write_element_value_if_not_empty("MessageIdentifier", global.message_identifier.as_deref())?;
        w.write_raw_xml_block_if_not_empty(global.signature_xml.as_deref())?;
        w.write_element_value_if_not_empty("ArchivalAgreement", global.archival_agreement.as_deref())?;
        w.write_raw_xml_block_if_not_empty(global.code_list_versions_xml.as_deref())
    }

    fn write_footer(&mut self, global: &GlobalMetadata) -> Result<()> {
        for raw in &global.related_transfer_references_xml {
            self.writer.write_raw_xml_block_if_not_empty(Some(raw))?;
        }
        self.writer.write_element_value_if_not_empty(
            "TransferRequestReplyIdentifier",
            global.transfer_request_reply_identifier.as_deref(),
        )?;
        self.write_agency(
            "ArchivalAgency",
            global.archival_agency_identifier.as_deref(),
            global
                .archival_agency_organization_descriptive_metadata_xml
                .as_deref(),
        )?;
        self.write_agency(
            "TransferringAgency",
            global.transferring_agency_identifier.as_deref(),
            global
                .transferring_agency_organization_descriptive_metadata_xml
                .as_deref(),
        )
    }

    fn write_agency(&mut self, name: &str, identifier: Option<&str>, descriptive: Option<&str>) -> Result<()> {
        let Some(identifier) = identifier else {
            return Ok(());
        };
        self.writer.write_start_element(name)?;
        self.writer.write_element_value("Identifier", identifier)?;
        self.writer.write_raw_xml_block_if_not_empty(descriptive)?;
        self.writer.write_end_element()
    }

    // ========== Package body ==========

    fn write_package(&mut self, layout: UnitLayout) -> Result<()> {
        self.writer.write_start_element("DataObjectPackage")?;
        self.write_data_objects()?;
        self.progress
            .log(ProgressLevel::Step, "data objects exported", self.pkg.in_out_counter());

        self.writer.write_start_element("DescriptiveMetadata")?;
        match layout {
            UnitLayout::Imbricate => self.write_imbricate_units()?,
            UnitLayout::Flat => self.write_flat_units()?,
        }
        self.writer.write_end_element()?;
        self.progress
            .log(ProgressLevel::Step, "archive units exported", self.pkg.unit_count() as u64);

        match self.pkg.management_metadata_xml() {
            Some(raw) => self.writer.write_raw_xml_block_if_not_empty(Some(raw))?,
            None => {
                self.writer.write_start_element("ManagementMetadata")?;
                self.writer.write_end_element()?;
            }
        }
        self.writer.write_end_element()
    }

    /// Groups with their members first, then the ungrouped objects, each in
    /// natural id order
    fn write_data_objects(&mut self) -> Result<()> {
        let pkg = self.pkg;
        for group_id in pkg.sorted_group_ids() {
            let Some(group) = pkg.get_group(&group_id) else {
                continue;
            };
            self.writer.write_start_element("DataObjectGroup")?;
            self.writer.write_id_attribute(group.id())?;
            for binary in pkg.group_binaries(&group_id)? {
                binary.write(&mut self.writer, None)?;
                self.counted("data objects exported")?;
            }
            for physical in pkg.group_physicals(&group_id)? {
                physical.write(&mut self.writer, None)?;
                self.counted("data objects exported")?;
            }
            self.writer
                .write_raw_xml_block_if_not_empty(group.log_book_xml.as_deref())?;
            self.writer.write_end_element()?;
            self.counted("data objects exported")?;
        }

        for binary_id in pkg.sorted_binary_ids() {
            if let Some(binary) = pkg.get_binary(&binary_id).filter(|b| b.group().is_none()) {
                binary.write(&mut self.writer, None)?;
                self.counted("data objects exported")?;
            }
        }
        for physical_id in pkg.sorted_physical_ids() {
            if let Some(physical) = pkg.get_physical(&physical_id).filter(|p| p.group().is_none()) {
                physical.write(&mut self.writer, None)?;
                self.counted("data objects exported")?;
            }
        }
        Ok(())
    }

    /// Units not reached from the roots, in natural id order
    fn unreached_units(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .pkg
            .units()
            .map(|unit| unit.id().to_string())
            .filter(|id| !self.pkg.is_touched(id))
            .collect();
        ids.sort_by(|a, b| natural_id_cmp(a, b));
        ids
    }

    /// Each unit nested under its first parent. Later occurrences and
    /// back edges become reference placeholders.
    fn write_imbricate_units(&mut self) -> Result<()> {
        let pkg = self.pkg;
        pkg.reset_touched();
        for root in pkg.roots() {
            self.write_unit_tree(root, "root")?;
        }
        for unit_id in self.unreached_units() {
            if !pkg.is_touched(&unit_id) {
                self.write_unit_tree(&unit_id, "root")?;
            }
        }
        Ok(())
    }

    fn write_unit_tree(&mut self, unit_id: &str, parent: &str) -> Result<()> {
        let pkg = self.pkg;
        if !pkg.touch(unit_id) {
            return self.write_placeholder(unit_id);
        }
        let unit = pkg.get_unit(unit_id).ok_or_else(|| SedaError::DanglingReference {
            from: parent.to_string(),
            to: unit_id.to_string(),
        })?;
        self.counted("archive units exported")?;

        self.writer.write_start_element("ArchiveUnit")?;
        self.writer.write_id_attribute(unit_id)?;
        unit.write_metadata(&mut self.writer)
            .map_err(|e| SedaError::in_node(unit_id, e))?;
        for child in unit.children().iter() {
            self.write_unit_tree(child, unit_id)?;
        }
        self.write_data_object_references(unit_id)?;
        self.writer.write_end_element()
    }

    /// Every unit once at the top level, depth-first from the roots, then
    /// the unreached ones. Children are always placeholders.
    fn write_flat_units(&mut self) -> Result<()> {
        self.pkg.reset_touched();
        let mut order = Vec::new();
        let mut stack: Vec<String> = self.pkg.roots().iter().rev().cloned().collect();
        while let Some(unit_id) = stack.pop() {
            if !self.pkg.touch(&unit_id) {
                continue;
            }
            let unit = self.pkg.get_unit(&unit_id).ok_or_else(|| SedaError::DanglingReference {
                from: "root".to_string(),
                to: unit_id.clone(),
            })?;
            stack.extend(unit.children().iter().rev().map(str::to_string));
            order.push(unit_id);
        }
        order.extend(self.unreached_units());

        let pkg = self.pkg;
        for unit_id in &order {
            let Some(unit) = pkg.get_unit(unit_id) else {
                continue;
            };
            self.counted("archive units exported")?;
            self.writer.write_start_element("ArchiveUnit")?;
            self.writer.write_id_attribute(unit_id)?;
            unit.write_metadata(&mut self.writer)
                .map_err(|e| SedaError::in_node(unit_id.as_str(), e))?;
            for child in unit.children().iter() {
                if self.pkg.get_unit(child).is_none() {
                    return Err(SedaError::DanglingReference {
                        from: unit_id.clone(),
                        to: child.to_string(),
                    });
                }
                self.write_placeholder(child)?;
            }
            self.write_data_object_references(unit_id)?;
            self.writer.write_end_element()?;
        }
        Ok(())
    }

    /// `<ArchiveUnit id="REFIDn"><ArchiveUnitRefId>target</ArchiveUnitRefId></ArchiveUnit>`
    fn write_placeholder(&mut self, target: &str) -> Result<()> {
        let ref_id = self.pkg.next_ref_id();
        self.writer.write_start_element("ArchiveUnit")?;
        self.writer.write_id_attribute(&ref_id)?;
        self.writer.write_element_value("ArchiveUnitRefId", target)?;
        self.writer.write_end_element()
    }

    fn write_data_object_references(&mut self, unit_id: &str) -> Result<()> {
        let pkg = self.pkg;
        for object in pkg.unit_data_objects(unit_id)? {
            let element = match object {
                DataObjectRef::Group(_) => "DataObjectGroupReferenceId",
                DataObjectRef::Binary(_) | DataObjectRef::Physical(_) => "DataObjectReferenceId",
            };
            self.writer.write_start_element("DataObjectReference")?;
            self.writer.write_element_value(element, object.id())?;
            self.writer.write_end_element()?;
        }
        Ok(())
    }
}
