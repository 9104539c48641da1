//! Archive units and their metadata slots

use std::borrow::Cow;
use std::path::PathBuf;

use crate::error::{Result, SedaError};
use crate::metadata::{Composite, CompositeKind, Metadata, ValueKind};
use crate::package::refs::ReferenceList;
use crate::version::SedaVersion;
use crate::xml::SedaXmlWriter;

/// One optional metadata block of a unit.
///
/// The block is held either parsed or as the raw XML it was read from,
/// never both. Each form is derived from the other on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MetadataSlot {
    #[default]
    Empty,
    Parsed(Metadata),
    Raw(String),
}

impl MetadataSlot {
    pub fn is_empty(&self) -> bool {
        matches!(self, MetadataSlot::Empty)
    }

    /// Parsed form, converting and caching a raw block first
    fn parsed(&mut self, version: SedaVersion, kind: ValueKind) -> Result<Option<&mut Metadata>> {
        if let MetadataSlot::Raw(raw) = self {
            let metadata = Metadata::from_xml(raw, version, kind)?;
            *self = MetadataSlot::Parsed(metadata);
        }
        match self {
            MetadataSlot::Parsed(metadata) => Ok(Some(metadata)),
            _ => Ok(None),
        }
    }

    /// Raw form, rendering a parsed value when needed
    fn raw(&self) -> Result<Option<Cow<'_, str>>> {
        match self {
            MetadataSlot::Empty => Ok(None),
            MetadataSlot::Raw(raw) => Ok(Some(Cow::Borrowed(raw.as_str()))),
            MetadataSlot::Parsed(metadata) => metadata.to_xml().map(|xml| Some(Cow::Owned(xml))),
        }
    }

    /// Switch a parsed value back to its raw form
    fn freeze(&mut self) -> Result<()> {
        if let MetadataSlot::Parsed(metadata) = self {
            *self = MetadataSlot::Raw(metadata.to_xml()?);
        }
        Ok(())
    }

    fn write(&self, writer: &mut SedaXmlWriter) -> Result<()> {
        match self {
            MetadataSlot::Empty => Ok(()),
            MetadataSlot::Raw(raw) => writer.write_raw_xml_block_if_not_empty(Some(raw)),
            MetadataSlot::Parsed(metadata) => metadata.write(writer),
        }
    }
}

const PROFILE: ValueKind = ValueKind::String;
const MANAGEMENT: ValueKind = ValueKind::Composite(CompositeKind::Management);
const CONTENT: ValueKind = ValueKind::Composite(CompositeKind::Content);

/// An archival unit: descriptive metadata plus links to child units and
/// data objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveUnit {
    pub(crate) id: String,
    archive_unit_profile: MetadataSlot,
    management: MetadataSlot,
    content: MetadataSlot,
    pub(crate) children: ReferenceList,
    pub(crate) data_objects: ReferenceList,
    pub on_disk_path: Option<PathBuf>,
}

impl ArchiveUnit {
    /// Detached unit, id assigned when added to a package
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Unit id, empty while detached
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn children(&self) -> &ReferenceList {
        &self.children
    }

    pub fn data_objects(&self) -> &ReferenceList {
        &self.data_objects
    }

    // ========== Content ==========

    /// Parsed Content, parsing the raw block on first access
    pub fn content(&mut self, version: SedaVersion) -> Result<Option<&Metadata>> {
        let id = self.id.clone();
        self.content
            .parsed(version, CONTENT)
            .map(|m| m.map(|m| &*m))
            .map_err(|e| SedaError::in_node(id, e))
    }

    /// Content composite for editing, created empty when absent
    pub fn content_mut(&mut self, version: SedaVersion) -> Result<&mut Composite> {
        if self.content.is_empty() {
            self.content =
                MetadataSlot::Parsed(Metadata::composite("Content", Composite::new(CompositeKind::Content)));
        }
        let id = self.id.clone();
        match self.content.parsed(version, CONTENT) {
            Ok(Some(metadata)) => metadata
                .as_composite_mut()
                .ok_or_else(|| SedaError::malformed("Content", "not a composite")),
            Ok(None) => Err(SedaError::malformed("Content", "missing after creation")),
            Err(e) => Err(SedaError::in_node(id, e)),
        }
    }

    /// Content as XML, rendering the parsed value if needed
    pub fn content_xml(&self) -> Result<Option<Cow<'_, str>>> {
        self.content.raw()
    }

    pub fn set_content(&mut self, content: Metadata) {
        self.content = MetadataSlot::Parsed(content);
    }

    pub fn set_content_xml(&mut self, xml: impl Into<String>) {
        self.content = MetadataSlot::Raw(xml.into());
    }

    // ========== Management ==========

    pub fn management(&mut self, version: SedaVersion) -> Result<Option<&Metadata>> {
        let id = self.id.clone();
        self.management
            .parsed(version, MANAGEMENT)
            .map(|m| m.map(|m| &*m))
            .map_err(|e| SedaError::in_node(id, e))
    }

    pub fn management_mut(&mut self, version: SedaVersion) -> Result<&mut Composite> {
        if self.management.is_empty() {
            self.management = MetadataSlot::Parsed(Metadata::composite(
                "Management",
                Composite::new(CompositeKind::Management),
            ));
        }
        let id = self.id.clone();
        match self.management.parsed(version, MANAGEMENT) {
            Ok(Some(metadata)) => metadata
                .as_composite_mut()
                .ok_or_else(|| SedaError::malformed("Management", "not a composite")),
            Ok(None) => Err(SedaError::malformed("Management", "missing after creation")),
            Err(e) => Err(SedaError::in_node(id, e)),
        }
    }

    pub fn management_xml(&self) -> Result<Option<Cow<'_, str>>> {
        self.management.raw()
    }

    pub fn set_management(&mut self, management: Metadata) {
        self.management = MetadataSlot::Parsed(management);
    }

    pub fn set_management_xml(&mut self, xml: impl Into<String>) {
        self.management = MetadataSlot::Raw(xml.into());
    }

    // ========== Profile ==========

    pub fn archive_unit_profile(&mut self, version: SedaVersion) -> Result<Option<&Metadata>> {
        let id = self.id.clone();
        self.archive_unit_profile
            .parsed(version, PROFILE)
            .map(|m| m.map(|m| &*m))
            .map_err(|e| SedaError::in_node(id, e))
    }

    pub fn archive_unit_profile_xml(&self) -> Result<Option<Cow<'_, str>>> {
        self.archive_unit_profile.raw()
    }

    pub fn set_archive_unit_profile(&mut self, profile: Metadata) {
        self.archive_unit_profile = MetadataSlot::Parsed(profile);
    }

    pub fn set_archive_unit_profile_xml(&mut self, xml: impl Into<String>) {
        self.archive_unit_profile = MetadataSlot::Raw(xml.into());
    }

    /// Return every parsed slot to its raw form, releasing the typed values
    pub fn freeze_metadata(&mut self) -> Result<()> {
        self.archive_unit_profile.freeze()?;
        self.management.freeze()?;
        self.content.freeze()
    }

    // ========== XML ==========

    /// Write the profile, management and content blocks in manifest order.
    /// An absent Content is written empty since the element is mandatory.
    pub fn write_metadata(&self, writer: &mut SedaXmlWriter) -> Result<()> {
        self.archive_unit_profile.write(writer)?;
        self.management.write(writer)?;
        if self.content.is_empty() {
            writer.write_start_element("Content")?;
            writer.write_end_element()
        } else {
            self.content.write(writer)
        }
    }

    /// Metadata blocks of the unit as a standalone XML fragment
    pub fn to_sedaxml_fragments(&mut self, version: SedaVersion) -> Result<String> {
        // Parse raw blocks first so malformed content is reported here
        self.content(version)?;
        self.management(version)?;
        let mut writer = SedaXmlWriter::new(false);
        self.write_metadata(&mut writer)?;
        writer.finish()
    }
}
