//! Data object groups and their binary / physical members

use std::path::PathBuf;

use crate::error::{Result, SedaError};
use crate::package::refs::ReferenceList;
use crate::xml::{SedaXmlReader, SedaXmlWriter};

/// How a data object read from a manifest declares its group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupLink {
    None,
    /// `DataObjectGroupReferenceId`: the group is declared elsewhere
    Reference(String),
    /// `DataObjectGroupId`: the object declares the group
    Declared(String),
}

impl GroupLink {
    fn read(reader: &mut SedaXmlReader<'_>) -> Result<Self> {
        if let Some(id) = reader.next_value_if_named("DataObjectGroupReferenceId")? {
            return Ok(GroupLink::Reference(id.trim().to_string()));
        }
        if let Some(id) = reader.next_value_if_named("DataObjectGroupId")? {
            return Ok(GroupLink::Declared(id.trim().to_string()));
        }
        Ok(GroupLink::None)
    }
}

// =============================================================================
// Group
// =============================================================================

/// Aggregate of binary and physical data objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataObjectGroup {
    pub(crate) id: String,
    pub(crate) binaries: ReferenceList,
    pub(crate) physicals: ReferenceList,
    /// Raw LogBook block, kept as found
    pub log_book_xml: Option<String>,
    pub on_disk_path: Option<PathBuf>,
}

impl DataObjectGroup {
    /// Detached group, id assigned when added to a package
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn binaries(&self) -> &ReferenceList {
        &self.binaries
    }

    pub fn physicals(&self) -> &ReferenceList {
        &self.physicals
    }

    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty() && self.physicals.is_empty()
    }

    /// Member ids, binaries first
    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.binaries.iter().chain(self.physicals.iter())
    }
}

// =============================================================================
// Technical metadata
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatIdentification {
    pub format_litteral: Option<String>,
    pub mime_type: Option<String>,
    pub format_id: Option<String>,
    pub encoding: Option<String>,
}

impl FormatIdentification {
    fn read(reader: &mut SedaXmlReader<'_>) -> Result<Self> {
        let format = FormatIdentification {
            format_litteral: reader.next_value_if_named("FormatLitteral")?,
            mime_type: reader.next_value_if_named("MimeType")?,
            format_id: reader.next_value_if_named("FormatId")?,
            encoding: reader.next_value_if_named("Encoding")?,
        };
        reader.end_block_named("FormatIdentification")?;
        Ok(format)
    }

    fn write(&self, writer: &mut SedaXmlWriter) -> Result<()> {
        writer.write_start_element("FormatIdentification")?;
        writer.write_element_value_if_not_empty("FormatLitteral", self.format_litteral.as_deref())?;
        writer.write_element_value_if_not_empty("MimeType", self.mime_type.as_deref())?;
        writer.write_element_value_if_not_empty("FormatId", self.format_id.as_deref())?;
        writer.write_element_value_if_not_empty("Encoding", self.encoding.as_deref())?;
        writer.write_end_element()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub filename: Option<String>,
    pub creating_application_name: Option<String>,
    pub creating_application_version: Option<String>,
    pub date_created_by_application: Option<String>,
    pub creating_os: Option<String>,
    pub creating_os_version: Option<String>,
    pub last_modified: Option<String>,
}

impl FileInfo {
    fn read(reader: &mut SedaXmlReader<'_>) -> Result<Self> {
        let info = FileInfo {
            filename: reader.next_value_if_named("Filename")?,
            creating_application_name: reader.next_value_if_named("CreatingApplicationName")?,
            creating_application_version: reader
                .next_value_if_named("CreatingApplicationVersion")?,
            date_created_by_application: reader.next_value_if_named("DateCreatedByApplication")?,
            creating_os: reader.next_value_if_named("CreatingOs")?,
            creating_os_version: reader.next_value_if_named("CreatingOsVersion")?,
            last_modified: reader.next_value_if_named("LastModified")?,
        };
        reader.end_block_named("FileInfo")?;
        Ok(info)
    }

    fn write(&self, writer: &mut SedaXmlWriter) -> Result<()> {
        writer.write_start_element("FileInfo")?;
        writer.write_element_value_if_not_empty("Filename", self.filename.as_deref())?;
        writer.write_element_value_if_not_empty(
            "CreatingApplicationName",
            self.creating_application_name.as_deref(),
        )?;
        writer.write_element_value_if_not_empty(
            "CreatingApplicationVersion",
            self.creating_application_version.as_deref(),
        )?;
        writer.write_element_value_if_not_empty(
            "DateCreatedByApplication",
            self.date_created_by_application.as_deref(),
        )?;
        writer.write_element_value_if_not_empty("CreatingOs", self.creating_os.as_deref())?;
        writer.write_element_value_if_not_empty("CreatingOsVersion", self.creating_os_version.as_deref())?;
        writer.write_element_value_if_not_empty("LastModified", self.last_modified.as_deref())?;
        writer.write_end_element()
    }
}

// =============================================================================
// Binary data object
// =============================================================================

/// A digital file described by the manifest. The bytes stay on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryDataObject {
    pub(crate) id: String,
    pub(crate) group: Option<String>,
    /// Raw DataObjectSystemId and DataObjectGroupSystemId blocks
    pub data_object_system_id_xml: Option<String>,
    pub data_object_group_system_id_xml: Option<String>,
    /// Raw Relationship elements
    pub relationships_xml: Vec<String>,
    pub data_object_version: Option<String>,
    /// Raw Attachment block, inline content in place of a Uri
    pub attachment_xml: Option<String>,
    pub uri: Option<String>,
    pub message_digest: Option<String>,
    pub digest_algorithm: Option<String>,
    pub size: Option<i64>,
    pub compressed_xml: Option<String>,
    pub format_identification: Option<FormatIdentification>,
    pub file_info: Option<FileInfo>,
    /// Raw Metadata block
    pub metadata_xml: Option<String>,
    /// Raw OtherMetadata block
    pub other_metadata_xml: Option<String>,
    pub on_disk_path: Option<PathBuf>,
}

impl BinaryDataObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning group, if any
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Extension of the on-disk file or of the recorded file name
    pub fn extension(&self) -> Option<String> {
        let from_path = self
            .on_disk_path
            .as_ref()
            .and_then(|path| path.extension())
            .and_then(|ext| ext.to_str());
        let from_name = self
            .file_info
            .as_ref()
            .and_then(|info| info.filename.as_deref())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext);
        from_path.or(from_name).map(str::to_string)
    }

    /// Relative URI of the content inside the package
    pub fn content_uri(&self) -> String {
        match self.extension() {
            Some(ext) if !ext.is_empty() => format!("content/{}.{}", self.id, ext),
            _ => format!("content/{}", self.id),
        }
    }

    /// Parse the body of a BinaryDataObject element, whose start tag has
    /// already been consumed
    pub fn read_body(reader: &mut SedaXmlReader<'_>, id: &str) -> Result<(Self, GroupLink)> {
        let mut object = BinaryDataObject::with_id(id);

        object.data_object_system_id_xml = reader.next_block_as_string_if_named("DataObjectSystemId")?;
        object.data_object_group_system_id_xml = reader.next_block_as_string_if_named("DataObjectGroupSystemId")?;
        while let Some(raw) = reader.next_block_as_string_if_named("Relationship")? {
            object.relationships_xml.push(raw);
        }
        let link = GroupLink::read(reader)?;
        object.data_object_version = reader.next_value_if_named("DataObjectVersion")?;
        object.attachment_xml = reader.next_block_as_string_if_named("Attachment")?;
        object.uri = reader.next_value_if_named("Uri")?;
        if let Some((digest, attributes)) = reader.next_value_with_attributes_if_named("MessageDigest")? {
            object.message_digest = Some(digest.trim().to_string());
            object.digest_algorithm = attributes.get("algorithm").map(str::to_string);
        }
        if let Some(size) = reader.next_value_if_named("Size")? {
            // Read values are bounded to the 32-bit range
            object.size = Some(size.trim().parse::<i32>().map(i64::from).map_err(|e| SedaError::InvalidValue {
                element: "Size".to_string(),
                value: size.clone(),
                reason: e.to_string(),
            })?);
        }
        object.compressed_xml = reader.next_block_as_string_if_named("Compressed")?;
        if reader.next_block_if_named("FormatIdentification")?.is_some() {
            object.format_identification = Some(FormatIdentification::read(reader)?);
        }
        if reader.next_block_if_named("FileInfo")?.is_some() {
            object.file_info = Some(FileInfo::read(reader)?);
        }
        object.metadata_xml = reader.next_block_as_string_if_named("Metadata")?;
        object.other_metadata_xml = reader.next_block_as_string_if_named("OtherMetadata")?;
        reader.end_block_named("BinaryDataObject")?;
        Ok((object, link))
    }

    /// Write the element. `group_id` is written as a group reference for
    /// objects exported outside their group element.
    pub fn write(&self, writer: &mut SedaXmlWriter, group_id: Option<&str>) -> Result<()> {
        writer.write_start_element("BinaryDataObject")?;
        writer.write_id_attribute(&self.id)?;
        writer.write_raw_xml_block_if_not_empty(self.data_object_system_id_xml.as_deref())?;
        writer.write_raw_xml_block_if_not_empty(self.data_object_group_system_id_xml.as_deref())?;
        for relationship in &self.relationships_xml {
            writer.write_raw_xml_block_if_not_empty(Some(relationship))?;
        }
        writer.write_element_value_if_not_empty("DataObjectGroupReferenceId", group_id)?;
        writer.write_element_value_if_not_empty("DataObjectVersion", self.data_object_version.as_deref())?;
        writer.write_raw_xml_block_if_not_empty(self.attachment_xml.as_deref())?;
        match (&self.uri, &self.attachment_xml) {
            (Some(uri), _) => writer.write_element_value("Uri", uri)?,
            // Inline content needs no Uri
            (None, Some(_)) => {}
            (None, None) => writer.write_element_value("Uri", &self.content_uri())?,
        }
        if let Some(digest) = &self.message_digest {
            writer.write_element_value_with_attribute(
                "MessageDigest",
                digest,
                "algorithm",
                self.digest_algorithm.as_deref(),
            )?;
        }
        if let Some(size) = self.size {
            writer.write_element_value("Size", &size.to_string())?;
        }
        writer.write_raw_xml_block_if_not_empty(self.compressed_xml.as_deref())?;
        if let Some(format) = &self.format_identification {
            format.write(writer)?;
        }
        if let Some(info) = &self.file_info {
            info.write(writer)?;
        }
        writer.write_raw_xml_block_if_not_empty(self.metadata_xml.as_deref())?;
        writer.write_raw_xml_block_if_not_empty(self.other_metadata_xml.as_deref())?;
        writer.write_end_element()
    }
}

// =============================================================================
// Physical data object
// =============================================================================

/// A physical item (paper file, box...) described by the manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicalDataObject {
    pub(crate) id: String,
    pub(crate) group: Option<String>,
    pub data_object_system_id_xml: Option<String>,
    pub data_object_group_system_id_xml: Option<String>,
    pub relationships_xml: Vec<String>,
    pub data_object_version: Option<String>,
    pub physical_id: Option<String>,
    /// Raw PhysicalDimensions block
    pub physical_dimensions_xml: Option<String>,
    /// Any further elements, raw and in document order
    pub other_xml: Vec<String>,
}

impl PhysicalDataObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn read_body(reader: &mut SedaXmlReader<'_>, id: &str) -> Result<(Self, GroupLink)> {
        let mut object = PhysicalDataObject::with_id(id);

        object.data_object_system_id_xml = reader.next_block_as_string_if_named("DataObjectSystemId")?;
        object.data_object_group_system_id_xml = reader.next_block_as_string_if_named("DataObjectGroupSystemId")?;
        while let Some(raw) = reader.next_block_as_string_if_named("Relationship")? {
            object.relationships_xml.push(raw);
        }
        let link = GroupLink::read(reader)?;
        object.data_object_version = reader.next_value_if_named("DataObjectVersion")?;
        object.physical_id = reader.next_value_if_named("PhysicalId")?;
        object.physical_dimensions_xml = reader.next_block_as_string_if_named("PhysicalDimensions")?;
        while reader.peek_name()?.is_some() {
            object.other_xml.push(reader.next_block_as_string()?);
        }
        reader.end_block_named("PhysicalDataObject")?;
        Ok((object, link))
    }

    pub fn write(&self, writer: &mut SedaXmlWriter, group_id: Option<&str>) -> Result<()> {
        writer.write_start_element("PhysicalDataObject")?;
        writer.write_id_attribute(&self.id)?;
        writer.write_raw_xml_block_if_not_empty(self.data_object_system_id_xml.as_deref())?;
        writer.write_raw_xml_block_if_not_empty(self.data_object_group_system_id_xml.as_deref())?;
        for relationship in &self.relationships_xml {
            writer.write_raw_xml_block_if_not_empty(Some(relationship))?;
        }
        writer.write_element_value_if_not_empty("DataObjectGroupReferenceId", group_id)?;
        writer.write_element_value_if_not_empty("DataObjectVersion", self.data_object_version.as_deref())?;
        writer.write_element_value_if_not_empty("PhysicalId", self.physical_id.as_deref())?;
        writer.write_raw_xml_block_if_not_empty(self.physical_dimensions_xml.as_deref())?;
        for raw in &self.other_xml {
            writer.write_raw_xml_block_if_not_empty(Some(raw))?;
        }
        writer.write_end_element()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINARY: &str = r#"<BinaryDataObject id="ID7"><DataObjectGroupReferenceId>ID4</DataObjectGroupReferenceId><DataObjectVersion>BinaryMaster_1</DataObjectVersion><Uri>content/ID7.pdf</Uri><MessageDigest algorithm="SHA-512">abc</MessageDigest><Size>2048</Size><FormatIdentification><MimeType>application/pdf</MimeType><FormatId>fmt/18</FormatId></FormatIdentification><FileInfo><Filename>rapport.pdf</Filename><LastModified>2020-01-01T00:00:00Z</LastModified></FileInfo><Metadata><Custom>x</Custom></Metadata></BinaryDataObject>"#;

    fn read_binary(xml: &str) -> Result<(BinaryDataObject, GroupLink)> {
        let mut reader = SedaXmlReader::new(xml);
        let attributes = reader.next_mandatory_block("BinaryDataObject")?;
        let id = attributes.id().unwrap_or_default().to_string();
        BinaryDataObject::read_body(&mut reader, &id)
    }

    #[test]
    fn test_binary_read_write() {
        let (object, link) = read_binary(BINARY).unwrap();
        assert_eq!(object.id(), "ID7");
        assert_eq!(link, GroupLink::Reference("ID4".to_string()));
        assert_eq!(object.size, Some(2048));
        assert_eq!(object.digest_algorithm.as_deref(), Some("SHA-512"));
        assert_eq!(
            object.file_info.as_ref().unwrap().filename.as_deref(),
            Some("rapport.pdf")
        );

        let mut writer = SedaXmlWriter::new(false);
        object.write(&mut writer, Some("ID4")).unwrap();
        assert_eq!(writer.finish().unwrap(), BINARY);
    }

    #[test]
    fn test_size_is_bounded() {
        let xml = BINARY.replace("2048", "3000000000");
        let err = read_binary(&xml).unwrap_err();
        assert!(matches!(err, SedaError::InvalidValue { ref element, .. } if element == "Size"));
    }

    #[test]
    fn test_content_uri_uses_extension() {
        let mut object = BinaryDataObject::with_id("ID12");
        assert_eq!(object.content_uri(), "content/ID12");
        object.file_info = Some(FileInfo {
            filename: Some("scan.tiff".to_string()),
            ..FileInfo::default()
        });
        assert_eq!(object.content_uri(), "content/ID12.tiff");
        object.on_disk_path = Some(PathBuf::from("/data/scan.jpg"));
        assert_eq!(object.content_uri(), "content/ID12.jpg");
    }

    #[test]
    fn test_binary_keeps_identification_attachment_and_compression() {
        let xml = r#"<BinaryDataObject id="ID9"><DataObjectSystemId>sys-9</DataObjectSystemId><DataObjectGroupSystemId>sys-grp</DataObjectGroupSystemId><DataObjectVersion>BinaryMaster_1</DataObjectVersion><Attachment filename="a.txt">aGVsbG8=</Attachment><MessageDigest algorithm="SHA-256">2cf2</MessageDigest><Size>5</Size><Compressed algorithm="gzip">true</Compressed></BinaryDataObject>"#;
        let (object, _) = read_binary(xml).unwrap();
        assert_eq!(
            object.attachment_xml.as_deref(),
            Some(r#"<Attachment filename="a.txt">aGVsbG8=</Attachment>"#)
        );
        assert!(object.uri.is_none());

        let mut writer = SedaXmlWriter::new(false);
        object.write(&mut writer, None).unwrap();
        assert_eq!(writer.finish().unwrap(), xml);
    }

    #[test]
    fn test_physical_keeps_unmodeled_elements() {
        let xml = r#"<PhysicalDataObject id="ID8"><DataObjectSystemId>sys-8</DataObjectSystemId><DataObjectGroupId>ID5</DataObjectGroupId><PhysicalId>Box 12</PhysicalId><PhysicalDimensions><Weight unit="kilogram">3</Weight></PhysicalDimensions><Extent>2 linear metres</Extent></PhysicalDataObject>"#;
        let mut reader = SedaXmlReader::new(xml);
        reader.next_mandatory_block("PhysicalDataObject").unwrap();
        let (object, link) = PhysicalDataObject::read_body(&mut reader, "ID8").unwrap();
        assert_eq!(link, GroupLink::Declared("ID5".to_string()));
        assert_eq!(object.physical_id.as_deref(), Some("Box 12"));
        assert_eq!(object.other_xml, vec!["<Extent>2 linear metres</Extent>".to_string()]);

        let mut writer = SedaXmlWriter::new(false);
        object.write(&mut writer, None).unwrap();
        let out = writer.finish().unwrap();
        assert!(out.contains(r#"<PhysicalDimensions><Weight unit="kilogram">3</Weight></PhysicalDimensions>"#));
        assert!(out.starts_with(r#"<PhysicalDataObject id="ID8"><DataObjectSystemId>sys-8</DataObjectSystemId><PhysicalId>"#));
        assert!(!out.contains("DataObjectGroupId"));
    }
}
