//! XML writer mirroring the reader primitives.
//!
//! Start tags stay pending until the next write so that attributes can be
//! added after `write_start_element`, and an element closed right away is
//! emitted as an empty tag. Raw blocks are copied to the output unchanged.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Result, SedaError};
use crate::version::SedaVersion;

pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";
pub const PREMIS_NAMESPACE: &str = "info:lc/xmlns/premis-v2";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

struct OpenElement {
    name: String,
    has_child_elements: bool,
}

/// Streaming writer used by every exporter in the crate
pub struct SedaXmlWriter {
    writer: Writer<Vec<u8>>,
    indented: bool,
    xml_id_attributes: bool,
    pending: Option<BytesStart<'static>>,
    open: Vec<OpenElement>,
    written_anything: bool,
}

impl SedaXmlWriter {
    /// Create a writer, optionally indenting nested elements by two spaces
    pub fn new(indented: bool) -> Self {
        Self {
            writer: Writer::new(Vec::new()),
            indented,
            xml_id_attributes: false,
            pending: None,
            open: Vec::new(),
            written_anything: false,
        }
    }

    /// Write identifiers as `xml:id` instead of `id`
    pub fn with_xml_id_attributes(mut self, enabled: bool) -> Self {
        self.xml_id_attributes = enabled;
        self
    }

    pub fn xml_id_attributes(&self) -> bool {
        self.xml_id_attributes
    }

    fn line_break(&mut self, depth: usize) {
        if self.indented && self.written_anything {
            let buffer = self.writer.get_mut();
            buffer.push(b'\n');
            buffer.extend(std::iter::repeat(b' ').take(depth * 2));
        }
        self.written_anything = true;
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }

    /// Flush the pending start tag and position the output for a child element
    fn begin_child(&mut self) -> Result<()> {
        self.flush_pending()?;
        if let Some(parent) = self.open.last_mut() {
            parent.has_child_elements = true;
        }
        let depth = self.open.len();
        self.line_break(depth);
        Ok(())
    }

    // ========== Document level ==========

    /// Write the XML declaration
    pub fn write_start_document(&mut self) -> Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.written_anything = true;
        Ok(())
    }

    /// Open the root element with the namespace declarations of the version
    pub fn write_root_start(&mut self, name: &str, version: SedaVersion) -> Result<()> {
        self.write_start_element(name)?;
        self.write_attribute("xmlns", version.namespace())?;
        self.write_attribute("xmlns:xlink", XLINK_NAMESPACE)?;
        self.write_attribute("xmlns:pr", PREMIS_NAMESPACE)?;
        self.write_attribute("xmlns:xsi", XSI_NAMESPACE)?;
        self.write_attribute("xsi:schemaLocation", &version.schema_location())
    }

    /// Return the document, failing if elements are still open
    pub fn finish(mut self) -> Result<String> {
        if let Some(open) = self.open.last() {
            return Err(SedaError::malformed(open.name.clone(), "element left open at end of export"));
        }
        self.flush_pending()?;
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| SedaError::malformed("document", format!("invalid UTF-8 output: {}", e)))
    }

    // ========== Elements ==========

    pub fn write_start_element(&mut self, name: &str) -> Result<()> {
        self.begin_child()?;
        self.pending = Some(BytesStart::new(name.to_string()));
        self.open.push(OpenElement {
            name: name.to_string(),
            has_child_elements: false,
        });
        Ok(())
    }

    /// Add an attribute to the start tag just written
    pub fn write_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        match self.pending.as_mut() {
            Some(start) => {
                start.push_attribute((name, value));
                Ok(())
            }
            None => Err(SedaError::malformed(
                name,
                "attribute written after element content",
            )),
        }
    }

    pub fn write_attribute_if_not_empty(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) if !value.is_empty() => self.write_attribute(name, value),
            _ => Ok(()),
        }
    }

    /// Write the element identifier in the configured attribute form
    pub fn write_id_attribute(&mut self, id: &str) -> Result<()> {
        let name = if self.xml_id_attributes { "xml:id" } else { "id" };
        self.write_attribute(name, id)
    }

    pub fn write_end_element(&mut self) -> Result<()> {
        let element = self
            .open
            .pop()
            .ok_or_else(|| SedaError::malformed("document", "end element without open element"))?;
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        if element.has_child_elements {
            let depth = self.open.len();
            self.line_break(depth);
        }
        self.writer
            .write_event(Event::End(BytesEnd::new(element.name)))?;
        Ok(())
    }

    /// Write escaped character data inside the current element
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.flush_pending()?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    /// Write `<name>value</name>`
    pub fn write_element_value(&mut self, name: &str, value: &str) -> Result<()> {
        self.write_start_element(name)?;
        self.write_text(value)?;
        self.write_end_element()
    }

    pub fn write_element_value_if_not_empty(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) if !value.is_empty() => self.write_element_value(name, value),
            _ => Ok(()),
        }
    }

    /// Write `<name attribute="...">value</name>`, skipping an absent attribute
    pub fn write_element_value_with_attribute(
        &mut self,
        name: &str,
        value: &str,
        attribute: &str,
        attribute_value: Option<&str>,
    ) -> Result<()> {
        self.write_start_element(name)?;
        self.write_attribute_if_not_empty(attribute, attribute_value)?;
        self.write_text(value)?;
        self.write_end_element()
    }

    /// Copy a previously captured element to the output unchanged
    pub fn write_raw_xml_block_if_not_empty(&mut self, raw: Option<&str>) -> Result<()> {
        match raw {
            Some(raw) if !raw.trim().is_empty() => {
                self.begin_child()?;
                self.writer.get_mut().extend_from_slice(raw.as_bytes());
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_output() {
        let mut writer = SedaXmlWriter::new(false);
        writer.write_start_element("Unit").unwrap();
        writer.write_id_attribute("ID10").unwrap();
        writer.write_element_value("Title", "A & B").unwrap();
        writer.write_element_value_if_not_empty("Empty", None).unwrap();
        writer.write_start_element("Nothing").unwrap();
        writer.write_end_element().unwrap();
        writer.write_end_element().unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            r#"<Unit id="ID10"><Title>A &amp; B</Title><Nothing/></Unit>"#
        );
    }

    #[test]
    fn test_indented_output_with_raw_block() {
        let mut writer = SedaXmlWriter::new(true).with_xml_id_attributes(true);
        writer.write_start_element("Unit").unwrap();
        writer.write_id_attribute("ID10").unwrap();
        writer
            .write_raw_xml_block_if_not_empty(Some("<Content><Title>X</Title></Content>"))
            .unwrap();
        writer.write_end_element().unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            "<Unit xml:id=\"ID10\">\n  <Content><Title>X</Title></Content>\n</Unit>"
        );
    }

    #[test]
    fn test_root_namespace_depends_on_version() {
        let mut writer = SedaXmlWriter::new(false);
        writer.write_root_start("ArchiveTransfer", SedaVersion::V2_2).unwrap();
        writer.write_end_element().unwrap();
        let xml = writer.finish().unwrap();
        assert!(xml.contains(r#"xmlns="fr:gouv:culture:archivesdefrance:seda:v2.2""#));
        assert!(xml.contains("seda-2.2-main.xsd"));
    }

    #[test]
    fn test_unclosed_element_fails() {
        let mut writer = SedaXmlWriter::new(false);
        writer.write_start_element("Unit").unwrap();
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_attribute_after_content_fails() {
        let mut writer = SedaXmlWriter::new(false);
        writer.write_start_element("Unit").unwrap();
        writer.write_text("x").unwrap();
        assert!(writer.write_attribute("id", "ID1").is_err());
    }
}
