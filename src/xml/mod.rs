//! Streaming XML codec
//!
//! A pull reader with lookahead and block navigation, and a writer with the
//! mirror-image primitives. Sub-trees that no schema models travel through
//! [`SedaXmlReader::next_block_as_string`] and
//! [`SedaXmlWriter::write_raw_xml_block_if_not_empty`] byte for byte.

pub mod reader;
pub mod writer;

pub use reader::{ReaderMark, SedaXmlReader, XmlAttributes, XmlToken};
pub use writer::SedaXmlWriter;
