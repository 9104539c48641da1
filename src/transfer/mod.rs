//! ArchiveTransfer manifest codec
//!
//! Reads and writes a whole manifest: the header, the package body (data
//! objects, then archive units, then management metadata) and the footer.
//! The header is read leniently: if it cannot be parsed it is dropped with a
//! warning and reading resumes at the package body, whose errors are always
//! fatal.

pub mod export;
pub mod import;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, SedaError};
use crate::metadata::SedaDateTime;
use crate::package::DataObjectPackage;
use crate::progress::ProgressLogger;
use crate::version::SedaVersion;

/// Transfer-level metadata surrounding the package body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalMetadata {
    // Header
    pub comments: Vec<String>,
    pub date: Option<SedaDateTime>,
    pub message_identifier: Option<String>,
    /// Raw Signature block
    pub signature_xml: Option<String>,
    pub archival_agreement: Option<String>,
    /// Raw CodeListVersions block
    pub code_list_versions_xml: Option<String>,

    // Footer
    /// Raw RelatedTransferReference blocks
    pub related_transfer_references_xml: Vec<String>,
    pub transfer_request_reply_identifier: Option<String>,
    pub archival_agency_identifier: Option<String>,
    pub archival_agency_organization_descriptive_metadata_xml: Option<String>,
    pub transferring_agency_identifier: Option<String>,
    pub transferring_agency_organization_descriptive_metadata_xml: Option<String>,
}

impl GlobalMetadata {
    pub fn is_empty(&self) -> bool {
        *self == GlobalMetadata::default()
    }
}

/// Rendering of the DescriptiveMetadata section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitLayout {
    /// Units nested under their parent; repeated units become reference
    /// placeholders
    #[default]
    Imbricate,
    /// Every unit once at the top level, children as reference placeholders
    Flat,
}

impl FromStr for UnitLayout {
    type Err = SedaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "imbricate" | "nested" => Ok(UnitLayout::Imbricate),
            "flat" => Ok(UnitLayout::Flat),
            other => Err(SedaError::InvalidValue {
                element: "layout".to_string(),
                value: other.to_string(),
                reason: "expected 'imbricate' or 'flat'".to_string(),
            }),
        }
    }
}

impl fmt::Display for UnitLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitLayout::Imbricate => write!(f, "imbricate"),
            UnitLayout::Flat => write!(f, "flat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Version to read with; detected from the root namespace when absent
    pub version: Option<SedaVersion>,
    /// Run cycle detection after the import
    pub check_cycles: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            version: None,
            check_cycles: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Version to write; the transfer's own version when absent
    pub version: Option<SedaVersion>,
    pub layout: UnitLayout,
    pub indented: bool,
    /// Write `xml:id` attributes instead of `id`
    pub xml_id_attributes: bool,
}

/// A parsed ArchiveTransfer manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveTransfer {
    pub version: SedaVersion,
    pub global_metadata: Option<GlobalMetadata>,
    pub package: DataObjectPackage,
}

impl ArchiveTransfer {
    pub fn new(version: SedaVersion) -> Self {
        Self {
            version,
            global_metadata: None,
            package: DataObjectPackage::new(),
        }
    }

    pub fn from_xml(xml: &str, options: &ImportOptions, progress: &ProgressLogger) -> Result<Self> {
        import::read_transfer(xml, options, progress)
    }

    pub fn from_file(path: impl AsRef<Path>, options: &ImportOptions, progress: &ProgressLogger) -> Result<Self> {
        let xml = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), bytes = xml.len(), "manifest loaded");
        Self::from_xml(&xml, options, progress)
    }

    pub fn to_xml(&self, options: &ExportOptions, progress: &ProgressLogger) -> Result<String> {
        export::write_transfer(self, options, progress)
    }

    pub fn write_to_file(
        &self,
        path: impl AsRef<Path>,
        options: &ExportOptions,
        progress: &ProgressLogger,
    ) -> Result<()> {
        let xml = self.to_xml(options, progress)?;
        std::fs::write(path.as_ref(), xml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_parsing() {
        assert_eq!("Flat".parse::<UnitLayout>().unwrap(), UnitLayout::Flat);
        assert_eq!("imbricate".parse::<UnitLayout>().unwrap(), UnitLayout::Imbricate);
        assert!("tree".parse::<UnitLayout>().is_err());
        assert_eq!(UnitLayout::Flat.to_string(), "flat");
    }

    #[test]
    fn test_empty_global_metadata() {
        assert!(GlobalMetadata::default().is_empty());
        let footer = GlobalMetadata {
            archival_agency_identifier: Some("AG1".to_string()),
            ..GlobalMetadata::default()
        };
        assert!(!footer.is_empty());
    }
}
