//! SEDA standard versions

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SedaError;

/// A supported major variant of the SEDA standard.
///
/// The active version selects the metadata schema tables and the root
/// element namespace. It is passed explicitly down every parse and render
/// call, there is no process-wide "current version".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SedaVersion {
    #[default]
    V2_1,
    V2_2,
    V2_3,
}

impl SedaVersion {
    /// All supported versions, oldest first
    pub const ALL: [SedaVersion; 3] = [SedaVersion::V2_1, SedaVersion::V2_2, SedaVersion::V2_3];

    /// Parse "2.1", "v2.2" or "2.3.0"
    pub fn parse(version_str: &str) -> Result<Self, SedaError> {
        let trimmed = version_str.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        // semver wants three components
        let padded = match trimmed.matches('.').count() {
            0 => format!("{}.0.0", trimmed),
            1 => format!("{}.0", trimmed),
            _ => trimmed.to_string(),
        };
        let version = Version::parse(&padded).map_err(|e| SedaError::InvalidValue {
            element: "SedaVersion".to_string(),
            value: version_str.to_string(),
            reason: e.to_string(),
        })?;

        match (version.major, version.minor) {
            (2, 1) => Ok(SedaVersion::V2_1),
            (2, 2) => Ok(SedaVersion::V2_2),
            (2, 3) => Ok(SedaVersion::V2_3),
            _ => Err(SedaError::InvalidValue {
                element: "SedaVersion".to_string(),
                value: version_str.to_string(),
                reason: "unsupported SEDA version".to_string(),
            }),
        }
    }

    /// Get the version string (e.g., "2.1")
    pub fn version_string(&self) -> &'static str {
        match self {
            SedaVersion::V2_1 => "2.1",
            SedaVersion::V2_2 => "2.2",
            SedaVersion::V2_3 => "2.3",
        }
    }

    /// Default namespace of the root transfer element
    pub fn namespace(&self) -> &'static str {
        match self {
            SedaVersion::V2_1 => "fr:gouv:culture:archivesdefrance:seda:v2.1",
            SedaVersion::V2_2 => "fr:gouv:culture:archivesdefrance:seda:v2.2",
            SedaVersion::V2_3 => "fr:gouv:culture:archivesdefrance:seda:v2.3",
        }
    }

    /// Value of the xsi:schemaLocation attribute
    pub fn schema_location(&self) -> String {
        format!("{} seda-{}-main.xsd", self.namespace(), self.version_string())
    }

    /// Find the version declaring the given root namespace
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.namespace() == namespace)
    }
}

impl fmt::Display for SedaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SEDA {}", self.version_string())
    }
}

impl TryFrom<String> for SedaVersion {
    type Error = SedaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SedaVersion> for String {
    fn from(version: SedaVersion) -> Self {
        version.version_string().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        assert_eq!(SedaVersion::parse("2.1").unwrap(), SedaVersion::V2_1);
        assert_eq!(SedaVersion::parse("v2.2").unwrap(), SedaVersion::V2_2);
        assert_eq!(SedaVersion::parse("2.3.0").unwrap(), SedaVersion::V2_3);
    }

    #[test]
    fn test_unsupported_version() {
        assert!(SedaVersion::parse("1.0").is_err());
        assert!(SedaVersion::parse("two").is_err());
    }

    #[test]
    fn test_namespace_round_trip() {
        for version in SedaVersion::ALL {
            assert_eq!(SedaVersion::from_namespace(version.namespace()), Some(version));
            assert!(version.schema_location().ends_with(".xsd"));
        }
        assert_eq!(SedaVersion::from_namespace("urn:other"), None);
    }
}
