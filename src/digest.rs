//! Content digests for binary data objects
//!
//! Hashing reads the files named by the caller and is kept apart from the
//! graph walks, so import and export never touch content bytes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, SedaError};
use crate::package::{BinaryDataObject, FileInfo};

/// Digest algorithms with their SEDA `algorithm` attribute names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    #[serde(rename = "SHA-256")]
    Sha256,
    #[default]
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl DigestAlgorithm {
    pub fn seda_name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = SedaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(SedaError::InvalidValue {
                element: "MessageDigest".to_string(),
                value: s.to_string(),
                reason: "unsupported digest algorithm".to_string(),
            }),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.seda_name())
    }
}

/// Lowercase hex digest of in-memory data
pub fn digest_bytes(data: &[u8], algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => format!("{:x}", Sha256::digest(data)),
        DigestAlgorithm::Sha512 => format!("{:x}", Sha512::digest(data)),
    }
}

/// Lowercase hex digest of a file, streamed from disk
pub fn digest_file(path: impl AsRef<Path>, algorithm: DigestAlgorithm) -> Result<String> {
    let mut file = File::open(path.as_ref())?;
    let hex = match algorithm {
        DigestAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
        DigestAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
    };
    Ok(hex)
}

impl BinaryDataObject {
    /// Fill size, digest, file name and modification date from the file at
    /// `path`, which becomes the object's on-disk path
    pub fn update_from_file(&mut self, path: impl AsRef<Path>, algorithm: DigestAlgorithm) -> Result<()> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let size = i64::try_from(metadata.len()).map_err(|e| SedaError::InvalidValue {
            element: "Size".to_string(),
            value: metadata.len().to_string(),
            reason: e.to_string(),
        })?;

        self.message_digest = Some(digest_file(path, algorithm)?);
        self.digest_algorithm = Some(algorithm.seda_name().to_string());
        self.size = Some(size);

        let info = self.file_info.get_or_insert_with(FileInfo::default);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            info.filename = Some(name.to_string());
        }
        if let Ok(modified) = metadata.modified() {
            let modified: DateTime<Utc> = modified.into();
            info.last_modified = Some(modified.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        self.on_disk_path = Some(path.to_path_buf());

        tracing::debug!(id = %self.id(), path = %path.display(), size, "binary object updated from file");
        Ok(())
    }

    /// Recompute the digest of the on-disk file and compare it with the
    /// recorded one. False when either side is missing.
    pub fn verify_digest(&self) -> Result<bool> {
        let (Some(path), Some(expected), Some(algorithm)) = (
            self.on_disk_path.as_ref(),
            self.message_digest.as_deref(),
            self.digest_algorithm.as_deref(),
        ) else {
            return Ok(false);
        };
        let algorithm: DigestAlgorithm = algorithm.parse()?;
        Ok(digest_file(path, algorithm)?.eq_ignore_ascii_case(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const ABC_SHA512: &str = "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f";

    #[test]
    fn test_algorithm_names() {
        assert_eq!("SHA-256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
        assert_eq!("sha512".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha512);
        assert!("MD5".parse::<DigestAlgorithm>().is_err());
        assert_eq!(DigestAlgorithm::default().to_string(), "SHA-512");
    }

    #[test]
    fn test_digest_bytes() {
        assert_eq!(digest_bytes(b"abc", DigestAlgorithm::Sha256), ABC_SHA256);
        assert_eq!(digest_bytes(b"abc", DigestAlgorithm::Sha512), ABC_SHA512);
    }

    #[test]
    fn test_update_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letter.txt");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"abc").unwrap();
        drop(file);

        let mut object = BinaryDataObject::with_id("ID12");
        object.update_from_file(&path, DigestAlgorithm::Sha256).unwrap();

        assert_eq!(object.size, Some(3));
        assert_eq!(object.message_digest.as_deref(), Some(ABC_SHA256));
        assert_eq!(object.digest_algorithm.as_deref(), Some("SHA-256"));
        let info = object.file_info.as_ref().unwrap();
        assert_eq!(info.filename.as_deref(), Some("letter.txt"));
        assert!(info.last_modified.is_some());
        assert_eq!(object.content_uri(), "content/ID12.txt");
        assert!(object.verify_digest().unwrap());

        std::fs::write(&path, b"abd").unwrap();
        assert!(!object.verify_digest().unwrap());
    }

    #[test]
    fn test_missing_file() {
        let mut object = BinaryDataObject::new();
        let err = object
            .update_from_file("/nonexistent/file.bin", DigestAlgorithm::Sha512)
            .unwrap_err();
        assert!(matches!(err, SedaError::Io(_)));
        assert!(object.message_digest.is_none());
    }
}
