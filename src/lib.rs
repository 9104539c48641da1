//! SEDA Archival Package Codec
//!
//! In-memory object graph and streaming XML codec for SEDA archival
//! transfer packages: archive units, data object groups, binary and
//! physical data objects, with versioned descriptive metadata.
//!
//! ## Features
//!
//! - **Package Graph**: nodes stored by id, reference lists holding ids only
//! - **Versioned Metadata**: per-version schema tables for SEDA 2.1, 2.2 and 2.3
//! - **Streaming Codec**: manifest import and export, nested or flat unit layout
//! - **Graph Algorithms**: cycle detection, group normalization, id regeneration
//! - **Progress and Cancellation**: per-node reports and cancellation checks
//!
//! ## Architecture
//!
//! ```text
//! ArchiveTransfer
//! ├── GlobalMetadata (header and footer)
//! └── DataObjectPackage
//!     ├── ghost root ──> root ArchiveUnits ──> child ArchiveUnits
//!     │                        └──> DataObjectGroups / data objects
//!     ├── DataObjectGroup ──> BinaryDataObject, PhysicalDataObject
//!     └── ManagementMetadata (raw)
//! ```

pub mod config;
pub mod digest;
pub mod error;
pub mod graph;
pub mod metadata;
pub mod package;
pub mod progress;
pub mod transfer;
pub mod version;
pub mod xml;

pub use config::SedaConfig;
pub use digest::{digest_file, DigestAlgorithm};
pub use error::{Result, SedaError};
pub use metadata::{Composite, Metadata, SedaDateTime, Value};
pub use package::{
    ArchiveUnit, BinaryDataObject, DataObjectGroup, DataObjectPackage, PhysicalDataObject, ReferenceList,
};
pub use progress::{CancellationToken, ProgressLevel, ProgressLogger};
pub use transfer::{ArchiveTransfer, ExportOptions, GlobalMetadata, ImportOptions, UnitLayout};
pub use version::SedaVersion;
