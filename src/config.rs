//! Configuration for package import and export
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (seda.toml)
//! - Environment variables (SEDA__*)
//!
//! ## Example config file (seda.toml):
//! ```toml
//! [schema]
//! version = "2.2"
//!
//! [export]
//! layout = "flat"
//! indented = true
//! xml_id_attributes = false
//!
//! [import]
//! check_cycles = true
//!
//! [progress]
//! object_step = 1000
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::progress::{ProgressLogger, DEFAULT_OBJECT_STEP};
use crate::transfer::{ExportOptions, ImportOptions, UnitLayout};
use crate::version::SedaVersion;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SedaConfig {
    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// SEDA version used for new packages and for export
    #[serde(default)]
    pub version: SedaVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub layout: UnitLayout,

    /// Indent nested elements
    #[serde(default = "default_true")]
    pub indented: bool,

    /// Write `xml:id` instead of `id`
    #[serde(default)]
    pub xml_id_attributes: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Run cycle detection after reading a manifest
    #[serde(default = "default_true")]
    pub check_cycles: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Nodes between two object-level progress reports, 0 to disable
    #[serde(default = "default_object_step")]
    pub object_step: u64,
}

fn default_true() -> bool {
    true
}

fn default_object_step() -> u64 {
    DEFAULT_OBJECT_STEP
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            layout: UnitLayout::default(),
            indented: true,
            xml_id_attributes: false,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self { check_cycles: true }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            object_step: default_object_step(),
        }
    }
}

impl SedaConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["seda.toml", ".seda.toml", "config/seda.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("fr", "seda", "seda-package") {
            let xdg_config = dirs.config_dir().join("seda.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // SEDA__EXPORT__LAYOUT=flat
        builder = builder.add_source(
            Environment::with_prefix("SEDA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            version: None,
            check_cycles: self.import.check_cycles,
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            version: Some(self.schema.version),
            layout: self.export.layout,
            indented: self.export.indented,
            xml_id_attributes: self.export.xml_id_attributes,
        }
    }

    pub fn progress_logger(&self) -> ProgressLogger {
        ProgressLogger::new().with_object_step(self.progress.object_step)
    }
}
