//! Configuration module for the atrace CLI.
//!
//! An `atrace.toml` carries the tracer configuration, output defaults and
//! optional display names for type tags and owning types:
//!
//! ```toml
//! [tracer]
//! keys = ["path", "type"]
//! lifetime_histogram = true
//!
//! [output]
//! format = "summary"
//!
//! [types]
//! 5 = "T_STRING"
//!
//! [classes]
//! 0x10 = "User"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use alloctrace::report::NameTable;
use alloctrace::{OwnerType, TracerConfig, TypeTag};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::commands::common::OutputFormat;
use crate::error::{AtraceError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "atrace.toml";

/// Application configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Engine configuration used for every replay.
    #[serde(default)]
    pub tracer: TracerConfig,

    /// Report defaults.
    #[serde(default)]
    pub output: OutputConfig,

    /// Display names for type tags, keyed by tag number.
    #[serde(default)]
    pub types: BTreeMap<String, String>,

    /// Display names for owning types, keyed by decimal or `0x` hex value.
    #[serde(default)]
    pub classes: BTreeMap<String, String>,
}

/// Report defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Format used when `--format` is not given.
    #[serde(default)]
    pub format: OutputFormat,

    /// Also print per-type allocated and freed counts.
    #[serde(default)]
    pub counts: bool,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Searches the current directory, then the user configuration
    /// directory. Returns the default configuration if no file is found.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AtraceError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config
            .tracer
            .validate()
            .map_err(|e| AtraceError::Config(e.to_string()))?;

        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render as TOML text.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AtraceError::Config(format!("Failed to serialize configuration: {}", e)))
    }

    /// Display names for reports.
    pub fn names(&self) -> Result<NameTable> {
        let mut names = NameTable::new();
        for (tag, name) in &self.types {
            let tag: u32 = tag
                .parse()
                .map_err(|_| AtraceError::Config(format!("Invalid type tag in [types]: {:?}", tag)))?;
            names.insert_type(TypeTag(tag), name.clone());
        }
        for (owner, name) in &self.classes {
            let owner = parse_owner(owner).ok_or_else(|| {
                AtraceError::Config(format!("Invalid owning type in [classes]: {:?}", owner))
            })?;
            names.insert_owner(OwnerType(owner), name.clone());
        }
        Ok(names)
    }

    fn check_current_dir_config() -> Option<PathBuf> {
        let path = PathBuf::from(CONFIG_FILE_NAME);
        path.exists().then_some(path)
    }

    fn check_user_config() -> Option<PathBuf> {
        config_dir()
            .map(|dir| dir.join("atrace").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    fn find_config_file() -> Option<PathBuf> {
        Self::check_current_dir_config().or_else(Self::check_user_config)
    }
}

fn parse_owner(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloctrace::report::Naming;
    use alloctrace::{Dimension, KeyLayout};
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracer, TracerConfig::default());
        assert_eq!(config.output.format, OutputFormat::Tsv);
        assert!(!config.output.counts);
        assert!(config.types.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [tracer]
            keys = ["type", "path"]
            lifetime_histogram = true

            [output]
            format = "summary"
            counts = true

            [types]
            5 = "T_STRING"

            [classes]
            0x10 = "User"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.tracer.keys,
            KeyLayout::of(&[Dimension::Path, Dimension::Type])
        );
        assert!(config.tracer.lifetime_histogram);
        assert_eq!(config.output.format, OutputFormat::Summary);

        let names = config.names().unwrap();
        assert_eq!(names.type_name(TypeTag(5)), "T_STRING");
        assert_eq!(names.owner_name(OwnerType(16)), "User");
    }

    #[test]
    fn test_unknown_key_field_rejected() {
        let err = toml::from_str::<Config>("[tracer]\nkeys = [\"file\"]\n").unwrap_err();
        assert!(err.to_string().contains("unknown key field"));
    }

    #[test]
    fn test_invalid_type_name_key() {
        let config: Config = toml::from_str("[types]\nstring = \"T_STRING\"\n").unwrap();
        assert!(matches!(config.names(), Err(AtraceError::Config(_))));
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut original = Config::default();
        original.tracer.keys = KeyLayout::of(&[Dimension::Class]);
        original.output.format = OutputFormat::Json;
        original.types.insert("1".to_string(), "T_OBJECT".to_string());
        original.save_to_path(&path).unwrap();

        assert_eq!(Config::load_from_path(&path).unwrap(), original);
    }

    #[test]
    fn test_invalid_tracer_config_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[tracer]\ntype_tag_hint = 0\n").unwrap();

        assert!(matches!(
            Config::load_from_path(&path),
            Err(AtraceError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_nonexistent_path() {
        let result = Config::load_from_path(Path::new("/nonexistent/path/atrace.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_owner() {
        assert_eq!(parse_owner("0x1f"), Some(31));
        assert_eq!(parse_owner("42"), Some(42));
        assert_eq!(parse_owner("zz"), None);
    }
}
