//! Init command implementation.
//!
//! Writes a starter `atrace.toml` holding the default tracer configuration.

use std::path::PathBuf;

use alloctrace::KeyLayout;

use crate::commands::common::split_keys;
use crate::config::{Config, CONFIG_FILE_NAME};
use crate::error::{AtraceError, Result};

/// Arguments for the init command.
#[derive(Debug, Clone, Default)]
pub struct InitArgs {
    /// Enable verbose output.
    pub verbose: bool,
    /// Overwrite an existing configuration file.
    pub force: bool,
    /// Directory to write into (default: current directory).
    pub path: Option<PathBuf>,
    /// Key fields to record in the file.
    pub keys: Option<String>,
}

/// Init command handler.
pub struct InitCommand {
    args: InitArgs,
}

impl InitCommand {
    /// Create a new InitCommand.
    pub fn new(args: InitArgs) -> Self {
        Self { args }
    }

    /// Execute the command, returning the path written.
    pub fn run(&self) -> Result<PathBuf> {
        let dir = self.args.path.clone().unwrap_or_else(|| PathBuf::from("."));
        if dir.exists() && !dir.is_dir() {
            return Err(AtraceError::Validation(format!(
                "Target is not a directory: {}",
                dir.display()
            )));
        }

        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() && !self.args.force {
            return Err(AtraceError::Validation(format!(
                "Configuration file already exists: {} (use --force to overwrite)",
                config_path.display()
            )));
        }

        let mut config = Config::default();
        if let Some(keys) = &self.args.keys {
            config.tracer.keys = KeyLayout::parse(&split_keys(keys))?;
        }
        config.save_to_path(&config_path)?;

        if self.args.verbose {
            eprintln!("Created {}", config_path.display());
        }
        tracing::info!("wrote {}", config_path.display());
        Ok(config_path)
    }
}

/// Run the init command.
pub fn run_init(args: InitArgs) -> Result<()> {
    InitCommand::new(args).run().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloctrace::Dimension;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = InitCommand::new(InitArgs {
            path: Some(temp_dir.path().to_path_buf()),
            ..InitArgs::default()
        })
        .run()
        .unwrap();

        assert_eq!(Config::load_from_path(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_init_with_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = InitCommand::new(InitArgs {
            path: Some(temp_dir.path().join("new")),
            keys: Some("type,class".to_string()),
            ..InitArgs::default()
        })
        .run()
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(
            config.tracer.keys,
            KeyLayout::of(&[Dimension::Type, Dimension::Class])
        );
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let args = InitArgs {
            path: Some(temp_dir.path().to_path_buf()),
            ..InitArgs::default()
        };
        InitCommand::new(args.clone()).run().unwrap();

        let err = InitCommand::new(args.clone()).run().unwrap_err();
        assert!(matches!(err, AtraceError::Validation(_)));

        InitCommand::new(InitArgs { force: true, ..args }).run().unwrap();
    }
}
