//! Header command implementation.
//!
//! Prints the column names a replay report will use for a key layout.

use std::io::Write;

use alloctrace::{ScriptedHost, Tracer};

use crate::commands::common::split_keys;
use crate::config::Config;
use crate::error::Result;

/// Arguments for the header command.
#[derive(Debug, Clone, Default)]
pub struct HeaderArgs {
    /// Comma-separated key fields, overriding the configuration.
    pub keys: Option<String>,
}

/// Column names for the configured (or overridden) key layout.
pub fn header_columns(args: &HeaderArgs, config: &Config) -> Result<Vec<&'static str>> {
    let mut tracer = Tracer::new(ScriptedHost::new(), config.tracer.clone())?;
    if let Some(keys) = &args.keys {
        tracer.setup(&split_keys(keys))?;
    }
    Ok(tracer.header())
}

/// Run the header command.
pub fn run_header(args: HeaderArgs, config: Config) -> Result<()> {
    let columns = header_columns(&args, &config)?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", columns.join("\t"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_header() {
        let columns = header_columns(&HeaderArgs::default(), &Config::default()).unwrap();
        assert_eq!(&columns[..3], &["path", "line", "count"]);
        assert_eq!(columns.len(), 8);
    }

    #[test]
    fn test_header_with_keys() {
        let args = HeaderArgs {
            keys: Some("class,type".to_string()),
        };
        let columns = header_columns(&args, &Config::default()).unwrap();
        assert_eq!(&columns[..3], &["type", "class", "count"]);
    }
}
