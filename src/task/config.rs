use std::{fs, io::ErrorKind, path::Path};

use serde::Deserialize;
use tracing::debug;

use crate::{error::Result, output::OutputMode};

pub const DEFAULT_CONFIG_FILENAME: &str = "dodo.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    config: Option<ConfigSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigSection {
    default_tasks: Option<Vec<String>>,
    workers: Option<usize>,
    ledger: Option<String>,
    output: Option<OutputMode>,
}

/// Invocation defaults read from the optional config file. Command-line
/// flags take precedence over every field.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunConfiguration {
    pub default_tasks: Option<Vec<String>>,
    pub workers: Option<usize>,
    pub ledger: Option<String>,
    pub output: Option<OutputMode>,
}

/// Load `config_path`; a missing file yields the defaults.
pub fn load_config(config_path: &Path) -> Result<RunConfiguration> {
    let contents = match fs::read_to_string(config_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(config = %config_path.display(), "no config file, using defaults");
            return Ok(RunConfiguration::default());
        }
        Err(e) => return Err(e.into()),
    };

    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<RunConfiguration> {
    let file: ConfigFile = toml::from_str(contents)?;
    let section = file.config.unwrap_or_default();

    Ok(RunConfiguration {
        default_tasks: section.default_tasks,
        workers: section.workers,
        ledger: section.ledger,
        output: section.output,
    })
}
