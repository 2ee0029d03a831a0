use thiserror::Error;

use crate::{action::ActionError, fingerprint::FileError};

#[derive(Debug, Error)]
pub enum DodoError {
    #[error("Task error: {0}")]
    Task(String),
    #[error("Dependency error: {0}")]
    Dependency(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File error: {0}")]
    File(#[from] FileError),
    #[error("Task '{task}' failed: {source}")]
    Action {
        task: String,
        #[source]
        source: ActionError,
    },
    #[error("Ledger error: {0}")]
    Ledger(#[source] serde_json::Error),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<toml::de::Error> for DodoError {
    fn from(err: toml::de::Error) -> Self {
        DodoError::Parse(err.to_string())
    }
}

impl DodoError {
    /// Process exit code for this error: a failing subprocess's own code
    /// when there is one, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            DodoError::Action {
                source: ActionError::Exit { code: Some(code), .. },
                ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, DodoError>;
