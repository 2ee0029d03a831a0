use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{DodoError, Result},
    fingerprint::{FileError, Fingerprint},
};

pub const DEFAULT_LEDGER_FILENAME: &str = ".dodo-ledger.json";

/// Input fingerprints of one task at its last successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub inputs: BTreeMap<PathBuf, Fingerprint>,
}

impl TaskRecord {
    pub fn capture(file_dep: &[PathBuf]) -> std::result::Result<Self, FileError> {
        let mut inputs = BTreeMap::new();
        for path in file_dep {
            inputs.insert(path.clone(), Fingerprint::of(path)?);
        }
        Ok(TaskRecord { inputs })
    }

    pub fn covers(&self, file_dep: &[PathBuf]) -> bool {
        self.inputs.len() == file_dep.len() && file_dep.iter().all(|p| self.inputs.contains_key(p))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    tasks: BTreeMap<String, TaskRecord>,
}

impl Ledger {
    /// Read the ledger at `path`. A missing or unreadable ledger is treated as
    /// empty, which only costs a full rebuild.
    pub fn load(path: &Path) -> Self {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(_) => {
                debug!(ledger = %path.display(), "no ledger found, starting empty");
                return Ledger::default();
            }
        };

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(ledger = %path.display(), error = %e, "ignoring unreadable ledger");
                Ledger::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self).map_err(DodoError::Ledger)?;
        debug!(ledger = %path.display(), tasks = self.tasks.len(), "ledger saved");
        Ok(())
    }

    pub fn record(&self, task_id: &str) -> Option<&TaskRecord> {
        self.tasks.get(task_id)
    }

    pub fn insert(&mut self, task_id: &str, record: TaskRecord) {
        self.tasks.insert(task_id.to_string(), record);
    }

    /// Replace stored input fingerprints of `task_id` with fresher ones of
    /// the same content.
    pub fn refresh<I>(&mut self, task_id: &str, inputs: I)
    where
        I: IntoIterator<Item = (PathBuf, Fingerprint)>,
    {
        if let Some(record) = self.tasks.get_mut(task_id) {
            record.inputs.extend(inputs);
        }
    }

    /// Drop what is known about `task_id`; returns whether a record existed.
    pub fn forget(&mut self, task_id: &str) -> bool {
        self.tasks.remove(task_id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Ledger location: `configured` if absolute, else resolved against `root`.
pub fn ledger_path(root: &Path, configured: Option<&str>) -> PathBuf {
    let name = configured.unwrap_or(DEFAULT_LEDGER_FILENAME);

    if Path::new(name).is_absolute() {
        PathBuf::from(name)
    } else {
        root.join(name)
    }
}
