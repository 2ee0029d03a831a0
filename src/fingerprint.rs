use std::{
    collections::HashSet,
    fs::{self, File},
    io::{Error as IoError, Read},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use glob::{GlobError, PatternError, glob};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("Invalid glob pattern: {0}")]
    GlobPattern(#[from] PatternError),
    #[error("Failed to expand glob: {0}")]
    GlobExpansion(#[from] GlobError),
    #[error("'{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: IoError,
    },
}

impl FileError {
    fn io(path: &Path, source: IoError) -> Self {
        FileError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Snapshot of one input file as seen at the end of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
    pub size: u64,
    pub hash: String,
}

impl Fingerprint {
    pub fn of(path: &Path) -> Result<Self, FileError> {
        let (mtime_secs, mtime_nanos, size) = stat(path)?;
        Ok(Fingerprint {
            mtime_secs,
            mtime_nanos,
            size,
            hash: hash_file(path)?,
        })
    }

    /// Compare `path` against this fingerprint.
    ///
    /// Unchanged mtime and size short-circuit to [`Comparison::Unchanged`];
    /// otherwise the content hash decides. A touched file with identical
    /// content yields its new fingerprint so the caller can store it and
    /// skip the hash next time.
    pub fn compare(&self, path: &Path) -> Result<Comparison, FileError> {
        let (mtime_secs, mtime_nanos, size) = stat(path)?;
        if mtime_secs == self.mtime_secs && mtime_nanos == self.mtime_nanos && size == self.size {
            return Ok(Comparison::Unchanged);
        }
        if size != self.size {
            return Ok(Comparison::Changed);
        }

        let hash = hash_file(path)?;
        if hash != self.hash {
            return Ok(Comparison::Changed);
        }
        Ok(Comparison::Touched(Fingerprint {
            mtime_secs,
            mtime_nanos,
            size,
            hash,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Unchanged,
    /// Same content under a new mtime.
    Touched(Fingerprint),
    Changed,
}

fn stat(path: &Path) -> Result<(u64, u32, u64), FileError> {
    let metadata = fs::metadata(path).map_err(|e| FileError::io(path, e))?;
    let modified = metadata.modified().map_err(|e| FileError::io(path, e))?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok((
        since_epoch.as_secs(),
        since_epoch.subsec_nanos(),
        metadata.len(),
    ))
}

pub fn hash_file(path: &Path) -> Result<String, FileError> {
    let mut file = File::open(path).map_err(|e| FileError::io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file.read(&mut buf).map_err(|e| FileError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Expand `pattern` (relative to `base`) to the regular files it matches,
/// sorted. Metacharacters inside `base` itself are escaped.
pub fn glob_files(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, FileError> {
    let escaped_base = glob::Pattern::escape(&base.to_string_lossy());
    let full = format!("{}/{}", escaped_base.trim_end_matches('/'), pattern);

    let mut files = glob(&full)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|p| p.is_file())
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

/// Concatenate path lists, dropping duplicates while keeping first-seen order.
pub fn dedup_paths<I>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn push_mtime(file: &Path, secs: u64) {
        File::options()
            .write(true)
            .open(file)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn untouched_file_is_unchanged() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();
        let fp = Fingerprint::of(&file).unwrap();

        assert_eq!(fp.compare(&file).unwrap(), Comparison::Unchanged);
    }

    #[test]
    fn touch_without_content_change_yields_fresh_fingerprint() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();
        let fp = Fingerprint::of(&file).unwrap();

        push_mtime(&file, 5);

        let Comparison::Touched(fresh) = fp.compare(&file).unwrap() else {
            panic!("expected a touched file");
        };
        assert_eq!(fresh.hash, fp.hash);
        assert_ne!(
            (fresh.mtime_secs, fresh.mtime_nanos),
            (fp.mtime_secs, fp.mtime_nanos)
        );
        assert_eq!(fresh.compare(&file).unwrap(), Comparison::Unchanged);
    }

    #[test]
    fn content_change_is_detected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();
        let fp = Fingerprint::of(&file).unwrap();

        fs::write(&file, "HELLO").unwrap();
        push_mtime(&file, 5);

        assert_eq!(fp.compare(&file).unwrap(), Comparison::Changed);
    }

    #[test]
    fn glob_files_skips_directories_and_sorts() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg/b/src")).unwrap();
        fs::create_dir_all(dir.path().join("pkg/a/src/nested.ts")).unwrap();
        fs::write(dir.path().join("pkg/b/src/index.ts"), "").unwrap();
        fs::write(dir.path().join("pkg/a/src/widget.tsx"), "").unwrap();

        let files = glob_files(dir.path(), "pkg/**/src/**/*.ts*").unwrap();

        assert_eq!(
            files,
            vec![
                dir.path().join("pkg/a/src/widget.tsx"),
                dir.path().join("pkg/b/src/index.ts"),
            ]
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let paths = vec![
            PathBuf::from("b"),
            PathBuf::from("a"),
            PathBuf::from("b"),
        ];
        assert_eq!(
            dedup_paths(paths),
            vec![PathBuf::from("b"), PathBuf::from("a")]
        );
    }
}
