use std::{
    fmt, fs,
    io::Error as IoError,
    path::{Path, PathBuf},
    process::Stdio,
    time::SystemTime,
};

use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use crate::{
    launch,
    output::{OutputMode, print_group},
};

/// One step of a task. Steps of a task run strictly in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RunProcess(ProcessSpec),
    EnsureDir(PathBuf),
    RemoveTree(PathBuf),
    CopyTree { src: PathBuf, dst: PathBuf },
    Touch(PathBuf),
    Unlink(PathBuf),
    /// Long-running interactive application, see [`launch`].
    Launch(ProcessSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// When false the exit status is logged and otherwise ignored.
    pub check: bool,
}

impl ProcessSpec {
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    pub(crate) fn command(&self, env: &[(String, String)]) -> Result<TokioCommand, ActionError> {
        let (program, args) = self.argv.split_first().ok_or(ActionError::EmptyCommand)?;

        let mut cmd = TokioCommand::new(program);
        cmd.args(args);
        cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        Ok(cmd)
    }
}

impl Action {
    pub fn run<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::RunProcess(ProcessSpec {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            check: true,
        })
    }

    pub fn run_in<I, S>(argv: I, cwd: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::RunProcess(ProcessSpec {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: Some(cwd.into()),
            check: true,
        })
    }

    /// Run a process whose exit status does not decide the task's outcome.
    pub fn call<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::RunProcess(ProcessSpec {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            check: false,
        })
    }

    pub fn launch<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::Launch(ProcessSpec {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            check: false,
        })
    }

    pub fn copy_tree(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Action::CopyTree {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::RunProcess(spec) => match &spec.cwd {
                Some(cwd) => write!(f, "(cd {}) {}", cwd.display(), spec.command_line()),
                None => write!(f, "{}", spec.command_line()),
            },
            Action::EnsureDir(path) => write!(f, "mkdir -p {}", path.display()),
            Action::RemoveTree(path) => write!(f, "rm -rf {}", path.display()),
            Action::CopyTree { src, dst } => {
                write!(f, "cp -r {} {}", src.display(), dst.display())
            }
            Action::Touch(path) => write!(f, "touch {}", path.display()),
            Action::Unlink(path) => write!(f, "rm -f {}", path.display()),
            Action::Launch(spec) => write!(f, "launch {}", spec.command_line()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("could not start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: IoError,
    },
    #[error("'{command}' exited with {}", describe_code(.code))]
    Exit { command: String, code: Option<i32> },
    #[error("{op} '{}': {source}", .path.display())]
    Fs {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("empty command line")]
    EmptyCommand,
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn fs_error<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(IoError) -> ActionError + 'a {
    move |source| ActionError::Fs {
        op,
        path: path.to_path_buf(),
        source,
    }
}

/// What every action of an invocation shares.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Extra variables for every child process.
    pub env: Vec<(String, String)>,
    pub output: OutputMode,
}

pub async fn execute(task_id: &str, action: &Action, ctx: &ExecContext) -> Result<(), ActionError> {
    debug!(task = %task_id, action = %action, "executing action");

    match action {
        Action::RunProcess(spec) => run_process(task_id, spec, ctx).await,
        Action::Launch(spec) => launch::launch(spec, &ctx.env).await,
        Action::EnsureDir(path) => fs::create_dir_all(path).map_err(fs_error("create", path)),
        Action::RemoveTree(path) => remove_tree(path),
        Action::CopyTree { src, dst } => copy_tree(src, dst),
        Action::Touch(path) => touch(path),
        Action::Unlink(path) => unlink(path),
    }
}

async fn run_process(task_id: &str, spec: &ProcessSpec, ctx: &ExecContext) -> Result<(), ActionError> {
    let command = spec.command_line();
    let mut cmd = spec.command(&ctx.env)?;
    cmd.stdin(Stdio::null());

    let status = match ctx.output {
        OutputMode::Stream => {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            cmd.status().await.map_err(|source| ActionError::Spawn {
                command: command.clone(),
                source,
            })?
        }
        OutputMode::Group => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            let output = cmd.output().await.map_err(|source| ActionError::Spawn {
                command: command.clone(),
                source,
            })?;
            print_group(task_id, &command, &output.stdout, &output.stderr);
            output.status
        }
    };

    if status.success() {
        return Ok(());
    }

    if !spec.check {
        info!(task = %task_id, command = %command, status = %status, "ignoring exit status");
        return Ok(());
    }

    Err(ActionError::Exit {
        command,
        code: status.code(),
    })
}

fn remove_tree(path: &Path) -> Result<(), ActionError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => {
            debug!(path = %path.display(), "nothing to remove");
            return Ok(());
        }
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(fs_error("remove", path))
    } else {
        fs::remove_file(path).map_err(fs_error("remove", path))
    }
}

fn unlink(path: &Path) -> Result<(), ActionError> {
    if fs::symlink_metadata(path).is_err() {
        debug!(path = %path.display(), "nothing to unlink");
        return Ok(());
    }
    fs::remove_file(path).map_err(fs_error("unlink", path))
}

fn touch(path: &Path) -> Result<(), ActionError> {
    let file = fs::File::options()
        .create(true)
        .append(true)
        .open(path)
        .map_err(fs_error("touch", path))?;
    file.set_modified(SystemTime::now())
        .map_err(fs_error("touch", path))
}

/// Recursively copy `src` into a new directory `dst`.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), ActionError> {
    if dst.exists() {
        return Err(ActionError::Fs {
            op: "copy into existing",
            path: dst.to_path_buf(),
            source: IoError::from(std::io::ErrorKind::AlreadyExists),
        });
    }

    fs::create_dir_all(dst).map_err(fs_error("create", dst))?;

    for entry in fs::read_dir(src).map_err(fs_error("read", src))? {
        let entry = entry.map_err(fs_error("read", src))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(fs_error("stat", &from))?;

        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(fs_error("copy", &from))?;
        }
    }

    Ok(())
}
