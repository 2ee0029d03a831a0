//! Interactive launch of the long-running lab application.
//!
//! The application asks "shut down this server (y/[n])?" when it receives an
//! interrupt. The launcher answers that prompt itself, so Ctrl-C ends the
//! session cleanly, and the session is always reported as a success.

use std::{future::Future, process::Stdio};

use tokio::{io::AsyncWriteExt, process::Child};
use tracing::{debug, info, warn};

use crate::action::{ActionError, ProcessSpec};

const CONFIRM_SHUTDOWN: &[u8] = b"y\n";

/// Run `spec` until it exits or the user presses Ctrl-C.
pub async fn launch(spec: &ProcessSpec, env: &[(String, String)]) -> Result<(), ActionError> {
    launch_until(spec, env, interrupted()).await
}

/// Like [`launch`], with the interrupt source supplied by the caller.
pub async fn launch_until<F>(
    spec: &ProcessSpec,
    env: &[(String, String)],
    interrupt: F,
) -> Result<(), ActionError>
where
    F: Future<Output = ()>,
{
    let command = spec.command_line();
    let mut cmd = spec.command(env)?;
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|source| ActionError::Spawn {
        command: command.clone(),
        source,
    })?;
    let mut stdin = child.stdin.take();

    info!(command = %command, pid = ?child.id(), "application started");

    tokio::pin!(interrupt);

    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut interrupt => {
            info!("interrupt received, asking the application to shut down");
            terminate(&mut child);

            if let Some(mut input) = stdin.take() {
                if let Err(e) = input.write_all(CONFIRM_SHUTDOWN).await {
                    debug!(error = %e, "application closed its input before confirmation");
                }
                drop(input);
            }

            child.wait().await
        }
    };

    match status {
        Ok(status) => info!(command = %command, status = %status, "application exited"),
        Err(e) => warn!(command = %command, error = %e, "lost track of application"),
    }

    Ok(())
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C; waiting for the application instead");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::{
        sys::signal::{Signal, kill},
        unistd::Pid,
    };

    let Some(pid) = child.id() else {
        return;
    };

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!(pid, error = %e, "could not deliver SIGTERM");
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "could not stop application");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, time::Duration};
    use tempfile::tempdir;
    use tokio::time::sleep;

    fn spec(script: &str) -> ProcessSpec {
        ProcessSpec {
            argv: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            cwd: None,
            check: false,
        }
    }

    #[tokio::test]
    async fn nonzero_exit_is_still_success() {
        let result = launch_until(&spec("exit 9"), &[], std::future::pending()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn interrupt_terminates_and_reports_success() {
        let result = launch_until(
            &spec("sleep 30"),
            &[],
            sleep(Duration::from_millis(200)),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn interrupt_answers_the_shutdown_prompt() {
        let dir = tempdir().unwrap();
        let answer = dir.path().join("answer.txt");
        let script = format!(
            "trap '' TERM; read reply; echo \"$reply\" > '{}'",
            answer.display()
        );

        launch_until(&spec(&script), &[], sleep(Duration::from_millis(200)))
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&answer).unwrap().trim(), "y");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let missing = ProcessSpec {
            argv: vec!["dodo-no-such-program".to_string()],
            cwd: None,
            check: false,
        };
        let result = launch_until(&missing, &[], std::future::pending()).await;
        assert!(matches!(result, Err(ActionError::Spawn { .. })));
    }
}
