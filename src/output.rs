use std::{
    io::Write,
    sync::{Mutex, OnceLock},
};

use clap::ValueEnum;
use serde::Deserialize;

#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Stream task output live.
    Stream,
    /// Print each command's output as a single block after it completes.
    Group,
}

static OUTPUT_PRINT_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn output_print_lock() -> &'static Mutex<()> {
    OUTPUT_PRINT_LOCK.get_or_init(|| Mutex::new(()))
}

/// Print captured output of one command without interleaving with other
/// tasks running in the same level.
pub fn print_group(task_id: &str, command: &str, stdout: &[u8], stderr: &[u8]) {
    if stdout.is_empty() && stderr.is_empty() {
        return;
    }

    let _guard = output_print_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "--- {} | {}", task_id, command);
    let _ = out.write_all(stdout);
    let _ = out.flush();
    drop(out);

    if !stderr.is_empty() {
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(stderr);
        let _ = err.flush();
    }
}
