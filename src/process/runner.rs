// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Spawns a child process, streams its output line-by-line to a watcher,
//! and awaits completion.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::mpsc;

use crate::error::{Result, SymbioticError};
use crate::process::child;
use crate::watch::Watch;

/// Runs `argv`, feeding each output line to `watcher.parse()` in arrival
/// order, and fails with `SymbioticError::Stage(fail_msg)` on a non-zero
/// exit or spawn failure.
///
/// stdout and stderr are read on two dedicated threads and merged onto
/// one channel in receive order. This is a best-effort interleaving: the
/// original merges the two streams at the OS level
/// (`subprocess.STDOUT`), which `std::process::Command` cannot express
/// without redirecting the child's stderr file descriptor onto stdout's
/// pipe before exec — not expressible from safe `std::process`. Lines
/// within a single stream are always delivered in the order the child
/// wrote them; true cross-stream ordering is approximate.
///
/// Checks `child::cancel_requested()` both before spawning and after the
/// child exits, returning `SymbioticError::Cancelled` instead of the
/// ordinary spawn/exit-status handling in either case — this is how a
/// SIGINT observed by `process::install_sigint_handler` turns into the
/// driver-level cancellation path.
pub fn run<S: AsRef<OsStr>>(
    argv: &[S],
    watcher: &mut dyn Watch,
    fail_msg: &str,
) -> Result<()> {
    assert!(!argv.is_empty(), "argv must have at least one element");

    if child::cancel_requested() {
        return Err(SymbioticError::Cancelled);
    }

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child_proc = cmd.spawn()?;
    let stdout = child_proc
        .stdout
        .take()
        .expect("stdout was requested as piped");
    let stderr = child_proc
        .stderr
        .take()
        .expect("stderr was requested as piped");

    child::register(child_proc);

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let tx_out = tx.clone();
    let out_thread = std::thread::spawn(move || stream_lines(stdout, tx_out));
    let err_thread = std::thread::spawn(move || stream_lines(stderr, tx));

    for line in rx {
        watcher.parse(&line);
    }

    let _ = out_thread.join();
    let _ = err_thread.join();

    let mut child_proc = child::unregister().expect("runner registered this child");
    let status = child_proc.wait()?;

    if child::cancel_requested() {
        return Err(SymbioticError::Cancelled);
    }

    if !status.success() {
        return Err(SymbioticError::stage(fail_msg.to_string()));
    }

    Ok(())
}

/// Reads newline-terminated lines from `reader`, flushing the last
/// partial line at EOF, sending each raw byte-line over `tx`.
fn stream_lines<R: std::io::Read>(reader: R, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = BufReader::new(reader);
    loop {
        let mut line = Vec::new();
        match buf.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}
