// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The process-wide "current child" handle. Shared by all pipeline
//! threads for signal forwarding; at most one live child at a time.
//! Access is serialized by a mutex; operations on an absent child are
//! no-ops.

use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use wait_timeout::ChildExt;

static CURRENT_CHILD: LazyLock<Mutex<Option<Child>>> = LazyLock::new(|| Mutex::new(None));

/// Set once a keyboard-interrupt equivalent has been observed. Checked by
/// the process runner so a cancellation mid-pipeline is reported as
/// `SymbioticError::Cancelled` rather than an ordinary stage failure, and
/// so no further stage spawns a new child once a cancellation is pending.
static CANCELLED: AtomicBool = AtomicBool::new(false);

/// Records that cancellation has been requested and immediately forwards
/// both signals to whatever child is current (graceful, then forceful),
/// matching the driver-level "terminate then kill" sequence §5/§7
/// describe for a keyboard interrupt. Called from the SIGINT handler
/// thread installed by `process::install_sigint_handler`.
pub(crate) fn request_cancel() {
    CANCELLED.store(true, Ordering::SeqCst);
    terminate();
    kill();
}

/// `true` once a keyboard-interrupt equivalent has been observed.
pub fn cancel_requested() -> bool {
    CANCELLED.load(Ordering::SeqCst)
}

/// Registers `child` as the process-wide current child. Panics (a
/// programming error per the spec's single-child invariant) if another
/// child is already registered.
pub(crate) fn register(child: Child) {
    let mut guard = CURRENT_CHILD.lock().expect("current-child mutex poisoned");
    assert!(
        guard.is_none(),
        "attempted to register a child while another is still current"
    );
    *guard = Some(child);
}

/// Clears the current child, returning it to the caller so it can be
/// `wait()`ed on without holding the lock.
pub(crate) fn unregister() -> Option<Child> {
    CURRENT_CHILD
        .lock()
        .expect("current-child mutex poisoned")
        .take()
}

pub fn has_process() -> bool {
    CURRENT_CHILD
        .lock()
        .expect("current-child mutex poisoned")
        .is_some()
}

#[cfg(unix)]
fn send_signal(child: &Child, signal: nix::sys::signal::Signal) {
    let pid = nix::unistd::Pid::from_raw(child.id() as i32);
    let _ = nix::sys::signal::kill(pid, signal);
}

/// Sends a graceful termination request to the current child. A no-op
/// if no child is current.
pub fn terminate() {
    let mut guard = CURRENT_CHILD.lock().expect("current-child mutex poisoned");
    if let Some(child) = guard.as_mut() {
        #[cfg(unix)]
        send_signal(child, nix::sys::signal::Signal::SIGTERM);
        #[cfg(not(unix))]
        let _ = child.kill();
    }
}

/// Sends a forceful kill to the current child. A no-op if no child is
/// current.
pub fn kill() {
    let mut guard = CURRENT_CHILD.lock().expect("current-child mutex poisoned");
    if let Some(child) = guard.as_mut() {
        #[cfg(unix)]
        send_signal(child, nix::sys::signal::Signal::SIGKILL);
        #[cfg(not(unix))]
        let _ = child.kill();
    }
}

/// Repeatedly sends the kill signal every 500ms until the current
/// child's exit status becomes available. A no-op if no child is
/// current.
pub fn kill_wait() {
    loop {
        let exited = {
            let mut guard = CURRENT_CHILD.lock().expect("current-child mutex poisoned");
            match guard.as_mut() {
                None => return,
                Some(child) => {
                    #[cfg(unix)]
                    send_signal(child, nix::sys::signal::Signal::SIGKILL);
                    #[cfg(not(unix))]
                    let _ = child.kill();
                    matches!(
                        child.wait_timeout(Duration::from_millis(0)),
                        Ok(Some(_))
                    )
                }
            }
        };
        if exited {
            crate::logger::print_stdout("Killed the child process", None, None, true);
            return;
        }
        crate::logger::print_stdout(
            "Waiting for the child process to terminate",
            None,
            None,
            true,
        );
        std::thread::sleep(Duration::from_millis(500));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // CANCELLED is a one-way latch with no reset, so this is the only test
    // in the binary allowed to flip it — anything else observing
    // cancel_requested() after this runs would see `true`.
    #[test]
    fn request_cancel_sets_the_latch_and_is_idempotent() {
        assert!(!cancel_requested());
        request_cancel();
        assert!(cancel_requested());
        request_cancel();
        assert!(cancel_requested());
    }
}
