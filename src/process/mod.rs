// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Subprocess execution and the process-wide current-child handle used
//! for cancellation (terminate/kill/kill_wait).

mod child;
mod runner;

pub use child::{cancel_requested, has_process, kill, kill_wait, terminate};
pub use runner::run;

use crate::error::{Result, SymbioticError};

/// Installs the process-wide SIGINT handler (the "keyboard-interrupt
/// equivalent" of spec.md §5/§7). The handler runs on its own thread
/// (spawned by `ctrlc`) and does two things: forwards `terminate`/`kill`
/// straight to whatever child is current, and flips the cancellation
/// flag the runner checks before and after every `run()` call. Call this
/// once, early in `main`, before the pipeline starts; it is not wired
/// automatically so library consumers that embed `Session` without a
/// terminal (e.g. under a supervisor with its own signal policy) aren't
/// forced to take it.
pub fn install_sigint_handler() -> Result<()> {
    ctrlc::set_handler(child::request_cancel)
        .map_err(|e| SymbioticError::stage(format!("failed to install SIGINT handler: {e}")))
}
