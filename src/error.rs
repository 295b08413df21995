// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// The single recoverable domain failure raised by any stage primitive
/// when its subprocess fails, and by the driver on invariant violations.
#[derive(Debug, Error)]
pub enum SymbioticError {
    /// A stage primitive or driver-level invariant check failed.
    #[error("{0}")]
    Stage(String),

    /// Spawning the child process itself failed (binary not found, exec
    /// permission denied, etc.) rather than the child exiting non-zero.
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),

    /// Raised internally when a keyboard-interrupt equivalent is caught;
    /// never surfaced as a verdict, only used to unwind out of a stage.
    #[error("operation cancelled")]
    Cancelled,
}

impl SymbioticError {
    pub fn stage<S: Into<String>>(msg: S) -> Self {
        SymbioticError::Stage(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SymbioticError>;
