// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The backend-plugin contract: an abstract collaborator describing a
//! verification tool. Required methods describe identity and how to run
//! it; optional hooks (probed via `Option`, absent ⇒ no contribution)
//! let it parameterize individual pipeline stages.

mod klee;

pub use klee::KleeBackend;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Returned by [`BackendPlugin::instrumentation_options`]: which config
/// file and definitions source to use, and whether the instrumenter
/// should link the definitions in itself.
#[derive(Debug, Clone)]
pub struct InstrumentationOptions {
    pub config_file: String,
    pub definitions: String,
    pub should_link: bool,
}

/// Returned by [`BackendPlugin::slicer_options`]: the slicing criterion
/// and any extra plugin-specific slicer flags.
#[derive(Debug, Clone)]
pub struct SlicerOptions {
    pub criterion: String,
    pub extra_opts: Vec<String>,
}

impl Default for SlicerOptions {
    fn default() -> Self {
        SlicerOptions {
            criterion: "__assert_fail,__VERIFIER_error".to_string(),
            extra_opts: Vec::new(),
        }
    }
}

/// A verification backend. Every method below that returns `Option`
/// models an optional hook: an absent hook contributes nothing to that
/// stage, matching the source's `hasattr(tool, ...)` capability probing.
pub trait BackendPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn executable(&self) -> &Path;

    /// `"M.m.p"`, e.g. `"3.9.1"`.
    fn llvm_version(&self) -> &str;

    fn cmdline(
        &self,
        executable: &Path,
        tool_params: &[String],
        inputs: &[PathBuf],
        prp_file: Option<&Path>,
        extra_env: &[(String, String)],
    ) -> Vec<OsString>;

    fn determine_result(
        &self,
        returncode: i32,
        signal: i32,
        lines: &[String],
        timed_out: bool,
    ) -> String;

    fn compilation_options(&self) -> Option<Vec<String>> {
        None
    }

    fn instrumentation_options(&self) -> Option<InstrumentationOptions> {
        None
    }

    fn slicer_options(&self) -> Option<SlicerOptions> {
        None
    }

    fn passes_after_compilation(&self) -> Option<Vec<String>> {
        None
    }

    fn passes_after_instrumentation(&self) -> Option<Vec<String>> {
        None
    }

    fn passes_after_slicing(&self) -> Option<Vec<String>> {
        None
    }

    /// `(argv, output_path)`; `None` or an empty argv means no-op.
    fn postprocess_llvm(&self, artifact: &Path) -> Option<(Vec<OsString>, PathBuf)> {
        let _ = artifact;
        None
    }
}
