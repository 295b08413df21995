// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A concrete [`BackendPlugin`] for the KLEE symbolic executor. The
//! upstream project's tool-plugin modules were filtered out of the
//! retained original source (only the driver, `symbiotic.py`, survived),
//! so this implementation is reconstructed from the driver-side call
//! sites and KLEE's well-known `ktest`/stderr vocabulary rather than
//! transliterated from a `tools/klee.py` that isn't available here.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{BackendPlugin, SlicerOptions};

pub struct KleeBackend {
    executable: PathBuf,
    llvm_version: String,
}

impl KleeBackend {
    pub fn new(executable: PathBuf, llvm_version: impl Into<String>) -> Self {
        KleeBackend {
            executable,
            llvm_version: llvm_version.into(),
        }
    }
}

impl BackendPlugin for KleeBackend {
    fn name(&self) -> &str {
        "klee"
    }

    fn executable(&self) -> &Path {
        &self.executable
    }

    fn llvm_version(&self) -> &str {
        &self.llvm_version
    }

    fn cmdline(
        &self,
        executable: &Path,
        tool_params: &[String],
        inputs: &[PathBuf],
        prp_file: Option<&Path>,
        extra_env: &[(String, String)],
    ) -> Vec<OsString> {
        let _ = extra_env; // KLEE takes no extra environment wiring from the driver
        let mut argv = vec![executable.as_os_str().to_os_string()];
        argv.push("--exit-on-error".into());
        if let Some(prp) = prp_file {
            argv.push("--prp".into());
            argv.push(prp.as_os_str().to_os_string());
        }
        for p in tool_params {
            argv.push(p.into());
        }
        for input in inputs {
            argv.push(input.as_os_str().to_os_string());
        }
        argv
    }

    fn determine_result(
        &self,
        returncode: i32,
        signal: i32,
        lines: &[String],
        timed_out: bool,
    ) -> String {
        if timed_out {
            return "unknown".to_string();
        }
        if signal != 0 {
            return format!("ERROR (signal {signal})");
        }
        for line in lines {
            if line.contains("ASSERTION FAIL") || line.contains("unreachable call") {
                return "false(unreach-call)".to_string();
            }
            if line.contains("memory error") || line.contains("out of bound pointer") {
                return "false(valid-deref)".to_string();
            }
            if line.contains("overflow") {
                return "false(no-overflow)".to_string();
            }
        }
        if returncode == 0 {
            "true".to_string()
        } else {
            "unknown".to_string()
        }
    }

    fn passes_after_compilation(&self) -> Option<Vec<String>> {
        Some(Vec::new())
    }

    fn slicer_options(&self) -> Option<SlicerOptions> {
        Some(SlicerOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> KleeBackend {
        KleeBackend::new(PathBuf::from("/usr/bin/klee"), "3.9.1".to_string())
    }

    #[test]
    fn assertion_failure_maps_to_unreach_call() {
        let b = backend();
        let lines = vec!["KLEE: ERROR: ASSERTION FAIL: 0".to_string()];
        assert_eq!(
            b.determine_result(1, 0, &lines, false),
            "false(unreach-call)"
        );
    }

    #[test]
    fn clean_exit_with_no_error_lines_is_true() {
        let b = backend();
        assert_eq!(b.determine_result(0, 0, &[], false), "true");
    }

    #[test]
    fn timeout_is_unknown_regardless_of_output() {
        let b = backend();
        let lines = vec!["KLEE: ERROR: ASSERTION FAIL: 0".to_string()];
        assert_eq!(b.determine_result(1, 0, &lines, true), "unknown");
    }
}
