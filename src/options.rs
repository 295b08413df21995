// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read-only configuration surface consumed by the pipeline. Populating
//! these fields from argv or an option file is an external collaborator's
//! job; this crate only defines the record and a capability view over it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The property under verification. Selects stage-conditional branches in
/// the driver; never mutates during a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Property {
    memsafety: bool,
    signedoverflow: bool,
    undefinedness: bool,
    prp_file: Option<PathBuf>,
}

impl Property {
    pub fn new(
        memsafety: bool,
        signedoverflow: bool,
        undefinedness: bool,
        prp_file: Option<PathBuf>,
    ) -> Self {
        Self {
            memsafety,
            signedoverflow,
            undefinedness,
            prp_file,
        }
    }

    pub fn memsafety(&self) -> bool {
        self.memsafety
    }

    pub fn signedoverflow(&self) -> bool {
        self.signedoverflow
    }

    pub fn undefinedness(&self) -> bool {
        self.undefinedness
    }

    pub fn get_prp_file(&self) -> Option<&PathBuf> {
        self.prp_file.as_ref()
    }
}

/// Pointer-analysis mode accepted by the slicer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlicerPta {
    FlowInsensitive,
    FlowSensitive,
}

impl SlicerPta {
    pub fn as_flag(self) -> &'static str {
        match self {
            SlicerPta::FlowInsensitive => "fi",
            SlicerPta::FlowSensitive => "fs",
        }
    }
}

/// The configuration bag consumed (read-only) by the pipeline. Fields are
/// `pub` but nothing in this crate mutates an `Options` value after
/// `Session::new` — `Session` keeps its own working copy of
/// `disabled_optimizations`, the one field the original mutates mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub cflags: Vec<String>,
    pub cppflags: Vec<String>,
    pub is32bit: bool,
    pub add_libc: bool,
    pub link_files: Vec<String>,
    pub linkundef: Vec<String>,
    pub undefined_are_pure: bool,
    pub slicer_pta: Option<SlicerPta>,
    pub slicer_params: Vec<String>,
    pub repeat_slicing: u32,
    pub optlevel: Vec<String>,
    pub no_optimize: bool,
    pub disabled_optimizations: Vec<String>,
    pub noslice: bool,
    pub source_is_bc: bool,
    pub stats: bool,
    pub instrumentation_files_path: PathBuf,
    pub no_verification: bool,
    pub tool_params: Vec<String>,
    pub final_output: Option<PathBuf>,
    pub property: Property,
}

/// Hand-written rather than derived: `repeat_slicing ≥ 1` is an invariant
/// (SPEC_FULL §6) and a derived `#[derive(Default)]` would zero it,
/// silently turning `perform_slicing`'s `for n in 0..repeat_slicing` into
/// a no-op loop for any fixture built from `Options::default()`.
impl Default for Options {
    fn default() -> Self {
        Options {
            cflags: Vec::new(),
            cppflags: Vec::new(),
            is32bit: false,
            add_libc: false,
            link_files: Vec::new(),
            linkundef: Vec::new(),
            undefined_are_pure: false,
            slicer_pta: None,
            slicer_params: Vec::new(),
            repeat_slicing: 1,
            optlevel: Vec::new(),
            no_optimize: false,
            disabled_optimizations: Vec::new(),
            noslice: false,
            source_is_bc: false,
            stats: false,
            instrumentation_files_path: PathBuf::new(),
            no_verification: false,
            tool_params: Vec::new(),
            final_output: None,
            property: Property::default(),
        }
    }
}

impl Options {
    /// Sensible defaults, mirroring `SymbioticOptions(symbiotic_dir)` in
    /// the original — a single non-zero repeat count and an empty
    /// everything else.
    pub fn new(symbiotic_dir: &std::path::Path) -> Self {
        Self {
            instrumentation_files_path: symbiotic_dir.join("instrumentation"),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_never_produces_a_zero_repeat_count() {
        assert_eq!(Options::default().repeat_slicing, 1);
    }

    #[test]
    fn new_agrees_with_default_on_repeat_slicing() {
        let opts = Options::new(std::path::Path::new("/opt/symbiotic"));
        assert_eq!(opts.repeat_slicing, Options::default().repeat_slicing);
    }
}
