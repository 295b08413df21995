// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The pipeline driver: the stage graph that orchestrates the stage
//! primitives in order, applies property-conditional branches, runs the
//! slicing loop with re-optimization, and maps the final backend output
//! to a verdict.

use std::path::PathBuf;

use crate::artifact::Artifact;
use crate::backend::BackendPlugin;
use crate::error::{Result, SymbioticError};
use crate::logger::{dbg, print_elapsed_time, print_stdout, restart_counting_time, Tag};
use crate::optimizations::{get_optlist_after, get_optlist_before, Catalogue};
use crate::options::Options;
use crate::process;

/// The in-process unit of work. Mutated only by its own stage
/// primitives (see `stages.rs`); destroyed at the end of `run`.
pub struct Session {
    pub(crate) sources: Vec<PathBuf>,
    pub(crate) artifact: Artifact,
    pub(crate) backend: Box<dyn BackendPlugin>,
    pub(crate) options: Options,
    /// The original mutates `options.disabled_optimizations` mid-run
    /// (version-based disabling, the signed-overflow `-instcombine`
    /// hack). `Options` itself stays read-only; `Session` owns the
    /// working copy.
    pub(crate) disabled_optimizations: Vec<String>,
    pub(crate) linked_functions: Vec<String>,
    pub(crate) symbiotic_dir: PathBuf,
    pub(crate) catalogue: Catalogue,
}

impl Session {
    pub fn new(
        sources: Vec<PathBuf>,
        backend: Box<dyn BackendPlugin>,
        options: Options,
        symbiotic_dir: PathBuf,
    ) -> Self {
        let disabled_optimizations = options.disabled_optimizations.clone();
        Session {
            sources,
            artifact: Artifact::new(),
            backend,
            options,
            disabled_optimizations,
            linked_functions: Vec::new(),
            symbiotic_dir,
            catalogue: Catalogue::new(),
        }
    }

    pub fn linked_functions(&self) -> &[String] {
        &self.linked_functions
    }

    pub fn artifact_path(&self) -> Option<&std::path::Path> {
        self.artifact.get()
    }

    /// Sends a graceful termination request to the currently running
    /// child, if any.
    pub fn terminate(&self) {
        if process::has_process() {
            process::terminate();
        }
    }

    /// Sends a forceful kill to the currently running child, if any.
    pub fn kill(&self) {
        if process::has_process() {
            process::kill();
        }
    }

    /// Repeatedly kills and waits for the current child to exit.
    pub fn kill_wait(&self) {
        if !process::has_process() {
            return;
        }
        process::kill_wait();
    }

    /// Runs the full pipeline, catching a keyboard-interrupt-equivalent
    /// at the top level the way the original's `run()` wraps
    /// `_run_symbiotic()` in a `try/except KeyboardInterrupt`.
    pub fn run(&mut self) -> Result<String> {
        match self.run_symbiotic() {
            Err(SymbioticError::Cancelled) => {
                self.terminate();
                self.kill();
                print_stdout("Interrupted...", None, None, true);
                Err(SymbioticError::Cancelled)
            }
            other => other,
        }
    }

    fn disable_some_optimizations(&mut self) {
        let version = self.backend.llvm_version().to_string();
        let parts: Vec<&str> = version.split('.').collect();
        if parts.len() != 3 {
            return;
        }
        let (major, minor) = match (parts[0].parse::<u32>(), parts[1].parse::<u32>()) {
            (Ok(a), Ok(b)) => (a, b),
            _ => return,
        };
        if major != 3 {
            self.disabled_optimizations.clear();
            return;
        }

        let mut disabled = Vec::new();
        if minor <= 7 {
            disabled.extend(
                [
                    "-aa",
                    "-demanded-bits",
                    "-globals-aa",
                    "-forceattrs",
                    "-inferattrs",
                    "-rpo-functionattrs",
                ]
                .iter()
                .map(|s| s.to_string()),
            );
        }
        if minor <= 6 {
            disabled.extend(
                [
                    "-tti",
                    "-bdce",
                    "-elim-avail-extern",
                    "-float2int",
                    "-loop-accesses",
                ]
                .iter()
                .map(|s| s.to_string()),
            );
        }

        if !disabled.is_empty() {
            dbg(&format!("Disabled these optimizations: {disabled:?}"), "all");
        }
        self.disabled_optimizations = disabled;
    }

    fn compile_sources(&mut self) -> Result<()> {
        let mut llvm_srcs = Vec::new();
        let sources = self.sources.clone();
        for source in &sources {
            let mut opts = vec![
                "-Wno-unused-parameter".to_string(),
                "-Wno-unused-attribute".to_string(),
                "-Wno-unused-label".to_string(),
                "-Wno-unknown-pragmas".to_string(),
            ];
            if let Some(extra) = self.backend.compilation_options() {
                opts.extend(extra);
            }

            if self.options.property.signedoverflow() {
                // FIXME: hack, remove once a better control-dependence
                // algorithm is available (carried from the original).
                self.disabled_optimizations = vec!["-instcombine".to_string()];
            }

            let out = self.compile_source(source, None, true, &opts)?;
            llvm_srcs.push(out);
        }

        self.link(
            Some(PathBuf::from(crate::artifact::LINKED_SOURCES_NAME)),
            Some(llvm_srcs),
        )
    }

    fn perform_slicing(&mut self) -> Result<()> {
        let opt = get_optlist_before(&self.catalogue, &self.options.optlevel);
        if !opt.is_empty() {
            self.optimize(opt, vec![])?;
        }

        self.run_opt(vec![
            "-reg2mem".to_string(),
            "-break-infinite-loops".to_string(),
            "-remove-infinite-loops".to_string(),
            "-mem2reg".to_string(),
        ])?;

        self.get_stats("Before slicing ");

        print_stdout("INFO: Starting slicing", None, Some(Tag::White), true);
        restart_counting_time();
        for n in 0..self.options.repeat_slicing {
            dbg(&format!("Slicing the code for the {}. time", n + 1), "all");
            self.slice(vec![])?;

            if self.options.repeat_slicing > 1 {
                let opt = get_optlist_after(&self.catalogue, &self.options.optlevel);
                if !opt.is_empty() {
                    self.optimize(opt, vec![])?;
                    self.run_opt(vec![
                        "-break-infinite-loops".to_string(),
                        "-remove-infinite-loops".to_string(),
                    ])?;
                }
            }
        }
        print_elapsed_time("INFO: Total slicing time", Some(Tag::White));

        self.get_stats("After slicing ");
        Ok(())
    }

    fn run_symbiotic(&mut self) -> Result<String> {
        restart_counting_time();
        dbg(&format!("Running Symbiotic with {}", self.backend.name()), "all");

        self.disable_some_optimizations();

        // COMPILATION
        if self.options.source_is_bc {
            self.artifact.set(self.sources[0].clone());
        } else {
            self.compile_sources()?;
        }

        let abs = std::fs::canonicalize(self.artifact.require())
            .unwrap_or_else(|_| self.artifact.require().to_path_buf());
        self.artifact.set(abs);

        self.get_stats("After compilation ");

        if !self.check_bitcode("-check-concurr") {
            print_stdout(
                "Unsupported call (probably pthread API or floating point stdlib functions)",
                None,
                None,
                true,
            );
            return Ok(report_results("unknown"));
        }

        self.link_unconditional()?;

        let mut passes = Vec::new();
        if self.options.property.memsafety()
            || self.options.property.undefinedness()
            || self.options.property.signedoverflow()
        {
            passes.push("-remove-error-calls".to_string());
        }
        if let Some(extra) = self.backend.passes_after_compilation() {
            passes.extend(extra);
        }
        if self.options.property.signedoverflow() {
            passes.push("-mem2reg".to_string());
            passes.push("-break-crit-edges".to_string());
        }
        self.run_opt(passes)?;

        if self.options.property.memsafety() {
            self.link_undefined(&[])?;
        }
        if self.options.property.signedoverflow() {
            self.link_undefined(&[])?;
        }

        // INSTRUMENTATION
        self.instrument()?;

        if let Some(passes) = self.backend.passes_after_instrumentation() {
            self.run_opt(passes)?;
        }

        self.link(None, None)?;

        self.link_undefined(&[])?;

        // SLICING
        if !self.options.noslice {
            self.perform_slicing()?;
        }

        restart_counting_time();
        let opt = get_optlist_after(&self.catalogue, &self.options.optlevel);
        if !opt.is_empty() {
            self.optimize(opt, vec![])?;
        }

        let mut passes = vec!["-remove-infinite-loops".to_string()];
        if let Some(extra) = self.backend.passes_after_slicing() {
            passes.extend(extra);
        }
        self.run_opt(passes)?;

        if self.backend.name() == "klee" && !self.check_bitcode("-check-unsupported") {
            dbg("Unsupported call (probably floating handling)", "all");
            return Ok(report_results("unsupported call"));
        }

        self.link_undefined(&[])?;

        if !self.linked_functions.is_empty() {
            print_stdout("Linked our definitions to these undefined functions:", None, None, true);
            for f in &self.linked_functions {
                print_stdout(&format!("  {f}"), None, None, true);
            }
        }

        print_elapsed_time(
            "INFO: After-slicing optimizations and transformations time",
            Some(Tag::White),
        );

        if self.backend.name() != "klee" {
            let kf = self.get_klee_functions(self.artifact.require().to_path_buf())?;
            if !kf.is_empty() {
                return Err(SymbioticError::stage(format!(
                    "Code contains KLEE functions, but the verifier is not KLEE ({})",
                    kf.join(" ")
                )));
            }
        }

        self.postprocess_llvm()?;

        if let Some(final_output) = self.options.final_output.clone() {
            std::fs::rename(self.artifact.require(), &final_output).map_err(|e| {
                SymbioticError::stage(format!(
                    "Cannot create {}: {e}",
                    final_output.display()
                ))
            })?;
            self.artifact.set(final_output);
        }

        // VERIFICATION
        let found = if !self.options.no_verification {
            self.get_stats("Before verification ");
            print_stdout("INFO: Starting verification", None, Some(Tag::White), true);

            restart_counting_time();
            let found = self.run_verification();
            print_elapsed_time("INFO: Verification time", Some(Tag::White));
            found
        } else {
            "Did not run verification".to_string()
        };

        Ok(report_results(&found))
    }
}

/// `RESULT: <string>` with a color class and a human-readable prefix.
pub fn report_results(res: &str) -> String {
    dbg(res, "all");
    let mut color = Tag::Brown;

    if res.starts_with("false") {
        color = Tag::Red;
        print_stdout("Error found.", None, Some(color), true);
    } else if res == "true" {
        color = Tag::Green;
        print_stdout("No error found.", None, Some(color), true);
    } else if res.starts_with("error") || res.starts_with("ERROR") {
        color = Tag::Red;
        print_stdout("Failure!", None, Some(color), true);
    }

    print_stdout("RESULT: ", None, None, false);
    print_stdout(res, None, Some(color), true);

    res.to_string()
}

#[cfg(test)]
mod tests {
    use super::report_results;

    #[test]
    fn false_prefixed_verdict_maps_to_error_found() {
        // report_results writes to stdout; we only assert it returns the
        // verdict unchanged, matching the original's `report_results`
        // return value contract.
        assert_eq!(report_results("false(unreach-call)"), "false(unreach-call)");
    }

    #[test]
    fn true_and_unknown_round_trip() {
        assert_eq!(report_results("true"), "true");
        assert_eq!(report_results("unknown"), "unknown");
    }
}
