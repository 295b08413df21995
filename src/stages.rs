// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stage primitives: compile-one-source, link, optimize, run-single-pass-
//! module, list undefined symbols, link-undefined-by-lookup, instrument,
//! slice, unsupported-call check, post-process. Each is parameterized by
//! the session's options and backend plugin.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::artifact::stem;
use crate::compiler::{get_clang_version, required_version};
use crate::error::Result;
use crate::logger::{dbg, print_elapsed_time, print_stdout, restart_counting_time, Tag};
use crate::pipeline::Session;
use crate::process;
use crate::watch::{
    CaptureWatch, CompileWatch, DbgWatch, InstrumentationWatch, PrepareWatch, PrintWatch,
    SlicerWatch, UnsuppCallWatch,
};

fn os(s: &str) -> OsString {
    OsString::from(s)
}

fn path_os(p: &Path) -> OsString {
    p.as_os_str().to_os_string()
}

impl Session {
    /// Compiles `src` to LLVM bitcode. `output` defaults to
    /// `<basename-stem>.bc` in the current working directory.
    pub fn compile_source(
        &self,
        src: &Path,
        output: Option<PathBuf>,
        with_debug: bool,
        extra_opts: &[String],
    ) -> Result<PathBuf> {
        let out = output.unwrap_or_else(|| crate::artifact::compile_output_name(src));

        let mut cmd: Vec<OsString> = vec![
            os("clang"),
            os("-c"),
            os("-emit-llvm"),
            os("-include"),
            os("symbiotic.h"),
            os("-D__inline="),
        ];
        cmd.extend(extra_opts.iter().map(|s| os(s)));

        if with_debug {
            cmd.push(os("-g"));
        }
        cmd.extend(self.options.cflags.iter().map(|s| os(s)));
        cmd.extend(self.options.cppflags.iter().map(|s| os(s)));
        if self.options.is32bit {
            cmd.push(os("-m32"));
        }
        if self.options.property.memsafety() && required_version(get_clang_version(), (4, 0, 1)) {
            cmd.push(os("-Xclang"));
            cmd.push(os("-force-lifetime-markers"));
        }

        cmd.push(os("-o"));
        cmd.push(path_os(&out));
        cmd.push(path_os(src));

        let mut watcher = CompileWatch::new();
        process::run(
            &cmd,
            &mut watcher,
            &format!("Compiling source '{}' failed", src.display()),
        )?;

        Ok(out)
    }

    fn library_provider(&self) -> Vec<PathBuf> {
        if !self.options.add_libc {
            return Vec::new();
        }
        let libdir = if self.options.is32bit { "lib32" } else { "lib" };
        vec![self
            .symbiotic_dir
            .join(libdir)
            .join("klee")
            .join("runtime")
            .join("klee-libc.bc")]
    }

    /// Links `libs` (or the library provider's defaults) against the
    /// current artifact. A no-op if the resolved library list is empty.
    pub fn link(&mut self, output: Option<PathBuf>, libs: Option<Vec<PathBuf>>) -> Result<()> {
        let libs = libs.unwrap_or_else(|| self.library_provider());
        if libs.is_empty() {
            return Ok(());
        }

        let output = output.unwrap_or_else(|| self.artifact.stage_output("ln"));

        let mut cmd: Vec<OsString> = vec![os("llvm-link"), os("-o"), path_os(&output)];
        cmd.extend(libs.iter().map(|p| path_os(p)));
        if let Some(current) = self.artifact.get() {
            cmd.push(path_os(current));
        }

        let mut watcher = DbgWatch::new("compile");
        process::run(&cmd, &mut watcher, "Failed linking llvm file with libraries")?;
        self.artifact.set(output);
        Ok(())
    }

    /// Non-loading optimization pass: filters `passes` by `disable` and
    /// the session's accumulated disabled-optimizations set, then runs
    /// `opt`. A no-op when `no_optimize` is set.
    pub fn optimize(&mut self, passes: Vec<String>, disable: Vec<String>) -> Result<()> {
        if self.options.no_optimize {
            return Ok(());
        }

        let disable_set: HashSet<String> = disable
            .into_iter()
            .chain(self.disabled_optimizations.iter().cloned())
            .collect();
        let filtered: Vec<String> = passes.into_iter().filter(|p| !disable_set.contains(p)).collect();
        if filtered.is_empty() {
            dbg("No passes available for optimizations", "all");
        }

        let output = self.artifact.stage_output("opt");
        let mut cmd: Vec<OsString> = vec![os("opt"), os("-o"), path_os(&output), path_os(self.artifact.require())];
        cmd.extend(filtered.iter().map(|s| os(s)));

        restart_counting_time();
        let mut watcher = CompileWatch::new();
        process::run(&cmd, &mut watcher, "Optimizing the code failed")?;
        print_elapsed_time("INFO: Optimizations time", Some(Tag::White));

        self.artifact.set(output);
        Ok(())
    }

    /// The module-loading pass variant (`opt -load LLVMsbt.so ...`).
    /// A no-op for an empty pass list.
    pub fn run_opt(&mut self, passes: Vec<String>) -> Result<()> {
        if passes.is_empty() {
            return Ok(());
        }

        let output = self.artifact.stage_output("pr");
        let mut cmd: Vec<OsString> = vec![
            os("opt"),
            os("-load"),
            os("LLVMsbt.so"),
            path_os(self.artifact.require()),
            os("-o"),
            path_os(&output),
        ];
        cmd.extend(passes.iter().map(|s| os(s)));

        let mut watcher = PrepareWatch::new();
        process::run(&cmd, &mut watcher, "Prepare phase failed")?;
        self.artifact.set(output);
        Ok(())
    }

    /// Lists the undefined symbols referenced by `bc`, optionally
    /// restricted to `only_funcs`.
    pub fn list_undefined(&self, bc: &Path, only_funcs: &[String]) -> Result<Vec<String>> {
        let cmd: Vec<OsString> = vec![
            os("llvm-nm"),
            os("-undefined-only"),
            os("-just-symbol-name"),
            path_os(bc),
        ];
        let mut watcher = CaptureWatch::new();
        process::run(&cmd, &mut watcher, "Failed getting undefined symbols from bitcode")?;

        let mut names: Vec<String> = watcher.lines().to_vec();
        if !only_funcs.is_empty() {
            let allow: HashSet<&String> = only_funcs.iter().collect();
            names.retain(|n| allow.contains(n));
        }
        Ok(names)
    }

    fn find_shim(&self, kind: &str, symbol: &str) -> Option<PathBuf> {
        let specific = self
            .symbiotic_dir
            .join("lib")
            .join(kind)
            .join(self.backend.name())
            .join(format!("{symbol}.c"));
        if specific.is_file() {
            return Some(specific);
        }

        let generic = self
            .symbiotic_dir
            .join("lib")
            .join(kind)
            .join(format!("{symbol}.c"));
        if generic.is_file() {
            return Some(generic);
        }

        None
    }

    /// Compiles a shim for each symbol in `undefs` that has one
    /// available under any configured `linkundef` kind, links them all
    /// in, and records each linked symbol for the final report. Returns
    /// `true` iff anything was linked.
    pub fn link_undefined_pool(&mut self, undefs: &[String]) -> Result<bool> {
        let kinds = self.options.linkundef.clone();
        let mut to_link = Vec::new();

        for kind in &kinds {
            for undef in undefs {
                let Some(path) = self.find_shim(kind, undef) else {
                    continue;
                };
                let basename_stem = stem(Path::new(
                    path.file_name().expect("shim path has a file name"),
                ));
                let output = PathBuf::from(format!("{}.bc", basename_stem.display()));
                self.compile_source(&path, Some(output.clone()), false, &["-O2".to_string()])?;
                to_link.push(output);
                self.linked_functions.push(undef.clone());
            }
        }

        if to_link.is_empty() {
            Ok(false)
        } else {
            self.link(None, Some(to_link))?;
            Ok(true)
        }
    }

    /// Links the files given unconditionally on the command line
    /// (`options.link_files`), resolved through the same shim lookup as
    /// `link_undefined`.
    pub fn link_unconditional(&mut self) -> Result<()> {
        let files = self.options.link_files.clone();
        self.link_undefined_pool(&files)?;
        Ok(())
    }

    /// Iteratively links shims for every undefined symbol in the
    /// current artifact until a fixed point is reached (newly linked
    /// code may introduce further undefined references). Modeled as a
    /// loop, not recursion, bounded by the finite set of available
    /// shims — see invariant 5 in the spec's testable properties.
    pub fn link_undefined(&mut self, only_funcs: &[String]) -> Result<()> {
        if self.options.linkundef.is_empty() {
            return Ok(());
        }

        if !only_funcs.is_empty() {
            let bc = self.artifact.require().to_path_buf();
            let undefs = self.list_undefined(&bc, only_funcs)?;
            self.link_undefined_pool(&undefs)?;
            return Ok(());
        }

        loop {
            let bc = self.artifact.require().to_path_buf();
            let undefs = self.list_undefined(&bc, &[])?;
            if !self.link_undefined_pool(&undefs)? {
                break;
            }
        }
        Ok(())
    }

    /// Inserts the property-specific runtime checks, selecting the
    /// `memsafety/` or `int_overflows/` instrumentation subdirectory.
    /// A no-op if the backend doesn't expose `instrumentation_options`.
    pub fn instrument(&mut self) -> Result<()> {
        let Some(opts) = self.backend.instrumentation_options() else {
            return Ok(());
        };

        let subdir = if self.options.property.memsafety() {
            "memsafety"
        } else if self.options.property.signedoverflow() {
            "int_overflows"
        } else {
            return Err(crate::error::SymbioticError::stage(
                "BUG: Unhandled property for instrumentation",
            ));
        };

        let config = self
            .options
            .instrumentation_files_path
            .join(subdir)
            .join(&opts.config_file);
        if !config.is_file() {
            return Err(crate::error::SymbioticError::stage(format!(
                "Instrumentation config file does not exist: {}",
                config.display()
            )));
        }

        let def_stem = opts
            .definitions
            .strip_suffix(".c")
            .unwrap_or(&opts.definitions);
        let llvm_dir = format!("llvm-{}", self.backend.llvm_version());
        let libdir = if self.options.is32bit { "lib32" } else { "lib" };
        let precompiled = self
            .symbiotic_dir
            .join(&llvm_dir)
            .join(libdir)
            .join(format!("{def_stem}.bc"));

        let definitions_bc = if precompiled.is_file() {
            precompiled
        } else {
            let definitions_path = self
                .options
                .instrumentation_files_path
                .join(subdir)
                .join(&opts.definitions);
            if !definitions_path.is_file() {
                return Err(crate::error::SymbioticError::stage(format!(
                    "Instrumentation definitions file does not exist: {}",
                    definitions_path.display()
                )));
            }
            let out = PathBuf::from(format!("{def_stem}.bc"));
            self.compile_source(&definitions_path, Some(out.clone()), false, &["-O2".to_string()])?;
            std::fs::canonicalize(&out).unwrap_or(out)
        };

        self.get_stats("Before instrumentation ");
        print_stdout("INFO: Starting instrumentation", None, Some(Tag::White), true);

        let output = self.artifact.stage_output("inst");
        let mut cmd: Vec<OsString> = vec![
            os("sbt-instr"),
            path_os(&config),
            path_os(self.artifact.require()),
            path_os(&definitions_bc),
            path_os(&output),
        ];
        if !opts.should_link {
            cmd.push(os("--no-linking"));
        }

        restart_counting_time();
        let mut watcher = InstrumentationWatch::new();
        process::run(&cmd, &mut watcher, "Instrumenting the code failed")?;
        print_elapsed_time("INFO: Instrumentation time", Some(Tag::White));

        self.artifact.set(output);
        self.get_stats("After instrumentation ");
        Ok(())
    }

    /// Slices the code with respect to the backend's criterion (default
    /// `__assert_fail,__VERIFIER_error`).
    pub fn slice(&mut self, extra_params: Vec<String>) -> Result<()> {
        let slicer_opts = self.backend.slicer_options().unwrap_or_default();

        let output = self.artifact.sliced_output();
        let mut cmd: Vec<OsString> = vec![os("sbt-slicer"), os("-c"), os(&slicer_opts.criterion)];
        cmd.extend(slicer_opts.extra_opts.iter().map(|s| os(s)));

        if let Some(pta) = self.options.slicer_pta {
            cmd.push(os("-pta"));
            cmd.push(os(pta.as_flag()));
        }
        if self.options.undefined_are_pure {
            cmd.push(os("-undefined-are-pure"));
        }
        cmd.extend(self.options.slicer_params.iter().map(|s| os(s)));
        cmd.extend(extra_params.iter().map(|s| os(s)));
        cmd.push(path_os(self.artifact.require()));

        let mut watcher = SlicerWatch::new();
        process::run(&cmd, &mut watcher, "Slicing failed")?;
        self.artifact.set(output);
        Ok(())
    }

    /// Runs `opt -load LLVMsbt.so <flag> -o /dev/null <artifact>`.
    /// Returns `true` iff the run succeeded and no unsupported-call line
    /// was seen; `false` on either a failed run or an unsupported call.
    pub fn check_bitcode(&self, flag: &str) -> bool {
        let cmd: Vec<OsString> = vec![
            os("opt"),
            os("-load"),
            os("LLVMsbt.so"),
            os(flag),
            os("-o"),
            os("/dev/null"),
            path_os(self.artifact.require()),
        ];
        let mut watcher = UnsuppCallWatch::new();
        match process::run(&cmd, &mut watcher, "Failed checking the code") {
            Ok(()) => watcher.ok(),
            Err(_) => false,
        }
    }

    /// Runs the backend's `postprocess_llvm` hook, if any.
    pub fn postprocess_llvm(&mut self) -> Result<()> {
        let Some((cmd, output)) = self.backend.postprocess_llvm(self.artifact.require()) else {
            return Ok(());
        };
        if cmd.is_empty() {
            return Ok(());
        }

        let mut watcher = DbgWatch::new("compile");
        process::run(&cmd, &mut watcher, "Failed preprocessing the llvm code")?;
        self.artifact.set(output);
        Ok(())
    }

    /// Undefined symbols in `bc` with the `klee_` prefix.
    pub fn get_klee_functions(&self, bc: PathBuf) -> Result<Vec<String>> {
        let undefs = self.list_undefined(&bc, &[])?;
        Ok(undefs.into_iter().filter(|f| f.starts_with("klee_")).collect())
    }

    /// Runs the verification backend and maps its output to a verdict
    /// string. Subprocess failure is converted into `rc = 1` rather than
    /// propagated, matching the original's `try/except` around
    /// `runcmd`.
    pub fn run_verification(&self) -> String {
        let inputs = vec![self.artifact.require().to_path_buf()];
        let cmd = self.backend.cmdline(
            self.backend.executable(),
            &self.options.tool_params,
            &inputs,
            self.options.property.get_prp_file().map(|p| p.as_path()),
            &[],
        );

        let mut watcher = crate::watch::ToolWatch::new();
        let mut returncode = 0;
        if let Err(e) = process::run(&cmd, &mut watcher, "Running the verifier failed") {
            crate::logger::print_stderr(&e.to_string(), Some(Tag::Red));
            returncode = 1;
        }

        self.backend
            .determine_result(returncode, 0, watcher.lines(), false)
    }

    /// Runs the `-count-instr` side-probe. Non-fatal: a failure is
    /// logged and swallowed, matching the original's
    /// `except SymbioticException: dbg(...)`.
    pub fn get_stats(&self, prefix: &str) {
        if !self.options.stats {
            return;
        }

        let cmd: Vec<OsString> = vec![
            os("opt"),
            os("-load"),
            os("LLVMsbt.so"),
            os("-count-instr"),
            os("-o"),
            os("/dev/null"),
            path_os(self.artifact.require()),
        ];
        let mut watcher = PrintWatch::new(format!("INFO: {prefix}"), None);
        if process::run(&cmd, &mut watcher, "Failed running opt").is_err() {
            dbg("Failed getting statistics", "all");
        }
    }
}
